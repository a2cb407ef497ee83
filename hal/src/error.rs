//! Platform error types.

use core::fmt;

/// Result type for platform operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors a platform service can report.
///
/// Only allocation and thread creation are fallible; clocks, samplers and
/// identity queries always produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The platform refused a memory reservation
    OutOfMemory {
        /// Bytes requested
        requested: usize,
    },
    /// A thread could not be created
    ThreadSpawnFailed,
    /// The platform does not implement the requested service
    Unsupported(&'static str),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: {} bytes requested", requested)
            },
            Self::ThreadSpawnFailed => write!(f, "thread spawn failed"),
            Self::Unsupported(what) => write!(f, "unsupported platform service: {}", what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_error_display() {
        let err = HalError::OutOfMemory { requested: 4096 };
        assert_eq!(format!("{}", err), "out of memory: 4096 bytes requested");
        assert!(format!("{}", HalError::Unsupported("stack")).contains("stack"));
    }
}
