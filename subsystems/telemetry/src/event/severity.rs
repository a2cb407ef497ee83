//! Event severity.

use core::fmt;

/// Severity of a diagnostic event
///
/// Ordered by declaration; every level from [`Severity::Error`] up carries a
/// stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Severity {
    /// Informational
    #[default]
    Info        = 0,
    /// Something worth attention
    Warning     = 1,
    /// Operation failed
    Error       = 2,
    /// Driver or core in danger
    Critical    = 3,
    /// Slow operation
    Performance = 4,
    /// Statistical outlier
    Anomaly     = 5,
    /// Recovery action taken
    Recovery    = 6,
}

impl Severity {
    /// Whether events of this severity capture a stack trace
    #[inline]
    pub const fn captures_stack(self) -> bool {
        self as u8 >= Severity::Error as u8
    }

    /// Upper-case label
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Performance => "PERFORMANCE",
            Severity::Anomaly => "ANOMALY",
            Severity::Recovery => "RECOVERY",
        }
    }

    /// Matching `log` level for mirrored events
    pub const fn log_level(self) -> log::Level {
        match self {
            Severity::Info | Severity::Recovery => log::Level::Info,
            Severity::Warning | Severity::Performance | Severity::Anomaly => log::Level::Warn,
            Severity::Error | Severity::Critical => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_capture_threshold() {
        assert!(!Severity::Info.captures_stack());
        assert!(!Severity::Warning.captures_stack());
        assert!(Severity::Error.captures_stack());
        assert!(Severity::Recovery.captures_stack());
    }
}
