//! Driver handles and recovery hooks.

use core::fmt;

/// Identifier of a registered driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DriverId(pub u32);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver#{}", self.0)
    }
}

/// Opaque view of a driver owned by the driver framework
///
/// The health monitor only reads these values; it never holds a lock of its
/// own while calling into a handle.
pub trait DriverHandle: Send + Sync {
    /// Driver name
    fn name(&self) -> &str;

    /// Bytes currently allocated by the driver
    fn memory_usage_bytes(&self) -> u64;

    /// CPU usage (0-100)
    fn cpu_usage_percent(&self) -> u32;

    /// Interrupts per second
    fn interrupt_rate(&self) -> u32;

    /// Crashes since load
    fn crash_count(&self) -> u32;

    /// Hangs since load
    fn hang_count(&self) -> u32;

    /// I/O operations per second
    fn io_operations_per_sec(&self) -> u32 {
        0
    }

    /// Timeouts since load
    fn timeout_count(&self) -> u32 {
        0
    }

    /// Errors in the last minute
    fn errors_per_minute(&self) -> u64 {
        0
    }
}

/// Restart hook supplied by the driver framework
pub trait RecoveryHook: Send + Sync {
    /// Restart (re-probe) the driver
    fn restart(&self, driver: &dyn DriverHandle) -> Result<(), RecoveryError>;
}

/// Why a restart attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryError {
    /// The driver's probe routine failed
    ProbeFailed(i32),
    /// The device disappeared
    DeviceGone,
    /// The framework refused the restart
    Refused,
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeFailed(code) => write!(f, "probe failed with code {}", code),
            Self::DeviceGone => write!(f, "device no longer present"),
            Self::Refused => write!(f, "restart refused"),
        }
    }
}
