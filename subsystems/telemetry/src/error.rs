//! # Telemetry Error Types
//!
//! Producer-facing failures. Every kind maps to a small negative integer so
//! callers across a C-like boundary can carry it as a status code.

use core::fmt;

use helix_hal::HalError;

use crate::metric::MetricKind;

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Bounded resource that ran out of room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Metric registry slots
    Metrics,
    /// Memory tracker records
    AllocationRecords,
    /// Health table entries
    Drivers,
}

/// Main error type for the telemetry core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Null or zero id, empty name, value out of range, or disabled metric
    InvalidParam(&'static str),
    /// Unknown metric/driver id or free of an untracked address
    NotFound,
    /// Operation incompatible with the metric's kind
    KindMismatch {
        /// Kind the metric was registered with
        actual: MetricKind,
    },
    /// Registry, tracker or health table full
    CapacityExhausted(Resource),
    /// Called before init or after shutdown
    NotInitialized,
    /// The platform refused an allocation
    AllocationFailed,
    /// An internal invariant was violated
    InternalError(&'static str),
}

impl TelemetryError {
    /// Stable status code carried across the producer boundary
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidParam(_) => -1,
            Self::NotFound => -2,
            Self::KindMismatch { .. } => -3,
            Self::CapacityExhausted(_) => -4,
            Self::NotInitialized => -5,
            Self::AllocationFailed => -6,
            Self::InternalError(_) => -7,
        }
    }

    /// Convert a result into a status code (0 on success)
    pub fn status<T>(result: &TelemetryResult<T>) -> i32 {
        match result {
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParam(what) => write!(f, "invalid parameter: {}", what),
            Self::NotFound => write!(f, "not found"),
            Self::KindMismatch { actual } => {
                write!(f, "operation not valid for {} metric", actual.name())
            },
            Self::CapacityExhausted(resource) => write!(f, "capacity exhausted: {:?}", resource),
            Self::NotInitialized => write!(f, "telemetry not initialized"),
            Self::AllocationFailed => write!(f, "allocation failed"),
            Self::InternalError(what) => write!(f, "internal error: {}", what),
        }
    }
}

impl From<HalError> for TelemetryError {
    fn from(e: HalError) -> Self {
        match e {
            HalError::OutOfMemory { .. } | HalError::ThreadSpawnFailed => Self::AllocationFailed,
            HalError::Unsupported(what) => Self::InternalError(what),
        }
    }
}

impl From<alloc::collections::TryReserveError> for TelemetryError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::AllocationFailed
    }
}

// ============================================================================
// TESTS
// ============================================================================
