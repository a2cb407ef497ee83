//! # Driver Health Monitoring
//!
//! Status per registered driver, re-evaluated once per health tick.
//!
//! ```text
//!   Unknown -> Healthy -> { Degraded, Warning, Critical } -> Failed
//!                 ^                                            |
//!                 +------ one step per tick on recovery -------+
//! ```

mod driver;
mod monitor;
mod status;

pub use driver::{DriverHandle, DriverId, RecoveryError, RecoveryHook};
pub use monitor::{
    DriverHealth, DriverSample, Evaluation, HealthTable, PerformanceIndicators, RecoveryPolicy,
    ReliabilityCounters, MAX_DRIVERS,
};
pub use status::HealthStatus;
