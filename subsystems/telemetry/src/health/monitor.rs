//! Per-driver health records and evaluation.
//!
//! Handles are sampled without the table lock held; the table only folds
//! finished samples into records and decides transitions.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use super::{DriverHandle, DriverId, HealthStatus};
use crate::config::AlertConfig;
use crate::error::{Resource, TelemetryError, TelemetryResult};
use crate::event::text::{bounded, Name};

/// Upper bound on registered drivers
pub const MAX_DRIVERS: usize = 256;

// ============================================================================
// RECORD PARTS
// ============================================================================

/// Latest performance indicators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceIndicators {
    /// CPU usage (%)
    pub cpu_usage_percent: u32,
    /// Memory in use (KiB)
    pub memory_usage_kb: u64,
    /// Interrupts per second
    pub interrupt_rate: u32,
    /// I/O operations per second
    pub io_operations_per_sec: u32,
    /// Errors in the last minute
    pub errors_per_minute: u64,
}

/// Reliability counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReliabilityCounters {
    /// Crashes
    pub crash_count: u32,
    /// Hangs
    pub hang_count: u32,
    /// Timeouts
    pub timeout_count: u32,
    /// Leaks attributed by the memory tracker
    pub memory_leaks: u32,
    /// Time since registration (ns)
    pub uptime_ns: u64,
    /// Last time the status worsened (ns)
    pub last_error_ns: Option<u64>,
}

/// Recovery policy and bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Restart automatically when the threshold is reached
    pub auto_recovery: bool,
    /// Consecutive failing ticks before recovery
    pub threshold: u32,
    /// Restarts attempted
    pub restart_count: u32,
    /// Restarts that succeeded
    pub recovery_count: u32,
    /// Current run of failing ticks
    pub consecutive_failures: u32,
}

// ============================================================================
// DRIVER HEALTH
// ============================================================================

/// Health record of one driver
#[derive(Clone)]
pub struct DriverHealth {
    /// Driver id
    pub id: DriverId,
    /// Driver name at registration
    pub name: Name,
    /// Handle into the driver framework
    pub driver: Arc<dyn DriverHandle>,
    /// Current status
    pub status: HealthStatus,
    /// Registration time (ns)
    pub registered_ns: u64,
    /// Last evaluation (ns)
    pub last_check_ns: u64,
    /// Performance indicators
    pub performance: PerformanceIndicators,
    /// Reliability counters
    pub reliability: ReliabilityCounters,
    /// Recovery policy
    pub recovery: RecoveryPolicy,
}

impl fmt::Debug for DriverHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHealth")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("last_check_ns", &self.last_check_ns)
            .field("performance", &self.performance)
            .field("reliability", &self.reliability)
            .field("recovery", &self.recovery)
            .finish()
    }
}

/// Values read from a handle in one go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSample {
    /// CPU usage (%)
    pub cpu_usage_percent: u32,
    /// Memory in use (bytes)
    pub memory_usage_bytes: u64,
    /// Interrupts per second
    pub interrupt_rate: u32,
    /// I/O operations per second
    pub io_operations_per_sec: u32,
    /// Errors in the last minute
    pub errors_per_minute: u64,
    /// Crashes
    pub crash_count: u32,
    /// Hangs
    pub hang_count: u32,
    /// Timeouts
    pub timeout_count: u32,
}

impl DriverSample {
    /// Read every indicator from `driver`
    pub fn read(driver: &dyn DriverHandle) -> Self {
        Self {
            cpu_usage_percent: driver.cpu_usage_percent(),
            memory_usage_bytes: driver.memory_usage_bytes(),
            interrupt_rate: driver.interrupt_rate(),
            io_operations_per_sec: driver.io_operations_per_sec(),
            errors_per_minute: driver.errors_per_minute(),
            crash_count: driver.crash_count(),
            hang_count: driver.hang_count(),
            timeout_count: driver.timeout_count(),
        }
    }
}

/// Outcome of folding one sample into a record
#[derive(Clone)]
pub struct Evaluation {
    /// Driver id
    pub id: DriverId,
    /// Driver name
    pub name: Name,
    /// Status before the tick
    pub from: HealthStatus,
    /// Status after the tick
    pub to: HealthStatus,
    /// Consecutive failing ticks so far
    pub failures: u32,
    /// Recovery threshold reached this tick
    pub recovery_due: bool,
    /// Auto-recovery enabled for the driver
    pub auto_recovery: bool,
    /// Handle for the recovery hook
    pub driver: Arc<dyn DriverHandle>,
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("failures", &self.failures)
            .field("recovery_due", &self.recovery_due)
            .finish_non_exhaustive()
    }
}

impl Evaluation {
    /// Status changed this tick
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

// ============================================================================
// HEALTH TABLE
// ============================================================================

/// Table of driver health records
#[derive(Debug)]
pub struct HealthTable {
    drivers: Vec<DriverHealth>,
    alerts: AlertConfig,
}

impl HealthTable {
    /// Empty table evaluating against `alerts`
    pub const fn new(alerts: AlertConfig) -> Self {
        Self {
            drivers: Vec::new(),
            alerts,
        }
    }

    /// Replace the CPU thresholds
    pub fn set_alerts(&mut self, alerts: AlertConfig) {
        self.alerts = alerts;
    }

    /// Add a driver and evaluate it once from Unknown
    pub fn register(
        &mut self,
        driver: Arc<dyn DriverHandle>,
        sample: DriverSample,
        policy: RecoveryPolicy,
        now_ns: u64,
    ) -> TelemetryResult<Evaluation> {
        if self.drivers.len() >= MAX_DRIVERS {
            return Err(TelemetryError::CapacityExhausted(Resource::Drivers));
        }
        self.drivers.try_reserve(1)?;

        let id = DriverId(self.drivers.len() as u32 + 1);
        self.drivers.push(DriverHealth {
            id,
            name: bounded(driver.name()),
            driver,
            status: HealthStatus::Unknown,
            registered_ns: now_ns,
            last_check_ns: 0,
            performance: PerformanceIndicators::default(),
            reliability: ReliabilityCounters::default(),
            recovery: RecoveryPolicy {
                restart_count: 0,
                recovery_count: 0,
                consecutive_failures: 0,
                ..policy
            },
        });
        self.apply(id, sample, now_ns)
    }

    fn record_mut(&mut self, id: DriverId) -> TelemetryResult<&mut DriverHealth> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|slot| self.drivers.get_mut(slot))
            .ok_or(TelemetryError::NotFound)
    }

    /// Record by id
    pub fn get(&self, id: DriverId) -> TelemetryResult<&DriverHealth> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|slot| self.drivers.get(slot))
            .ok_or(TelemetryError::NotFound)
    }

    /// Handle of a registered driver
    pub fn handle(&self, id: DriverId) -> TelemetryResult<Arc<dyn DriverHandle>> {
        self.get(id).map(|record| Arc::clone(&record.driver))
    }

    /// Every registered handle, in id order
    pub fn handles(&self) -> Vec<(DriverId, Arc<dyn DriverHandle>)> {
        self.drivers
            .iter()
            .map(|record| (record.id, Arc::clone(&record.driver)))
            .collect()
    }

    /// Fold a sample into a record and decide the next status
    pub fn apply(&mut self, id: DriverId, sample: DriverSample, now_ns: u64) -> TelemetryResult<Evaluation> {
        let alerts = self.alerts;
        let record = self.record_mut(id)?;

        record.performance = PerformanceIndicators {
            cpu_usage_percent: sample.cpu_usage_percent,
            memory_usage_kb: sample.memory_usage_bytes / 1024,
            interrupt_rate: sample.interrupt_rate,
            io_operations_per_sec: sample.io_operations_per_sec,
            errors_per_minute: sample.errors_per_minute,
        };
        record.reliability.crash_count = sample.crash_count;
        record.reliability.hang_count = sample.hang_count;
        record.reliability.timeout_count = sample.timeout_count;
        record.reliability.uptime_ns = now_ns.saturating_sub(record.registered_ns);

        let from = record.status;
        let observed = HealthStatus::observe(sample.cpu_usage_percent, sample.crash_count, &alerts);
        let to = from.next(observed);
        if to > from && to > HealthStatus::Healthy {
            record.reliability.last_error_ns = Some(now_ns);
        }
        record.status = to;
        record.last_check_ns = now_ns;

        if to.is_failing() {
            record.recovery.consecutive_failures += 1;
        } else {
            record.recovery.consecutive_failures = 0;
        }
        let failures = record.recovery.consecutive_failures;
        let recovery_due = to != HealthStatus::Failed && failures >= record.recovery.threshold;

        Ok(Evaluation {
            id,
            name: record.name.clone(),
            from,
            to,
            failures,
            recovery_due,
            auto_recovery: record.recovery.auto_recovery,
            driver: Arc::clone(&record.driver),
        })
    }

    /// Note a successful restart
    pub fn record_restart(&mut self, id: DriverId) -> TelemetryResult<u32> {
        let record = self.record_mut(id)?;
        record.recovery.restart_count += 1;
        record.recovery.recovery_count += 1;
        record.recovery.consecutive_failures = 0;
        Ok(record.recovery.restart_count)
    }

    /// Give up on a driver; returns the status it left
    pub fn mark_failed(&mut self, id: DriverId, now_ns: u64, attempted_restart: bool) -> TelemetryResult<HealthStatus> {
        let record = self.record_mut(id)?;
        let from = record.status;
        record.status = HealthStatus::Failed;
        record.reliability.last_error_ns = Some(now_ns);
        record.recovery.consecutive_failures = 0;
        if attempted_restart {
            record.recovery.restart_count += 1;
        }
        Ok(from)
    }

    /// Change a driver's recovery policy
    pub fn set_auto_recovery(&mut self, id: DriverId, enabled: bool, threshold: u32) -> TelemetryResult<()> {
        if threshold == 0 {
            return Err(TelemetryError::InvalidParam("recovery threshold"));
        }
        let record = self.record_mut(id)?;
        record.recovery.auto_recovery = enabled;
        record.recovery.threshold = threshold;
        Ok(())
    }

    /// Attribute a detected leak to a driver
    pub fn note_leak(&mut self, id: DriverId) {
        if let Ok(record) = self.record_mut(id) {
            record.reliability.memory_leaks += 1;
        }
    }

    /// Records in id order
    pub fn iter(&self) -> impl Iterator<Item = &DriverHealth> {
        self.drivers.iter()
    }

    /// Registered drivers
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Whether no driver is registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Drop every record
    pub fn release(&mut self) {
        self.drivers = Vec::new();
    }
}

// ============================================================================
// TESTS
// ============================================================================
