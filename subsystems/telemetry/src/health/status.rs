//! Driver health status.

use core::fmt;

use crate::config::AlertConfig;

/// Operating condition of a driver, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum HealthStatus {
    /// Not yet evaluated
    #[default]
    Unknown  = 0,
    /// Operating normally
    Healthy  = 1,
    /// Crashed at least once
    Degraded = 2,
    /// CPU above the alert threshold
    Warning  = 3,
    /// CPU above the critical threshold
    Critical = 4,
    /// Gave up on the driver
    Failed   = 5,
}

impl HealthStatus {
    /// Capitalized name
    pub const fn name(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "Unknown",
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Warning => "Warning",
            HealthStatus::Critical => "Critical",
            HealthStatus::Failed => "Failed",
        }
    }

    /// Counts toward consecutive failures
    #[inline]
    pub const fn is_failing(self) -> bool {
        matches!(self, HealthStatus::Critical | HealthStatus::Failed)
    }

    /// One step toward Healthy
    pub const fn improved(self) -> Self {
        match self {
            HealthStatus::Failed => HealthStatus::Critical,
            HealthStatus::Critical => HealthStatus::Warning,
            HealthStatus::Warning => HealthStatus::Degraded,
            HealthStatus::Degraded | HealthStatus::Healthy | HealthStatus::Unknown => {
                HealthStatus::Healthy
            },
        }
    }

    /// Status the raw indicators call for
    pub const fn observe(cpu_percent: u32, crash_count: u32, alerts: &AlertConfig) -> Self {
        if cpu_percent > alerts.critical_threshold {
            HealthStatus::Critical
        } else if cpu_percent > alerts.alert_threshold {
            HealthStatus::Warning
        } else if crash_count > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Next status given the previous one and a fresh observation
    ///
    /// Worsening applies at once; improvement moves one step per tick.
    /// Failed stays Failed while the observation is still Critical.
    pub fn next(self, observed: Self) -> Self {
        match self {
            HealthStatus::Unknown => observed,
            HealthStatus::Failed if observed >= HealthStatus::Critical => HealthStatus::Failed,
            prev if observed >= prev => observed,
            prev => {
                let step = prev.improved();
                if step < observed {
                    observed
                } else {
                    step
                }
            },
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_thresholds() {
        let alerts = AlertConfig::default();
        assert_eq!(HealthStatus::observe(10, 0, &alerts), HealthStatus::Healthy);
        assert_eq!(HealthStatus::observe(80, 0, &alerts), HealthStatus::Healthy);
        assert_eq!(HealthStatus::observe(81, 0, &alerts), HealthStatus::Warning);
        assert_eq!(HealthStatus::observe(96, 0, &alerts), HealthStatus::Critical);
        assert_eq!(HealthStatus::observe(10, 2, &alerts), HealthStatus::Degraded);
        assert_eq!(HealthStatus::observe(90, 2, &alerts), HealthStatus::Warning);
    }

    #[test]
    fn test_worsening_is_immediate() {
        assert_eq!(HealthStatus::Healthy.next(HealthStatus::Critical), HealthStatus::Critical);
        assert_eq!(HealthStatus::Unknown.next(HealthStatus::Warning), HealthStatus::Warning);
    }

    #[test]
    fn test_recovery_passes_through_degraded() {
        let mut status = HealthStatus::Failed;
        let mut seen = alloc::vec::Vec::new();
        while status != HealthStatus::Healthy {
            status = status.next(HealthStatus::Healthy);
            seen.push(status);
        }
        assert_eq!(
            seen,
            [
                HealthStatus::Critical,
                HealthStatus::Warning,
                HealthStatus::Degraded,
                HealthStatus::Healthy
            ]
        );
    }

    #[test]
    fn test_failed_is_sticky_while_critical() {
        assert_eq!(HealthStatus::Failed.next(HealthStatus::Critical), HealthStatus::Failed);
        assert_eq!(HealthStatus::Failed.next(HealthStatus::Warning), HealthStatus::Critical);
    }

    #[test]
    fn test_improvement_stops_at_observation() {
        // Critical -> Warning is one step; observation Warning holds it there.
        assert_eq!(HealthStatus::Critical.next(HealthStatus::Warning), HealthStatus::Warning);
        assert_eq!(HealthStatus::Warning.next(HealthStatus::Degraded), HealthStatus::Degraded);
    }
}
