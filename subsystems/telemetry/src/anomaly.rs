//! # Anomaly Detector
//!
//! Deterministic baseline check. A sample `v` is anomalous for a metric with
//! baseline `b` when the metric has seen at least `baseline_window` updates
//! and `|v - b| > k * |b|`.
//!
//! | Kind             | Baseline                    |
//! |------------------|-----------------------------|
//! | Gauge-like       | current gauge (signed)      |
//! | Counter / Rate   | `total / update_count`      |
//! | Histogram        | `sum / count`               |
//!
//! Timers have no baseline and are never checked.

use core::fmt;

use crate::config::TelemetryConfig;
use crate::event::text::Name;
use crate::metric::{Metric, MetricId, MetricValue};

/// Detector policy, mirrored from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyPolicy {
    /// Detector active
    pub enabled: bool,
    /// Deviation multiplier
    pub k: u32,
    /// Updates required before checking
    pub baseline_window: u32,
}

impl AnomalyPolicy {
    /// Policy carried by `config`
    pub const fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.anomaly_detection,
            k: config.anomaly.k,
            baseline_window: config.anomaly.baseline_window,
        }
    }
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

/// Sample under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Gauge value
    Signed(i64),
    /// Counter delta or histogram value
    Unsigned(u64),
}

impl Sample {
    #[inline]
    const fn widen(self) -> i128 {
        match self {
            Sample::Signed(v) => v as i128,
            Sample::Unsigned(v) => v as i128,
        }
    }
}

/// Positive detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyVerdict {
    /// Metric checked
    pub metric: MetricId,
    /// Metric name at detection time
    pub name: Name,
    /// Offending sample
    pub value: i128,
    /// Baseline it was compared with
    pub baseline: i128,
    /// `|value - baseline|`
    pub deviation: u128,
}

impl fmt::Display for AnomalyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Anomaly detected in metric '{}': value {} deviates {} from baseline {}",
            self.name, self.value, self.deviation, self.baseline
        )
    }
}

/// Baseline of `metric`, if its kind has one
pub fn baseline(metric: &Metric) -> Option<i128> {
    match &metric.value {
        MetricValue::Gauge(v) | MetricValue::Memory(v) | MetricValue::Bandwidth(v) => {
            Some(*v as i128)
        },
        MetricValue::Counter(total) => mean(*total, metric.update_count),
        MetricValue::Rate(rate) => mean(rate.total, metric.update_count),
        MetricValue::Histogram(h) => mean(h.sum, h.count),
        MetricValue::Timer(_) => None,
    }
}

fn mean(total: u64, count: u64) -> Option<i128> {
    if count == 0 {
        None
    } else {
        Some((total / count) as i128)
    }
}

/// Check `sample` against the current state of `metric`
pub fn check(policy: &AnomalyPolicy, metric: &Metric, sample: Sample) -> Option<AnomalyVerdict> {
    if !policy.enabled || metric.update_count < policy.baseline_window as u64 {
        return None;
    }
    let baseline = baseline(metric)?;
    let value = sample.widen();
    let deviation = (value - baseline).unsigned_abs();

    if deviation > policy.k as u128 * baseline.unsigned_abs() {
        Some(AnomalyVerdict {
            metric: metric.id,
            name: metric.name.clone(),
            value,
            baseline,
            deviation,
        })
    } else {
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::text::bounded;
    use crate::metric::{Histogram, MetricKind};
    use crate::subsystem::Subsystem;

    fn metric(value: MetricValue, update_count: u64) -> Metric {
        Metric {
            id: MetricId(1),
            name: bounded("m"),
            description: bounded(""),
            subsystem: Subsystem::Core,
            enabled: true,
            registered_ns: 0,
            last_update_ns: 0,
            update_count,
            overhead_ns: 0,
            value,
        }
    }

    #[test]
    fn test_warm_up_suppresses_detection() {
        let policy = AnomalyPolicy::default();
        let m = metric(MetricValue::Gauge(10), 9);
        assert!(check(&policy, &m, Sample::Signed(1_000)).is_none());

        let m = metric(MetricValue::Gauge(10), 10);
        let verdict = check(&policy, &m, Sample::Signed(1_000)).unwrap();
        assert_eq!(verdict.baseline, 10);
        assert_eq!(verdict.deviation, 990);
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = AnomalyPolicy::default();
        let m = metric(MetricValue::Gauge(10), 20);
        // |40 - 10| = 30 = 3 * 10: not above the threshold.
        assert!(check(&policy, &m, Sample::Signed(40)).is_none());
        assert!(check(&policy, &m, Sample::Signed(41)).is_some());
    }

    #[test]
    fn test_signed_gauges_are_symmetric() {
        let policy = AnomalyPolicy::default();
        let m = metric(MetricValue::Gauge(-10), 20);
        assert!(check(&policy, &m, Sample::Signed(-40)).is_none());
        assert!(check(&policy, &m, Sample::Signed(20)).is_none());
        assert!(check(&policy, &m, Sample::Signed(-50)).is_some());
        assert!(check(&policy, &m, Sample::Signed(21)).is_some());
    }

    #[test]
    fn test_counter_and_histogram_baselines() {
        let policy = AnomalyPolicy::default();
        let m = metric(MetricValue::Counter(100), 10);
        assert_eq!(baseline(&m), Some(10));
        assert!(check(&policy, &m, Sample::Unsigned(41)).is_some());

        let mut h = Histogram::new();
        for _ in 0..10 {
            h.record(5);
        }
        let m = metric(MetricValue::Histogram(h), 10);
        assert_eq!(baseline(&m), Some(5));
        assert!(check(&policy, &m, Sample::Unsigned(20)).is_none());
        assert!(check(&policy, &m, Sample::Unsigned(21)).is_some());
    }

    #[test]
    fn test_timers_and_disabled_policy() {
        let m = metric(MetricValue::new(MetricKind::Timer, 0), 50);
        assert!(check(&AnomalyPolicy::default(), &m, Sample::Unsigned(u64::MAX)).is_none());

        let policy = AnomalyPolicy {
            enabled: false,
            ..AnomalyPolicy::default()
        };
        let m = metric(MetricValue::Gauge(1), 50);
        assert!(check(&policy, &m, Sample::Signed(1_000)).is_none());
    }
}
