//! Metric registry.
//!
//! Dense table of metrics; slot `n` holds id `n + 1`. The table is reserved
//! to full capacity up front, so registration never reallocates and updates
//! never allocate. Locking is the caller's concern.
//!
//! Counter, Rate and Histogram samples are checked for anomalies as they are
//! applied, against the baseline before the sample. Positive verdicts wait
//! in a bounded queue for the analytics pass; when it is full the oldest
//! verdict is dropped.

use alloc::vec::Vec;

use heapless::Deque;

use super::{Metric, MetricId, MetricKind, MetricValue};
use crate::anomaly::{self, AnomalyPolicy, AnomalyVerdict, Sample};
use crate::error::{Resource, TelemetryError, TelemetryResult};
use crate::event::text::bounded;
use crate::subsystem::Subsystem;

/// Verdicts held between analytics passes
pub const PENDING_VERDICTS: usize = 64;

/// Table of registered metrics
#[derive(Debug)]
pub struct MetricRegistry {
    metrics: Vec<Metric>,
    capacity: usize,
    policy: AnomalyPolicy,
    pending: Deque<AnomalyVerdict, PENDING_VERDICTS>,
    dropped_verdicts: u64,
}

impl MetricRegistry {
    /// Create a registry with room for `capacity` metrics
    pub fn new(capacity: usize, policy: AnomalyPolicy) -> TelemetryResult<Self> {
        if capacity == 0 {
            return Err(TelemetryError::InvalidParam("metric capacity"));
        }
        let mut metrics = Vec::new();
        metrics.try_reserve_exact(capacity)?;
        Ok(Self {
            metrics,
            capacity,
            policy,
            pending: Deque::new(),
            dropped_verdicts: 0,
        })
    }

    /// Bytes a registry of `capacity` slots occupies
    pub const fn footprint(capacity: usize) -> usize {
        capacity * core::mem::size_of::<Metric>()
    }

    /// Register a metric and return its id
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        kind: MetricKind,
        subsystem: Subsystem,
        now_ns: u64,
    ) -> TelemetryResult<MetricId> {
        if name.is_empty() {
            return Err(TelemetryError::InvalidParam("metric name"));
        }
        if self.metrics.len() >= self.capacity {
            return Err(TelemetryError::CapacityExhausted(Resource::Metrics));
        }

        let id = MetricId::from_slot(self.metrics.len());
        self.metrics.push(Metric {
            id,
            name: bounded(name),
            description: bounded(description),
            subsystem,
            enabled: true,
            registered_ns: now_ns,
            last_update_ns: 0,
            update_count: 0,
            overhead_ns: 0,
            value: MetricValue::new(kind, now_ns),
        });
        Ok(id)
    }

    /// Metric by id
    pub fn get(&self, id: MetricId) -> TelemetryResult<&Metric> {
        id.slot()
            .and_then(|slot| self.metrics.get(slot))
            .ok_or(TelemetryError::NotFound)
    }

    /// Enabled metric by id, for mutation
    fn live(&mut self, id: MetricId) -> TelemetryResult<&mut Metric> {
        if !id.is_valid() {
            return Err(TelemetryError::InvalidParam("metric id 0"));
        }
        let metric = id
            .slot()
            .and_then(|slot| self.metrics.get_mut(slot))
            .ok_or(TelemetryError::NotFound)?;
        if !metric.enabled {
            return Err(TelemetryError::InvalidParam("metric disabled"));
        }
        Ok(metric)
    }

    #[inline]
    fn touch(metric: &mut Metric, now_ns: u64) {
        metric.last_update_ns = now_ns;
        metric.update_count += 1;
    }

    fn enqueue(&mut self, verdict: AnomalyVerdict) {
        if let Err(verdict) = self.pending.push_back(verdict) {
            self.pending.pop_front();
            self.dropped_verdicts += 1;
            // A slot was just freed.
            let _ = self.pending.push_back(verdict);
        }
    }

    /// Add `delta` to a Counter or Rate metric
    pub fn update_counter(&mut self, id: MetricId, delta: u64, now_ns: u64) -> TelemetryResult<()> {
        let policy = self.policy;
        let metric = self.live(id)?;
        let actual = metric.kind();
        if !matches!(actual, MetricKind::Counter | MetricKind::Rate) {
            return Err(TelemetryError::KindMismatch { actual });
        }
        let verdict = anomaly::check(&policy, metric, Sample::Unsigned(delta));
        match &mut metric.value {
            MetricValue::Counter(total) => *total = total.saturating_add(delta),
            MetricValue::Rate(rate) => rate.total = rate.total.saturating_add(delta),
            _ => {},
        }
        Self::touch(metric, now_ns);
        if let Some(verdict) = verdict {
            self.enqueue(verdict);
        }
        Ok(())
    }

    /// Set a Gauge, Memory or Bandwidth metric
    ///
    /// The sample is checked against the pre-update baseline; a positive
    /// detection is returned after the value has been applied.
    pub fn update_gauge(
        &mut self,
        id: MetricId,
        value: i64,
        now_ns: u64,
    ) -> TelemetryResult<Option<AnomalyVerdict>> {
        let policy = self.policy;
        let metric = self.live(id)?;
        if !metric.kind().is_gauge_like() {
            return Err(TelemetryError::KindMismatch {
                actual: metric.kind(),
            });
        }

        let verdict = anomaly::check(&policy, metric, Sample::Signed(value));
        if let MetricValue::Gauge(v) | MetricValue::Memory(v) | MetricValue::Bandwidth(v) =
            &mut metric.value
        {
            *v = value;
        }
        Self::touch(metric, now_ns);
        Ok(verdict)
    }

    /// Apply a signed delta to a Gauge, Memory or Bandwidth metric
    pub fn adjust_gauge(&mut self, id: MetricId, delta: i64, now_ns: u64) -> TelemetryResult<i64> {
        let metric = self.live(id)?;
        let current = match &mut metric.value {
            MetricValue::Gauge(v) | MetricValue::Memory(v) | MetricValue::Bandwidth(v) => {
                *v = v.saturating_add(delta);
                *v
            },
            other => {
                return Err(TelemetryError::KindMismatch {
                    actual: other.kind(),
                })
            },
        };
        Self::touch(metric, now_ns);
        Ok(current)
    }

    /// Record a Histogram sample
    pub fn record_histogram(&mut self, id: MetricId, value: u64, now_ns: u64) -> TelemetryResult<()> {
        let policy = self.policy;
        let metric = self.live(id)?;
        let actual = metric.kind();
        if actual != MetricKind::Histogram {
            return Err(TelemetryError::KindMismatch { actual });
        }
        let verdict = anomaly::check(&policy, metric, Sample::Unsigned(value));
        if let MetricValue::Histogram(h) = &mut metric.value {
            h.record(value);
        }
        Self::touch(metric, now_ns);
        if let Some(verdict) = verdict {
            self.enqueue(verdict);
        }
        Ok(())
    }

    /// Record a Timer duration
    pub fn update_timer(&mut self, id: MetricId, duration_ns: u64, now_ns: u64) -> TelemetryResult<()> {
        let metric = self.live(id)?;
        let actual = metric.kind();
        let MetricValue::Timer(t) = &mut metric.value else {
            return Err(TelemetryError::KindMismatch { actual });
        };
        t.record(duration_ns);
        Self::touch(metric, now_ns);
        Ok(())
    }

    /// Store the measured cost of the last update
    #[inline]
    pub fn note_overhead(&mut self, id: MetricId, overhead_ns: u64) {
        if let Some(metric) = id.slot().and_then(|slot| self.metrics.get_mut(slot)) {
            metric.overhead_ns = overhead_ns;
        }
    }

    /// Enable or disable updates to a metric
    pub fn set_enabled(&mut self, id: MetricId, enabled: bool) -> TelemetryResult<()> {
        let metric = id
            .slot()
            .and_then(|slot| self.metrics.get_mut(slot))
            .ok_or(TelemetryError::NotFound)?;
        metric.enabled = enabled;
        Ok(())
    }

    /// First metric registered under `name`
    pub fn find(&self, name: &str) -> Option<MetricId> {
        self.metrics
            .iter()
            .find(|m| m.name.as_str() == name)
            .map(|m| m.id)
    }

    /// Per-second rate of a Rate metric
    pub fn rate_per_second(&self, id: MetricId, now_ns: u64) -> TelemetryResult<u64> {
        let metric = self.get(id)?;
        match &metric.value {
            MetricValue::Rate(rate) => Ok(rate.per_second(now_ns)),
            other => Err(TelemetryError::KindMismatch {
                actual: other.kind(),
            }),
        }
    }

    /// Close every rate window older than one second
    pub fn roll_rates(&mut self, now_ns: u64) {
        for metric in &mut self.metrics {
            if let MetricValue::Rate(rate) = &mut metric.value {
                rate.roll(now_ns);
            }
        }
    }

    /// Take every queued counter/histogram verdict, oldest first
    ///
    /// Verdicts of metrics disabled since detection are discarded.
    pub fn take_pending(&mut self) -> Vec<AnomalyVerdict> {
        let mut verdicts = Vec::with_capacity(self.pending.len());
        while let Some(verdict) = self.pending.pop_front() {
            if self.get(verdict.metric).is_ok_and(|m| m.enabled) {
                verdicts.push(verdict);
            }
        }
        verdicts
    }

    /// Queued verdicts lost to a full queue
    pub fn dropped_verdicts(&self) -> u64 {
        self.dropped_verdicts
    }

    /// Registered metrics in id order
    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    /// Registered metric count
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Slot count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current anomaly policy
    pub fn policy(&self) -> AnomalyPolicy {
        self.policy
    }

    /// Replace the anomaly policy
    pub fn set_policy(&mut self, policy: AnomalyPolicy) {
        self.policy = policy;
        if !policy.enabled {
            self.pending.clear();
        }
    }

    /// Drop every metric and free the table
    pub fn release(&mut self) {
        self.metrics = Vec::new();
        self.pending.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize) -> MetricRegistry {
        MetricRegistry::new(capacity, AnomalyPolicy::default()).unwrap()
    }

    #[test]
    fn test_ids_dense_and_round_trip() {
        let mut reg = registry(8);
        let a = reg.register("a", "first", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        let b = reg.register("b", "", MetricKind::Histogram, Subsystem::Usb, 0).unwrap();
        assert_eq!(a, MetricId(1));
        assert_eq!(b, MetricId(2));

        let m = reg.get(b).unwrap();
        assert_eq!(m.kind(), MetricKind::Histogram);
        assert_eq!(m.subsystem, Subsystem::Usb);
        assert_eq!(reg.find("a"), Some(a));
        assert_eq!(reg.find("zzz"), None);
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut reg = registry(2);
        reg.register("a", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        reg.register("b", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        assert_eq!(
            reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0),
            Err(TelemetryError::CapacityExhausted(Resource::Metrics))
        );
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_kind_mismatch_leaves_state() {
        let mut reg = registry(4);
        let g = reg.register("g", "", MetricKind::Gauge, Subsystem::Core, 0).unwrap();
        assert_eq!(
            reg.update_counter(g, 1, 5),
            Err(TelemetryError::KindMismatch {
                actual: MetricKind::Gauge
            })
        );
        let m = reg.get(g).unwrap();
        assert_eq!(m.update_count, 0);
        assert_eq!(m.last_update_ns, 0);
        assert_eq!(m.value, MetricValue::Gauge(0));
    }

    #[test]
    fn test_unknown_and_disabled() {
        let mut reg = registry(4);
        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        assert_eq!(reg.update_counter(MetricId(9), 1, 0), Err(TelemetryError::NotFound));
        assert!(matches!(
            reg.update_counter(MetricId::NONE, 1, 0),
            Err(TelemetryError::InvalidParam(_))
        ));

        reg.set_enabled(c, false).unwrap();
        assert!(matches!(
            reg.update_counter(c, 1, 0),
            Err(TelemetryError::InvalidParam(_))
        ));
        reg.set_enabled(c, true).unwrap();
        reg.update_counter(c, 2, 0).unwrap();
        assert_eq!(reg.get(c).unwrap().value, MetricValue::Counter(2));
    }

    #[test]
    fn test_counter_never_decreases() {
        let mut reg = registry(4);
        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        let mut last = 0;
        for delta in [0, 5, u64::MAX, 3] {
            reg.update_counter(c, delta, 1).unwrap();
            let total = reg.get(c).unwrap().value.total().unwrap();
            assert!(total >= last);
            last = total;
        }
        assert_eq!(last, u64::MAX);
    }

    #[test]
    fn test_adjust_gauge_signed() {
        let mut reg = registry(4);
        let m = reg.register("mem", "", MetricKind::Memory, Subsystem::Core, 0).unwrap();
        assert_eq!(reg.adjust_gauge(m, 4096, 1).unwrap(), 4096);
        assert_eq!(reg.adjust_gauge(m, -1024, 2).unwrap(), 3072);
        assert_eq!(reg.get(m).unwrap().update_count, 2);
    }

    #[test]
    fn test_gauge_anomaly_after_warm_up() {
        let mut reg = registry(4);
        let g = reg.register("g", "", MetricKind::Gauge, Subsystem::Core, 0).unwrap();
        for _ in 0..10 {
            assert!(reg.update_gauge(g, 100, 1).unwrap().is_none());
        }
        let verdict = reg.update_gauge(g, 1_000, 2).unwrap().unwrap();
        assert_eq!(verdict.metric, g);
        assert_eq!(verdict.baseline, 100);
        // Value applied regardless of the verdict.
        assert_eq!(reg.get(g).unwrap().value, MetricValue::Gauge(1_000));
    }

    #[test]
    fn test_pending_verdicts_taken_once() {
        let mut reg = registry(4);
        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        for _ in 0..10 {
            reg.update_counter(c, 1, 0).unwrap();
        }
        assert!(reg.take_pending().is_empty());

        reg.update_counter(c, 100, 0).unwrap();
        assert_eq!(reg.take_pending().len(), 1);
        assert!(reg.take_pending().is_empty());
    }

    #[test]
    fn test_spike_survives_later_updates() {
        let mut reg = registry(4);
        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        for _ in 0..10 {
            reg.update_counter(c, 10, 0).unwrap();
        }
        reg.update_counter(c, 1_000, 0).unwrap();
        reg.update_counter(c, 10, 0).unwrap();

        let verdicts = reg.take_pending();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].value, 1_000);
        // Baseline excludes the spike itself.
        assert_eq!(verdicts[0].baseline, 10);
    }

    #[test]
    fn test_histogram_spike_uses_prior_mean() {
        let mut reg = registry(4);
        let h = reg.register("h", "", MetricKind::Histogram, Subsystem::Core, 0).unwrap();
        for _ in 0..10 {
            reg.record_histogram(h, 5, 0).unwrap();
        }
        reg.record_histogram(h, 500, 0).unwrap();
        reg.record_histogram(h, 20, 0).unwrap();
        reg.record_histogram(h, 5, 0).unwrap();

        let verdicts = reg.take_pending();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].value, 500);
        assert_eq!(verdicts[0].baseline, 5);
    }

    #[test]
    fn test_pending_queue_drops_oldest() {
        let total = PENDING_VERDICTS + 2;
        let mut reg = registry(total);
        let ids: Vec<MetricId> = (0..total)
            .map(|n| {
                let name = alloc::format!("c{}", n);
                reg.register(&name, "", MetricKind::Counter, Subsystem::Core, 0).unwrap()
            })
            .collect();
        for &id in &ids {
            for _ in 0..10 {
                reg.update_counter(id, 1, 0).unwrap();
            }
            reg.update_counter(id, 100, 0).unwrap();
        }

        let verdicts = reg.take_pending();
        assert_eq!(verdicts.len(), PENDING_VERDICTS);
        assert_eq!(reg.dropped_verdicts(), 2);
        assert_eq!(verdicts[0].metric, ids[2]);
        assert_eq!(verdicts[PENDING_VERDICTS - 1].metric, ids[total - 1]);
    }

    #[test]
    fn test_disabled_metric_verdicts_discarded() {
        let mut reg = registry(4);
        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        for _ in 0..10 {
            reg.update_counter(c, 1, 0).unwrap();
        }
        reg.update_counter(c, 100, 0).unwrap();
        reg.set_enabled(c, false).unwrap();
        assert!(reg.take_pending().is_empty());
    }

    #[test]
    fn test_rate_roll() {
        let mut reg = registry(4);
        let r = reg.register("r", "", MetricKind::Rate, Subsystem::Core, 0).unwrap();
        reg.update_counter(r, 300, 0).unwrap();
        reg.roll_rates(helix_hal::NS_PER_SEC);
        assert_eq!(reg.rate_per_second(r, helix_hal::NS_PER_SEC + 10).unwrap(), 300);

        let c = reg.register("c", "", MetricKind::Counter, Subsystem::Core, 0).unwrap();
        assert!(reg.rate_per_second(c, 0).is_err());
    }
}
