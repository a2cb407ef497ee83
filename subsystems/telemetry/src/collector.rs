//! # Background Collectors
//!
//! Up to three platform threads share the core with producers:
//!
//! | Thread              | Period                     | Work                                  |
//! |---------------------|----------------------------|---------------------------------------|
//! | `telemetry-perf`    | `collection_interval_ms`   | platform gauges, rate windows, trends |
//! | `telemetry-health`  | `health_check_interval_ms` | driver evaluation and recovery        |
//! | `telemetry-analytics` | `analytics_interval_ms`  | anomaly sweep, leak scan, prediction  |
//!
//! Every loop waits in short slices and re-checks the running flag between
//! them, so shutdown never waits for a full period. Each tick is also
//! callable directly, which is how hosts without threads drive the core.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use crate::config::Collectors;
use crate::error::{TelemetryError, TelemetryResult};
use crate::manager::TelemetryManager;
use crate::metric::Metric;

/// Longest single sleep of a collector loop (ms)
const SLICE_MS: u64 = 10;

/// Per-update overhead above which the performance sampler backs off (ns)
const OVERHEAD_BUDGET_NS: u64 = 10_000;

/// Largest back-off factor of the performance sampler
const MAX_STRETCH: u64 = 8;

// ============================================================================
// ANALYTICS HOOK
// ============================================================================

/// Trend and prediction callbacks
///
/// Both run with the metric registry locked and must not call back into the
/// manager. The default implementations do nothing.
pub trait AnalyticsHook: Send + Sync {
    /// Called for every metric on each performance tick
    fn analyze_trend(&self, _metric: &Metric) {}

    /// Called for every metric on each predictive pass
    fn predict(&self, _metric: &Metric) {}
}

/// Outcome of one analytics cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyticsCycle {
    /// Anomalies reported by the sweep
    pub anomalies: usize,
    /// New leaks found
    pub leaks: u32,
    /// Whether the predictive pass ran
    pub predicted: bool,
}

// ============================================================================
// TICKS
// ============================================================================

impl TelemetryManager {
    /// Sample platform gauges and close rate windows
    ///
    /// Each gauge is updated on its own; a disabled gauge is skipped. The
    /// first other failure is returned after the rate windows are rolled.
    pub fn collect_performance_sample(&self) -> TelemetryResult<()> {
        self.ensure_ready()?;
        let ids = self.predefined();
        let platform = self.platform().clone();

        let memory = i64::try_from(platform.memory_usage_bytes()).unwrap_or(i64::MAX);
        let samples = [
            (ids.memory_usage, memory),
            (ids.cpu_usage, platform.cpu_usage_percent() as i64),
            (ids.device_count, platform.active_device_count() as i64),
        ];
        let mut failure = None;
        for (id, value) in samples {
            match self.update_gauge(id, value) {
                Ok(()) | Err(TelemetryError::InvalidParam(_)) => {},
                Err(e) => {
                    failure.get_or_insert(e);
                },
            }
        }

        let hook = self.core.analytics_hook.read().clone();
        let now = self.now_ns();
        let mut registry = self.core.registry.lock();
        registry.roll_rates(now);
        if let Some(hook) = hook {
            for metric in registry.iter().filter(|m| m.enabled) {
                hook.analyze_trend(metric);
            }
        }
        drop(registry);
        failure.map_or(Ok(()), Err)
    }

    /// Report every queued counter and histogram anomaly; returns the number
    /// reported
    pub fn detect_anomalies(&self) -> TelemetryResult<usize> {
        self.ensure_ready()?;
        let verdicts = self.core.registry.lock().take_pending();
        for verdict in &verdicts {
            self.report_anomaly(verdict);
        }
        Ok(verdicts.len())
    }

    /// One analytics cycle: anomaly sweep, leak scan and, every
    /// `prediction_every` cycles, the predictive pass
    pub fn run_analytics_cycle(&self) -> TelemetryResult<AnalyticsCycle> {
        self.ensure_ready()?;
        let config = self.config();

        let anomalies = if config.anomaly_detection {
            self.detect_anomalies()?
        } else {
            0
        };
        let leaks = self.scan_leaks(config.leak_threshold_ms)?.new_leaks;

        let cycle = self.core.analytics_cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let predicted = config.predictive_analytics && cycle % config.prediction_every as u64 == 0;
        if predicted {
            let hook = self.core.analytics_hook.read().clone();
            if let Some(hook) = hook {
                let registry = self.core.registry.lock();
                for metric in registry.iter().filter(|m| m.enabled) {
                    hook.predict(metric);
                }
            }
            self.core.stats.predictions_made.fetch_add(1, Ordering::Relaxed);
        }

        Ok(AnalyticsCycle {
            anomalies,
            leaks,
            predicted,
        })
    }

    // ========================================================================
    // THREADS
    // ========================================================================

    pub(crate) fn spawn_collectors(&self, collectors: Collectors) -> TelemetryResult<()> {
        if collectors.is_empty() {
            return Ok(());
        }
        self.core.running.store(true, Ordering::Release);

        let table: [(Collectors, &'static str, fn(TelemetryManager)); 3] = [
            (Collectors::PERFORMANCE, "telemetry-perf", performance_loop),
            (Collectors::HEALTH, "telemetry-health", health_loop),
            (Collectors::ANALYTICS, "telemetry-analytics", analytics_loop),
        ];
        for (flag, name, body) in table {
            if !collectors.contains(flag) {
                continue;
            }
            let manager = self.clone();
            let handle = self
                .platform()
                .spawn_thread(name, Box::new(move || body(manager)))
                .map_err(|err| {
                    log::error!("telemetry: cannot start {}: {}", name, err);
                    self.platform_error(err)
                })?;
            self.core.threads.lock().push((name, handle));
            log::debug!("telemetry: started {}", name);
        }
        Ok(())
    }

    pub(crate) fn stop_collectors(&self, grace_ms: u64) {
        self.core.running.store(false, Ordering::Release);
        let threads: Vec<_> = core::mem::take(&mut *self.core.threads.lock());
        let platform = self.platform();
        for (name, handle) in threads {
            if !platform.join_thread(handle, grace_ms) {
                log::warn!("telemetry: {} did not stop within {} ms, terminating", name, grace_ms);
                platform.terminate_thread(handle);
            }
        }
    }

    /// Number of collector threads currently owned by the core
    pub fn collector_count(&self) -> usize {
        self.core.threads.lock().len()
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Sleep up to `ms`, waking early once the core stops
    fn pause(&self, ms: u64) {
        let mut left = ms;
        while left > 0 && self.is_running() {
            let step = left.min(SLICE_MS);
            self.platform().sleep_ms(step);
            left -= step;
        }
    }
}

/// Log a tick failure; returns `false` once the core is gone
fn keep_going(thread: &str, result: TelemetryResult<impl Sized>) -> bool {
    match result {
        Ok(_) => true,
        Err(TelemetryError::NotInitialized) => false,
        Err(err) => {
            log::warn!("telemetry: {} tick failed: {}", thread, err);
            true
        },
    }
}

fn performance_loop(manager: TelemetryManager) {
    let mut stretch = 1;
    while manager.is_running() {
        let config = manager.config();
        if config.real_time_monitoring
            && !keep_going("telemetry-perf", manager.collect_performance_sample())
        {
            break;
        }

        if config.sampling.adaptive {
            let overhead = manager.core.stats.current_overhead_ns.load(Ordering::Relaxed);
            stretch = if overhead > OVERHEAD_BUDGET_NS {
                (stretch * 2).min(MAX_STRETCH)
            } else {
                (stretch / 2).max(1)
            };
        } else {
            stretch = 1;
        }
        manager.pause(config.collection_interval_ms as u64 * stretch);
    }
}

fn health_loop(manager: TelemetryManager) {
    while manager.is_running() {
        if !keep_going("telemetry-health", manager.check_all_driver_health()) {
            break;
        }
        manager.pause(manager.config().health_check_interval_ms as u64);
    }
}

fn analytics_loop(manager: TelemetryManager) {
    while manager.is_running() {
        manager.pause(manager.config().analytics_interval_ms as u64);
        if !manager.is_running() {
            break;
        }
        if !keep_going("telemetry-analytics", manager.run_analytics_cycle()) {
            break;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::event::Severity;
    use crate::metric::{MetricKind, MetricValue};
    use crate::subsystem::Subsystem;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicU32;
    use helix_hal::MockPlatform;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingHook {
        trends: AtomicU32,
        predictions: AtomicU32,
    }

    impl AnalyticsHook for CountingHook {
        fn analyze_trend(&self, _metric: &Metric) {
            self.trends.fetch_add(1, Ordering::SeqCst);
        }

        fn predict(&self, _metric: &Metric) {
            self.predictions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manual(platform: &Arc<MockPlatform>) -> TelemetryManager {
        TelemetryManager::init_with_config(platform.clone(), TelemetryConfig::manual()).unwrap()
    }

    #[test]
    fn test_performance_sample_sets_gauges() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_memory_usage(64 << 20);
        platform.set_cpu_usage(42);
        platform.set_device_count(7);
        let manager = manual(&platform);
        let hook = Arc::new(CountingHook::default());
        manager.set_analytics_hook(hook.clone());

        manager.collect_performance_sample().unwrap();
        let ids = manager.predefined();
        assert_eq!(manager.lookup(ids.memory_usage).unwrap().value, MetricValue::Gauge(64 << 20));
        assert_eq!(manager.lookup(ids.cpu_usage).unwrap().value, MetricValue::Gauge(42));
        assert_eq!(manager.lookup(ids.device_count).unwrap().value, MetricValue::Gauge(7));
        assert_eq!(hook.trends.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_disabled_gauge_does_not_stall_sampler() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_cpu_usage(42);
        platform.set_device_count(7);
        let manager = manual(&platform);
        let ids = manager.predefined();
        manager.set_metric_enabled(ids.memory_usage, false).unwrap();
        manager.update_counter(ids.io_throughput, 500).unwrap();

        platform.advance_ms(1_000);
        manager.collect_performance_sample().unwrap();
        assert_eq!(manager.lookup(ids.cpu_usage).unwrap().value, MetricValue::Gauge(42));
        assert_eq!(manager.lookup(ids.device_count).unwrap().value, MetricValue::Gauge(7));
        assert_eq!(manager.lookup(ids.memory_usage).unwrap().value, MetricValue::Gauge(0));
        // Rate windows still roll.
        assert_eq!(manager.rate_per_second(ids.io_throughput).unwrap(), 500);
    }

    #[test]
    fn test_counter_anomaly_found_by_sweep() {
        let platform = Arc::new(MockPlatform::new());
        let manager = manual(&platform);
        let id = manager
            .register_metric("usb_errors", "", MetricKind::Counter, Subsystem::Usb)
            .unwrap();
        for _ in 0..10 {
            manager.update_counter(id, 10).unwrap();
        }
        assert_eq!(manager.detect_anomalies().unwrap(), 0);

        manager.update_counter(id, 1000).unwrap();
        assert_eq!(manager.detect_anomalies().unwrap(), 1);
        // Each verdict is reported once.
        assert_eq!(manager.detect_anomalies().unwrap(), 0);

        let events = manager.drain_events().unwrap();
        let anomaly = events
            .iter()
            .find(|e| e.severity == Severity::Anomaly)
            .unwrap();
        assert!(anomaly.message.contains("usb_errors"));
    }

    #[test]
    fn test_prediction_every_nth_cycle() {
        let platform = Arc::new(MockPlatform::new());
        let manager = manual(&platform);
        let hook = Arc::new(CountingHook::default());
        manager.set_analytics_hook(hook.clone());

        let mut passes = 0;
        for _ in 0..20 {
            if manager.run_analytics_cycle().unwrap().predicted {
                passes += 1;
            }
        }
        assert_eq!(passes, 2);
        assert_eq!(manager.stats().predictions_made, 2);
        assert_eq!(hook.predictions.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_analytics_cycle_reports_leaks() {
        let platform = Arc::new(MockPlatform::new());
        let manager = manual(&platform);
        manager.track_alloc(0x1000, 32, file!(), line!()).unwrap();
        platform.advance_ms(30_001);
        assert_eq!(manager.run_analytics_cycle().unwrap().leaks, 1);
        assert_eq!(manager.run_analytics_cycle().unwrap().leaks, 0);
    }

    #[test]
    fn test_collector_threads_run_and_stop() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_cpu_usage(33);
        let config = TelemetryConfig::default().with_intervals(10, 10, 10);
        let manager = TelemetryManager::init_with_config(platform.clone(), config).unwrap();
        assert_eq!(manager.collector_count(), 3);

        let cpu = manager.predefined().cpu_usage;
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.lookup(cpu).unwrap().value != MetricValue::Gauge(33) {
            assert!(Instant::now() < deadline, "performance collector never ran");
            std::thread::sleep(Duration::from_millis(2));
        }

        manager.shutdown();
        assert_eq!(manager.collector_count(), 0);
        assert_eq!(platform.reserved_bytes(), 0);
    }
}
