//! End-to-end behaviour of a manager on the mock platform.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use helix_hal::MockPlatform;

use crate::config::TelemetryConfig;
use crate::error::{Resource, TelemetryError};
use crate::event::{DiagnosticEvent, Severity};
use crate::health::{DriverHandle, HealthStatus};
use crate::manager::TelemetryManager;
use crate::metric::{MetricKind, MetricValue};
use crate::report::DEFAULT_REPORT_LIMIT;
use crate::subsystem::Subsystem;

fn start(config: TelemetryConfig) -> (Arc<MockPlatform>, TelemetryManager) {
    let platform = Arc::new(MockPlatform::new());
    let manager = TelemetryManager::init_with_config(platform.clone(), config).unwrap();
    (platform, manager)
}

fn of_severity(manager: &TelemetryManager, severity: Severity) -> Vec<DiagnosticEvent> {
    manager
        .drain_events()
        .unwrap()
        .into_iter()
        .filter(|e| e.severity == severity)
        .collect()
}

struct Driver {
    cpu: AtomicU32,
}

impl DriverHandle for Driver {
    fn name(&self) -> &str {
        "D"
    }
    fn memory_usage_bytes(&self) -> u64 {
        0
    }
    fn cpu_usage_percent(&self) -> u32 {
        self.cpu.load(Ordering::SeqCst)
    }
    fn interrupt_rate(&self) -> u32 {
        0
    }
    fn crash_count(&self) -> u32 {
        0
    }
    fn hang_count(&self) -> u32 {
        0
    }
}

#[test]
fn counter_accumulates_into_report() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("ops", "", MetricKind::Counter, Subsystem::Core)
        .unwrap();
    for _ in 0..3 {
        manager.update_counter(id, 1).unwrap();
    }
    let report = manager.generate_report(DEFAULT_REPORT_LIMIT).unwrap();
    assert!(report.contains("  ops: 3\n"));
}

#[test]
fn histogram_buckets_by_power_of_two() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("lat", "", MetricKind::Histogram, Subsystem::Core)
        .unwrap();
    for value in [1, 2, 3, 4, 1024] {
        manager.record_histogram(id, value).unwrap();
    }

    let MetricValue::Histogram(h) = manager.lookup(id).unwrap().value else {
        panic!("not a histogram");
    };
    assert_eq!(h.count, 5);
    assert_eq!(h.min, 1);
    assert_eq!(h.max, 1024);
    assert_eq!(h.buckets[0], 1);
    assert_eq!(h.buckets[1], 2);
    assert_eq!(h.buckets[2], 1);
    assert_eq!(h.buckets[10], 1);
    assert_eq!(h.buckets.iter().sum::<u64>(), 5);
}

#[test]
fn long_timer_logs_one_performance_event() {
    let (platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("op_time", "", MetricKind::Timer, Subsystem::Core)
        .unwrap();

    let token = manager.start_timer_for("op", id).unwrap();
    platform.advance_ns(10_000_000);
    assert_eq!(manager.stop_timer(token).unwrap(), 10_000_000);

    let slow = of_severity(&manager, Severity::Performance);
    assert_eq!(slow.len(), 1);
    assert!(slow[0].message.contains("'op'"));
    assert!(slow[0].message.contains("10000 µs"));

    let MetricValue::Timer(t) = manager.lookup(id).unwrap().value else {
        panic!("not a timer");
    };
    assert_eq!(t.calls, 1);
    assert_eq!(t.min_ns, 10_000_000);
    assert_eq!(t.max_ns, 10_000_000);
}

#[test]
fn short_timer_logs_nothing() {
    let (platform, manager) = start(TelemetryConfig::manual());
    let token = manager.start_timer("quick").unwrap();
    platform.advance_ns(9_999_999);
    manager.stop_timer(token).unwrap();
    assert!(of_severity(&manager, Severity::Performance).is_empty());
}

#[test]
fn ring_overflow_keeps_newest() {
    let (_platform, manager) = start(TelemetryConfig::manual().with_event_capacity(4));
    for n in 1..=6 {
        manager
            .log_fmt(Severity::Info, Subsystem::Core, format_args!("E{}", n))
            .unwrap();
    }

    let events = manager.drain_events().unwrap();
    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["E3", "E4", "E5", "E6"]);
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    assert!(events.windows(2).all(|w| w[0].timestamp_ns <= w[1].timestamp_ns));
    // Draining does not consume.
    assert_eq!(manager.drain_events().unwrap().len(), 4);
}

#[test]
fn leak_scan_reports_old_allocation() {
    let (platform, manager) = start(TelemetryConfig::manual());
    manager.track_alloc(0xdead_0000, 1024, "nvme.rs", 42).unwrap();
    platform.advance_ms(60_000);

    let summary = manager.scan_leaks(30_000).unwrap();
    assert_eq!(summary.new_leaks, 1);
    assert_eq!(summary.bytes, 1024);

    let events = manager.drain_events().unwrap();
    let warnings: Vec<_> = events
        .iter()
        .filter(|e| e.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("1024 bytes"));
    assert!(warnings[0].message.contains("0xdead0000"));
    assert!(warnings[0].message.contains("nvme.rs:42"));

    let summaries: Vec<_> = events
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].message.contains("1 leaks totaling 1024 bytes"));

    // Already reported leaks stay quiet.
    assert_eq!(manager.scan_leaks(30_000).unwrap().new_leaks, 0);
}

#[test]
fn health_transitions_log_events() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let driver = Arc::new(Driver {
        cpu: AtomicU32::new(10),
    });
    let id = manager.register_driver(driver.clone()).unwrap();
    assert_eq!(manager.driver_health(id).unwrap(), HealthStatus::Healthy);

    driver.cpu.store(85, Ordering::SeqCst);
    assert_eq!(manager.update_driver_health(id).unwrap(), HealthStatus::Warning);
    let warnings = of_severity(&manager, Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message.as_str(),
        "Driver 'D' health changed from Healthy to Warning"
    );

    driver.cpu.store(97, Ordering::SeqCst);
    assert_eq!(manager.update_driver_health(id).unwrap(), HealthStatus::Critical);
    assert_eq!(of_severity(&manager, Severity::Critical).len(), 1);
    assert_eq!(manager.driver_health(id).unwrap(), HealthStatus::Critical);
}

#[test]
fn registry_capacity_is_enforced() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    // Eight predefined metrics already occupy slots.
    for n in 8..1024 {
        manager
            .register_metric(&format!("m{}", n), "", MetricKind::Counter, Subsystem::Core)
            .unwrap();
    }
    assert_eq!(manager.metric_count(), 1024);
    assert_eq!(
        manager.register_metric("overflow", "", MetricKind::Counter, Subsystem::Core),
        Err(TelemetryError::CapacityExhausted(Resource::Metrics))
    );
}

#[test]
fn histogram_edges() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("edges", "", MetricKind::Histogram, Subsystem::Core)
        .unwrap();
    manager.record_histogram(id, 0).unwrap();
    for k in 0..32 {
        manager.record_histogram(id, 1u64 << k).unwrap();
    }
    manager.record_histogram(id, 1u64 << 32).unwrap();

    let MetricValue::Histogram(h) = manager.lookup(id).unwrap().value else {
        panic!("not a histogram");
    };
    // 0 and 1 share bucket 0; 2^31 and 2^32 share bucket 31.
    assert_eq!(h.buckets[0], 2);
    assert!(h.buckets[1..31].iter().all(|&b| b == 1));
    assert_eq!(h.buckets[31], 2);
}

#[test]
fn kind_mismatch_and_bad_ids() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let gauge = manager.predefined().cpu_usage;
    assert_eq!(
        manager.update_counter(gauge, 1),
        Err(TelemetryError::KindMismatch {
            actual: MetricKind::Gauge
        })
    );
    assert!(matches!(
        manager.update_counter(crate::metric::MetricId(0), 1),
        Err(TelemetryError::InvalidParam(_))
    ));
    assert_eq!(
        manager.update_counter(crate::metric::MetricId(999), 1),
        Err(TelemetryError::NotFound)
    );

    manager.set_metric_enabled(gauge, false).unwrap();
    assert!(matches!(
        manager.update_gauge(gauge, 1),
        Err(TelemetryError::InvalidParam(_))
    ));
}

#[test]
fn restart_after_shutdown() {
    let platform = Arc::new(MockPlatform::new());
    let first = TelemetryManager::init_with_config(platform.clone(), TelemetryConfig::manual()).unwrap();
    first.shutdown();
    assert_eq!(platform.reserved_bytes(), 0);

    let second = TelemetryManager::init_with_config(platform.clone(), TelemetryConfig::manual()).unwrap();
    assert_eq!(second.metric_count(), 8);
    assert_eq!(first.metric_count(), 0);
    assert!(platform.reserved_bytes() > 0);
    second.shutdown();
}

#[test]
fn concurrent_producers() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("shared", "", MetricKind::Counter, Subsystem::Core)
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    manager.update_counter(id, 1).unwrap();
                }
                manager
                    .log_str(Severity::Info, Subsystem::Core, "worker done")
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(manager.lookup(id).unwrap().value, MetricValue::Counter(4000));
    let events = manager.drain_events().unwrap();
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn counter_spike_survives_until_analytics() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager
        .register_metric("nvme_errors", "", MetricKind::Counter, Subsystem::Nvme)
        .unwrap();
    for _ in 0..10 {
        manager.update_counter(id, 10).unwrap();
    }
    manager.update_counter(id, 1000).unwrap();
    manager.update_counter(id, 10).unwrap();

    assert_eq!(manager.detect_anomalies().unwrap(), 1);
    assert_eq!(manager.stats().anomalies_detected, 1);
    let anomalies = of_severity(&manager, Severity::Anomaly);
    assert_eq!(anomalies.len(), 1);
    assert!(anomalies[0].message.contains("'nvme_errors'"));
    assert!(anomalies[0].message.contains("value 1000"));
    assert!(anomalies[0].message.contains("baseline 10"));
}

#[test]
fn histogram_spikes_each_reported() {
    let (_platform, manager) = start(TelemetryConfig::manual());
    let id = manager.predefined().interrupt_latency;
    for _ in 0..10 {
        manager.record_histogram(id, 4).unwrap();
    }
    manager.record_histogram(id, 400).unwrap();
    manager.record_histogram(id, 4).unwrap();
    manager.record_histogram(id, 9000).unwrap();
    manager.record_histogram(id, 4).unwrap();

    let cycle = manager.run_analytics_cycle().unwrap();
    assert_eq!(cycle.anomalies, 2);
    assert_eq!(of_severity(&manager, Severity::Anomaly).len(), 2);
}

#[test]
fn sampler_skips_disabled_predefined_gauge() {
    let (platform, manager) = start(TelemetryConfig::manual());
    let ids = manager.predefined();
    manager.set_metric_enabled(ids.memory_usage, false).unwrap();
    platform.set_memory_usage(1 << 30);
    platform.set_cpu_usage(42);
    platform.set_device_count(7);

    for _ in 0..3 {
        manager.collect_performance_sample().unwrap();
    }
    assert_eq!(manager.lookup(ids.cpu_usage).unwrap().value, MetricValue::Gauge(42));
    assert_eq!(manager.lookup(ids.device_count).unwrap().value, MetricValue::Gauge(7));
    assert_eq!(manager.lookup(ids.memory_usage).unwrap().value, MetricValue::Gauge(0));
}

#[test]
fn slow_timer_on_failing_metric_still_logged() {
    let (platform, manager) = start(TelemetryConfig::manual());
    let gauge = manager.predefined().cpu_usage;

    let token = manager.start_timer_for("usb_enumerate", gauge).unwrap();
    platform.advance_ms(12);
    assert_eq!(
        manager.stop_timer(token),
        Err(TelemetryError::KindMismatch {
            actual: MetricKind::Gauge
        })
    );
    let slow = of_severity(&manager, Severity::Performance);
    assert_eq!(slow.len(), 1);
    assert!(slow[0].message.contains("'usb_enumerate'"));
}
