//! # Telemetry Report
//!
//! Plain-text snapshot for operators:
//!
//! ```text
//! === Helix Driver Telemetry Report ===
//!
//! System Overview:
//!   Telemetry Version: 2.0
//!   ...
//!
//! Statistics:
//!   ...
//!
//! Key Metrics:
//!   name: value
//! ```
//!
//! The text is ASCII only and never ends mid-line; a line that would not fit
//! in the byte limit is dropped together with everything after it.

use alloc::string::String;
use core::fmt::{self, Write};

use crate::error::{TelemetryError, TelemetryResult};
use crate::manager::{TelemetryManager, TELEMETRY_VERSION};
use crate::metric::{Metric, MetricValue};

/// Report size used when callers do not care
pub const DEFAULT_REPORT_LIMIT: usize = 4096;

// ============================================================================
// WRITER
// ============================================================================

/// Line-oriented writer with a hard byte limit
struct ReportWriter {
    out: String,
    line: String,
    limit: usize,
    full: bool,
}

impl ReportWriter {
    fn new(limit: usize) -> Self {
        Self {
            out: String::new(),
            line: String::new(),
            limit,
            full: false,
        }
    }

    /// Append one line; once a line does not fit, every later line is dropped
    fn line(&mut self, args: fmt::Arguments<'_>) {
        if self.full {
            return;
        }
        self.line.clear();
        // Writing into a String cannot fail.
        let _ = self.line.write_fmt(args);

        let text = self.line.trim_end();
        // Every char is written as exactly one ASCII byte.
        let width = text.chars().count();
        if self.out.len() + width + 1 > self.limit {
            self.full = true;
            return;
        }
        self.out
            .extend(text.chars().map(|c| if c.is_ascii() { c } else { '?' }));
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.line(format_args!(""));
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Value column of a metric line at a given time (ns)
struct MetricLine<'a>(&'a Metric, u64);

impl fmt::Display for MetricLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.value {
            MetricValue::Counter(v) => write!(f, "{}", v),
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Rate(rate) => {
                write!(f, "{} ({}/s)", rate.total, rate.per_second(self.1))
            },
            MetricValue::Timer(t) if t.calls == 0 => write!(f, "calls=0"),
            MetricValue::Timer(t) => write!(
                f,
                "avg={} ns, min={} ns, max={} ns, calls={}",
                t.average_ns(),
                t.min_ns,
                t.max_ns,
                t.calls
            ),
            MetricValue::Histogram(h) if h.count == 0 => write!(f, "count=0"),
            MetricValue::Histogram(h) => write!(
                f,
                "count={}, min={}, max={}, mean={}",
                h.count,
                h.min,
                h.max,
                h.mean()
            ),
            MetricValue::Memory(v) => write!(f, "{} bytes", v),
            MetricValue::Bandwidth(v) => write!(f, "{} B/s", v),
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

impl TelemetryManager {
    /// Render the report into at most `limit` bytes
    pub fn generate_report(&self, limit: usize) -> TelemetryResult<String> {
        self.ensure_ready()?;
        if limit == 0 {
            return Err(TelemetryError::InvalidParam("report limit"));
        }

        let stats = self.stats();
        let mut w = ReportWriter::new(limit);

        w.line(format_args!("=== Helix Driver Telemetry Report ==="));
        w.blank();

        w.line(format_args!("System Overview:"));
        w.line(format_args!(
            "  Telemetry Version: {}.{}",
            TELEMETRY_VERSION.0, TELEMETRY_VERSION.1
        ));
        w.line(format_args!("  Total Metrics: {}", stats.metric_count));
        w.line(format_args!("  Active Drivers: {}", stats.driver_count));
        w.line(format_args!(
            "  Collection Overhead: {} ns",
            stats.current_overhead_ns
        ));
        w.blank();

        w.line(format_args!("Statistics:"));
        w.line(format_args!("  Metrics Collected: {}", stats.metrics_collected));
        w.line(format_args!("  Events Logged: {}", stats.events_logged));
        w.line(format_args!("  Health Checks: {}", stats.health_checks));
        w.line(format_args!("  Anomalies Detected: {}", stats.anomalies_detected));
        w.line(format_args!("  Predictions Made: {}", stats.predictions_made));
        w.blank();

        w.line(format_args!("Key Metrics:"));
        let now = self.now_ns();
        let registry = self.core.registry.lock();
        for metric in registry.iter().filter(|m| m.enabled) {
            w.line(format_args!("  {}: {}", metric.name, MetricLine(metric, now)));
        }
        drop(registry);

        Ok(w.finish())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::metric::MetricKind;
    use crate::subsystem::Subsystem;
    use alloc::sync::Arc;
    use helix_hal::MockPlatform;

    fn manual() -> TelemetryManager {
        TelemetryManager::init_with_config(Arc::new(MockPlatform::new()), TelemetryConfig::manual())
            .unwrap()
    }

    #[test]
    fn test_writer_drops_whole_lines() {
        let mut w = ReportWriter::new(12);
        w.line(format_args!("abcde"));
        w.line(format_args!("fghijk"));
        w.line(format_args!("x"));
        assert_eq!(w.finish(), "abcde\n");
    }

    #[test]
    fn test_writer_sanitizes() {
        let mut w = ReportWriter::new(64);
        w.line(format_args!("  temp: 40 \u{b0}C   "));
        assert_eq!(w.finish(), "  temp: 40 ?C\n");
    }

    #[test]
    fn test_writer_budget_counts_sanitized_bytes() {
        // Six UTF-8 bytes, five once written.
        let mut w = ReportWriter::new(6);
        w.line(format_args!("40 \u{b0}C"));
        assert_eq!(w.finish(), "40 ?C\n");
    }

    #[test]
    fn test_report_sections() {
        let manager = manual();
        let report = manager.generate_report(DEFAULT_REPORT_LIMIT).unwrap();
        let mut lines = report.lines();
        assert_eq!(lines.next(), Some("=== Helix Driver Telemetry Report ==="));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("System Overview:"));
        assert_eq!(lines.next(), Some("  Telemetry Version: 2.0"));
        assert!(report.contains("\nStatistics:\n"));
        assert!(report.contains("\nKey Metrics:\n"));
        assert!(report.contains("  Total Metrics: 8\n"));
        assert!(report.contains("  driver_load_time: calls=0\n"));
        assert!(report.contains("  interrupt_latency: count=0\n"));
        assert!(report.lines().all(|l| l == l.trim_end()));
        assert!(report.is_ascii());
    }

    #[test]
    fn test_report_metric_formats() {
        let manager = manual();
        let ids = manager.predefined();
        manager.update_timer(ids.driver_load_time, 300).unwrap();
        manager.update_timer(ids.driver_load_time, 100).unwrap();
        manager.update_gauge(ids.cpu_usage, -4).unwrap();
        manager.record_histogram(ids.interrupt_latency, 8).unwrap();
        manager.record_histogram(ids.interrupt_latency, 2).unwrap();
        let bw = manager
            .register_metric("nvme_bandwidth", "", MetricKind::Bandwidth, Subsystem::Nvme)
            .unwrap();
        manager.update_gauge(bw, 5000).unwrap();

        let report = manager.generate_report(DEFAULT_REPORT_LIMIT).unwrap();
        assert!(report.contains("  driver_load_time: avg=200 ns, min=100 ns, max=300 ns, calls=2\n"));
        assert!(report.contains("  cpu_usage: -4\n"));
        assert!(report.contains("  interrupt_latency: count=2, min=2, max=8, mean=5\n"));
        assert!(report.contains("  nvme_bandwidth: 5000 B/s\n"));
        assert!(report.contains("  io_throughput: 0 (0/s)\n"));
    }

    #[test]
    fn test_disabled_metrics_are_omitted() {
        let manager = manual();
        manager.set_metric_enabled(manager.predefined().error_rate, false).unwrap();
        let report = manager.generate_report(DEFAULT_REPORT_LIMIT).unwrap();
        assert!(!report.contains("error_rate"));
    }

    #[test]
    fn test_report_truncation_and_limits() {
        let manager = manual();
        let report = manager.generate_report(60).unwrap();
        assert!(report.len() <= 60);
        assert!(report.ends_with('\n'));
        assert_eq!(
            manager.generate_report(0),
            Err(TelemetryError::InvalidParam("report limit"))
        );
    }
}
