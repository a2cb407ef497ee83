//! # Subsystem Integration
//!
//! Standard metric sets for the driver subsystems plus a few helpers built
//! only on the public manager API: bandwidth and error recording,
//! benchmarking, the operator dashboard and the one-shot system health
//! check.

use arrayvec::ArrayVec;

use crate::error::{TelemetryError, TelemetryResult};
use crate::event::text::Name;
use crate::event::Severity;
use crate::health::HealthStatus;
use crate::manager::TelemetryManager;
use crate::metric::{MetricId, MetricKind, MetricValue};
use crate::report::DEFAULT_REPORT_LIMIT;
use crate::subsystem::Subsystem;

/// Platform memory usage above which the health check reports an issue
const HIGH_MEMORY_BYTES: u64 = 1 << 30;

/// Metrics listed on the dashboard
pub const DASHBOARD_TOP_METRICS: usize = 10;

// ============================================================================
// METRIC SETS
// ============================================================================

macro_rules! metric_set {
    (
        $(#[$meta:meta])*
        $set:ident for $subsystem:ident {
            $($field:ident: $kind:ident => $description:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $set {
            $(
                #[doc = $description]
                pub $field: MetricId,
            )+
        }

        impl $set {
            fn register(manager: &TelemetryManager) -> TelemetryResult<Self> {
                Ok(Self {
                    $($field: manager.register_metric(
                        stringify!($field),
                        $description,
                        MetricKind::$kind,
                        Subsystem::$subsystem,
                    )?,)+
                })
            }
        }
    };
}

metric_set! {
    /// Driver framework metrics (load time is the predefined timer)
    CoreMetrics for Core {
        driver_unload_time: Timer => "Driver unloading time",
        crash_recovery_count: Counter => "Driver crash recoveries",
        sandbox_violations: Counter => "Driver sandbox violations",
    }
}

metric_set! {
    /// PCIe bus metrics
    PcieMetrics for Pci {
        pcie_device_count: Gauge => "PCIe devices present",
        pcie_enumeration_time: Timer => "PCIe enumeration time",
        pcie_bandwidth_usage: Bandwidth => "PCIe bandwidth usage",
        msi_interrupts_processed: Counter => "MSI/MSI-X interrupts processed",
        pcie_link_errors: Counter => "PCIe link errors",
        pcie_power_state_changes: Counter => "PCIe power state changes",
    }
}

metric_set! {
    /// USB and Thunderbolt metrics
    UsbMetrics for Usb {
        usb_device_count: Gauge => "USB devices present",
        usb_enumeration_time: Timer => "USB enumeration time",
        usb_transfer_rate: Bandwidth => "USB transfer rate",
        usb_errors: Counter => "USB errors",
        thunderbolt_bandwidth: Bandwidth => "Thunderbolt bandwidth usage",
        usb_c_power_negotiations: Counter => "USB-C power negotiations",
    }
}

metric_set! {
    /// NVMe storage metrics
    NvmeMetrics for Nvme {
        nvme_io_operations: Counter => "NVMe I/O operations",
        nvme_queue_depth: Gauge => "NVMe queue depth",
        nvme_response_time: Timer => "NVMe response time",
        nvme_bandwidth: Bandwidth => "NVMe bandwidth",
        nvme_errors: Counter => "NVMe errors",
        nvme_thermal_throttling: Counter => "NVMe thermal throttling events",
    }
}

metric_set! {
    /// Input stack metrics
    InputMetrics for Input {
        input_events_processed: Counter => "Input events processed",
        input_latency: Histogram => "Input event processing latency",
        gesture_recognition_time: Timer => "Gesture recognition time",
        gaming_mode_switches: Counter => "Gaming mode switches",
        haptic_feedback_calls: Counter => "Haptic feedback calls",
    }
}

metric_set! {
    /// ACPI power and thermal metrics
    AcpiMetrics for Acpi {
        acpi_frequency_changes: Counter => "CPU frequency changes",
        acpi_power_transitions: Counter => "Power state transitions",
        thermal_events: Counter => "Thermal events",
        sci_interrupts: Counter => "SCI interrupts",
        cpu_temperature: Gauge => "CPU temperature in tenths of a degree",
    }
}

metric_set! {
    /// Hot-plug metrics
    HotplugMetrics for Hotplug {
        hotplug_detection_time: Timer => "Hot-plug detection time",
        device_arrivals: Counter => "Device arrivals",
        device_removals: Counter => "Device removals",
        driver_load_failures: Counter => "Driver load failures",
    }
}

/// Every standard subsystem metric, registered on one manager
#[derive(Debug, Clone)]
pub struct SubsystemMetrics {
    manager: TelemetryManager,
    /// Driver framework
    pub core: CoreMetrics,
    /// PCIe
    pub pcie: PcieMetrics,
    /// USB
    pub usb: UsbMetrics,
    /// NVMe
    pub nvme: NvmeMetrics,
    /// Input
    pub input: InputMetrics,
    /// ACPI
    pub acpi: AcpiMetrics,
    /// Hot-plug
    pub hotplug: HotplugMetrics,
}

impl SubsystemMetrics {
    /// Register the standard metric set of every subsystem
    pub fn register(manager: &TelemetryManager) -> TelemetryResult<Self> {
        let metrics = Self {
            manager: manager.clone(),
            core: CoreMetrics::register(manager)?,
            pcie: PcieMetrics::register(manager)?,
            usb: UsbMetrics::register(manager)?,
            nvme: NvmeMetrics::register(manager)?,
            input: InputMetrics::register(manager)?,
            acpi: AcpiMetrics::register(manager)?,
            hotplug: HotplugMetrics::register(manager)?,
        };
        manager.log_str(
            Severity::Info,
            Subsystem::Core,
            "Initialized telemetry metrics for all subsystems",
        )?;
        Ok(metrics)
    }

    /// Record a transfer of `bytes` over `duration_ns` as bytes per second
    ///
    /// PCIe, USB and NVMe transfers land on their bandwidth gauges; other
    /// subsystems count the bytes on the predefined `io_throughput` rate.
    pub fn record_bandwidth(&self, subsystem: Subsystem, bytes: u64, duration_ns: u64) -> TelemetryResult<()> {
        if duration_ns == 0 {
            return Err(TelemetryError::InvalidParam("transfer duration"));
        }
        let per_second = bytes as u128 * helix_hal::NS_PER_SEC as u128 / duration_ns as u128;
        let per_second = i64::try_from(per_second).unwrap_or(i64::MAX);

        let gauge = match subsystem {
            Subsystem::Pci => self.pcie.pcie_bandwidth_usage,
            Subsystem::Usb => self.usb.usb_transfer_rate,
            Subsystem::Nvme => self.nvme.nvme_bandwidth,
            _ => return self.manager.update_counter(self.manager.predefined().io_throughput, bytes),
        };
        self.manager.update_gauge(gauge, per_second)
    }

    /// Count an error against `subsystem` and log it
    pub fn record_error(&self, subsystem: Subsystem) -> TelemetryResult<()> {
        self.manager
            .update_counter(self.manager.predefined().error_rate, 1)?;
        let specific = match subsystem {
            Subsystem::Pci => Some(self.pcie.pcie_link_errors),
            Subsystem::Usb => Some(self.usb.usb_errors),
            Subsystem::Nvme => Some(self.nvme.nvme_errors),
            _ => None,
        };
        if let Some(id) = specific {
            self.manager.update_counter(id, 1)?;
        }
        self.manager.log_fmt(
            Severity::Error,
            subsystem,
            format_args!("Error recorded in subsystem {}", subsystem),
        )?;
        Ok(())
    }

    /// Manager the set is registered on
    pub fn manager(&self) -> &TelemetryManager {
        &self.manager
    }
}

/// Log a Critical event when a condition does not hold
///
/// ```ignore
/// telemetry_assert!(manager, queue.len() <= depth, Subsystem::Nvme);
/// ```
#[macro_export]
macro_rules! telemetry_assert {
    ($manager:expr, $cond:expr, $subsystem:expr) => {
        if !$cond {
            let _ = $manager.log_fmt(
                $crate::Severity::Critical,
                $subsystem,
                format_args!(
                    "Assertion failed: {} at {}:{}",
                    stringify!($cond),
                    file!(),
                    line!()
                ),
            );
        }
    };
}

// ============================================================================
// BENCHMARK
// ============================================================================

/// Timing summary of `benchmark_operation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkResult {
    /// Iterations run
    pub iterations: u32,
    /// Sum of all iterations (ns)
    pub total_ns: u64,
    /// Fastest iteration (ns)
    pub min_ns: u64,
    /// Slowest iteration (ns)
    pub max_ns: u64,
    /// Mean iteration (ns)
    pub avg_ns: u64,
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// One dashboard metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopMetric {
    /// Metric id
    pub id: MetricId,
    /// Metric name
    pub name: Name,
    /// Kind
    pub kind: MetricKind,
    /// Absolute value used for ranking
    pub magnitude: u64,
}

impl TopMetric {
    /// Display unit for the metric's kind
    pub const fn unit(&self) -> &'static str {
        match self.kind {
            MetricKind::Memory => "bytes",
            MetricKind::Bandwidth => "B/s",
            MetricKind::Rate | MetricKind::Counter => "count",
            _ => "",
        }
    }
}

/// Aggregated live view for operators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dashboard {
    /// Drivers currently Healthy
    pub healthy_drivers: u32,
    /// Drivers currently Degraded or Warning
    pub degraded_drivers: u32,
    /// Drivers currently Critical or Failed
    pub failed_drivers: u32,
    /// Summed interrupt rates
    pub total_interrupts_per_sec: u64,
    /// Summed I/O operation rates
    pub total_io_ops_per_sec: u64,
    /// Mean driver CPU usage
    pub average_cpu_percent: u32,
    /// Summed driver memory (KiB)
    pub total_memory_kb: u64,
    /// Summed driver error rates
    pub errors_per_minute: u64,
    /// Critical events currently in the ring
    pub critical_events: usize,
    /// Lifetime anomalies
    pub anomalies: u64,
    /// Largest counters and gauges
    pub top_metrics: ArrayVec<TopMetric, DASHBOARD_TOP_METRICS>,
}

// ============================================================================
// MANAGER HELPERS
// ============================================================================

impl TelemetryManager {
    /// Run `op` `iterations` times and summarize the durations
    pub fn benchmark_operation<F>(&self, name: &str, iterations: u32, mut op: F) -> TelemetryResult<BenchmarkResult>
    where
        F: FnMut(),
    {
        self.ensure_ready()?;
        if iterations == 0 {
            return Err(TelemetryError::InvalidParam("benchmark iterations"));
        }

        let mut total_ns = 0u64;
        let mut min_ns = u64::MAX;
        let mut max_ns = 0;
        for _ in 0..iterations {
            let start = self.now_ns();
            op();
            let elapsed = self.now_ns().saturating_sub(start);
            total_ns = total_ns.saturating_add(elapsed);
            min_ns = min_ns.min(elapsed);
            max_ns = max_ns.max(elapsed);
        }
        let result = BenchmarkResult {
            iterations,
            total_ns,
            min_ns,
            max_ns,
            avg_ns: total_ns / iterations as u64,
        };

        self.log_fmt(
            Severity::Info,
            Subsystem::Core,
            format_args!(
                "Benchmark '{}': {} iterations, avg={} ns, min={} ns, max={} ns",
                name, iterations, result.avg_ns, result.min_ns, result.max_ns
            ),
        )?;
        Ok(result)
    }

    /// Aggregate driver health, events and the largest metrics
    pub fn dashboard(&self) -> TelemetryResult<Dashboard> {
        self.ensure_ready()?;
        let mut dash = Dashboard {
            anomalies: self.stats().anomalies_detected,
            ..Dashboard::default()
        };

        let mut ranked: alloc::vec::Vec<TopMetric> = {
            let registry = self.core.registry.lock();
            registry
                .iter()
                .filter(|m| m.enabled && (m.kind().is_counter_like() || m.kind().is_gauge_like()))
                .map(|m| TopMetric {
                    id: m.id,
                    name: m.name.clone(),
                    kind: m.kind(),
                    magnitude: m.value.magnitude(),
                })
                .collect()
        };
        ranked.sort_by(|a, b| b.magnitude.cmp(&a.magnitude).then(a.id.cmp(&b.id)));
        dash.top_metrics
            .extend(ranked.into_iter().take(DASHBOARD_TOP_METRICS));

        dash.critical_events = self
            .core
            .events
            .count_where(|e| e.severity == Severity::Critical);

        let health = self.core.health.lock();
        let mut cpu_total = 0u64;
        for record in health.iter() {
            match record.status {
                HealthStatus::Healthy => dash.healthy_drivers += 1,
                HealthStatus::Degraded | HealthStatus::Warning => dash.degraded_drivers += 1,
                HealthStatus::Critical | HealthStatus::Failed => dash.failed_drivers += 1,
                HealthStatus::Unknown => {},
            }
            let perf = &record.performance;
            dash.total_interrupts_per_sec += perf.interrupt_rate as u64;
            dash.total_io_ops_per_sec += perf.io_operations_per_sec as u64;
            dash.total_memory_kb += perf.memory_usage_kb;
            dash.errors_per_minute += perf.errors_per_minute;
            cpu_total += perf.cpu_usage_percent as u64;
        }
        if !health.is_empty() {
            dash.average_cpu_percent = (cpu_total / health.len() as u64) as u32;
        }
        Ok(dash)
    }

    /// One-shot system check; returns the number of issues found
    ///
    /// Issues: platform memory above 1 GiB, newly found leaks, and each
    /// driver in Critical or Failed.
    pub fn system_health_check(&self) -> TelemetryResult<u32> {
        self.log_str(
            Severity::Info,
            Subsystem::Core,
            "Starting comprehensive system health check",
        )?;
        let mut issues = 0;

        let memory = self.platform().memory_usage_bytes();
        if memory > HIGH_MEMORY_BYTES {
            self.log_fmt(
                Severity::Warning,
                Subsystem::Core,
                format_args!("High memory usage detected: {} bytes", memory),
            )?;
            issues += 1;
        }

        if self.scan_leaks(self.config().leak_threshold_ms)?.new_leaks > 0 {
            issues += 1;
        }

        issues += self
            .core
            .health
            .lock()
            .iter()
            .filter(|record| record.status.is_failing())
            .count() as u32;

        let report = self.generate_report(DEFAULT_REPORT_LIMIT)?;
        log::debug!("telemetry: health check report ({} bytes)", report.len());

        self.log_fmt(
            Severity::Info,
            Subsystem::Core,
            format_args!("System health check completed, {} issues found", issues),
        )?;
        Ok(issues)
    }
}

// ============================================================================
// TESTS
// ============================================================================
