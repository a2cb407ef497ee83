//! # Telemetry Manager
//!
//! Owns the four tables and the collector threads for one core lifetime.
//!
//! ## Locking
//!
//! ```text
//!   registry  <  event ring  <  health  <  memory tracker
//! ```
//!
//! A lock may only be taken while holding locks to its left. In practice
//! every operation releases its table lock before logging the events it
//! produced, so no path holds two table locks at once. The configuration
//! lock is only ever held to copy the configuration out, except inside
//! `configure`, which takes it under the registry lock.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use helix_hal::sync::{Mutex, RwLock};
use helix_hal::{HalError, Platform, ThreadHandle, NS_PER_MS, NS_PER_US};

use crate::anomaly::{AnomalyPolicy, AnomalyVerdict};
use crate::collector::AnalyticsHook;
use crate::config::TelemetryConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::event::text::{copy_bounded, write_bounded};
use crate::event::{DiagnosticEvent, EventId, EventRecord, EventRing, Severity};
use crate::health::{
    DriverHandle, DriverHealth, DriverId, DriverSample, Evaluation, HealthStatus, HealthTable,
    RecoveryHook, RecoveryPolicy,
};
use crate::memory::{AllocationRecord, AllocationTracker, LeakSummary};
use crate::metric::{Metric, MetricId, MetricKind, MetricRegistry};
use crate::subsystem::Subsystem;
use crate::timer::{TimerToken, LONG_OPERATION_NS};

/// Telemetry format version (major, minor)
pub const TELEMETRY_VERSION: (u8, u8) = (2, 0);

// ============================================================================
// PREDEFINED METRICS
// ============================================================================

/// Ids of the metrics registered by `init`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredefinedMetrics {
    /// Driver load time (timer)
    pub driver_load_time: MetricId,
    /// Interrupt latency (histogram)
    pub interrupt_latency: MetricId,
    /// Platform memory usage (gauge)
    pub memory_usage: MetricId,
    /// Platform CPU usage (gauge)
    pub cpu_usage: MetricId,
    /// I/O throughput (rate)
    pub io_throughput: MetricId,
    /// Error rate (rate)
    pub error_rate: MetricId,
    /// Active devices (gauge)
    pub device_count: MetricId,
    /// Bytes held by tracked allocations (memory)
    pub tracked_memory: MetricId,
}

const PREDEFINED: [(&str, &str, MetricKind); 8] = [
    ("driver_load_time", "Driver loading time in microseconds", MetricKind::Timer),
    ("interrupt_latency", "Interrupt processing latency in nanoseconds", MetricKind::Histogram),
    ("memory_usage", "Driver memory usage in bytes", MetricKind::Gauge),
    ("cpu_usage", "Driver CPU usage percentage", MetricKind::Gauge),
    ("io_throughput", "I/O throughput in bytes per second", MetricKind::Rate),
    ("error_rate", "Error rate per minute", MetricKind::Rate),
    ("device_count", "Number of active devices", MetricKind::Gauge),
    ("tracked_memory", "Bytes held by tracked allocations", MetricKind::Memory),
];

// ============================================================================
// STATISTICS
// ============================================================================

/// Lifetime counters, updated without locks
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub(crate) metrics_collected: AtomicU64,
    pub(crate) events_logged: AtomicU64,
    pub(crate) health_checks: AtomicU64,
    pub(crate) anomalies_detected: AtomicU64,
    pub(crate) predictions_made: AtomicU64,
    pub(crate) leaks_detected: AtomicU64,
    pub(crate) untracked_frees: AtomicU64,
    pub(crate) recoveries_attempted: AtomicU64,
    pub(crate) current_overhead_ns: AtomicU64,
    pub(crate) peak_overhead_ns: AtomicU64,
    pub(crate) total_overhead_ns: AtomicU64,
}

impl StatCounters {
    #[inline]
    fn record_update(&self, overhead_ns: u64) {
        self.metrics_collected.fetch_add(1, Ordering::Relaxed);
        self.current_overhead_ns.store(overhead_ns, Ordering::Relaxed);
        self.peak_overhead_ns.fetch_max(overhead_ns, Ordering::Relaxed);
        self.total_overhead_ns.fetch_add(overhead_ns, Ordering::Relaxed);
    }
}

/// Snapshot of the lifetime counters and table occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    /// Successful metric updates
    pub metrics_collected: u64,
    /// Events logged
    pub events_logged: u64,
    /// Driver evaluations
    pub health_checks: u64,
    /// Anomalies detected
    pub anomalies_detected: u64,
    /// Predictive passes run
    pub predictions_made: u64,
    /// Leaks reported
    pub leaks_detected: u64,
    /// Frees of untracked addresses
    pub untracked_frees: u64,
    /// Restart attempts
    pub recoveries_attempted: u64,
    /// Cost of the last metric update (ns)
    pub current_overhead_ns: u64,
    /// Most expensive metric update (ns)
    pub peak_overhead_ns: u64,
    /// Mean cost of a metric update (ns)
    pub average_overhead_ns: u64,
    /// Registered metrics
    pub metric_count: usize,
    /// Registered drivers
    pub driver_count: usize,
    /// Events currently in the ring
    pub events_buffered: usize,
    /// Events displaced by overflow
    pub events_overwritten: u64,
    /// Live tracked allocations
    pub tracked_allocations: usize,
    /// Bytes held by tracked allocations
    pub tracked_bytes: u64,
}

// ============================================================================
// RESERVATION
// ============================================================================

/// Platform memory reserved during init; released on drop unless committed
struct Reservation<'a> {
    platform: &'a dyn Platform,
    bytes: usize,
}

impl<'a> Reservation<'a> {
    fn new(platform: &'a dyn Platform) -> Self {
        Self { platform, bytes: 0 }
    }

    fn reserve(&mut self, what: &str, bytes: usize) -> TelemetryResult<()> {
        self.platform.reserve_memory(bytes).map_err(|err| {
            log::error!("telemetry: cannot reserve {} for {}: {}", bytes, what, err);
            TelemetryError::from(err)
        })?;
        self.bytes += bytes;
        Ok(())
    }

    fn commit(mut self) -> usize {
        core::mem::take(&mut self.bytes)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.platform.release_memory(self.bytes);
        }
    }
}

// ============================================================================
// CORE
// ============================================================================

pub(crate) struct TelemetryCore {
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) config: RwLock<TelemetryConfig>,
    initialized: AtomicBool,
    pub(crate) running: AtomicBool,
    enabled: AtomicBool,
    pub(crate) registry: Mutex<MetricRegistry>,
    pub(crate) events: EventRing,
    pub(crate) health: Mutex<HealthTable>,
    pub(crate) memory: Mutex<AllocationTracker>,
    pub(crate) stats: StatCounters,
    pub(crate) predefined: RwLock<PredefinedMetrics>,
    pub(crate) threads: Mutex<Vec<(&'static str, ThreadHandle)>>,
    recovery_hook: RwLock<Option<Arc<dyn RecoveryHook>>>,
    pub(crate) analytics_hook: RwLock<Option<Arc<dyn AnalyticsHook>>>,
    pub(crate) analytics_cycles: AtomicU64,
    reserved_bytes: usize,
}

// ============================================================================
// TELEMETRY MANAGER
// ============================================================================

/// Handle to a telemetry core
///
/// Cloning is cheap; every clone refers to the same core. Collector threads
/// hold clones until they exit.
#[derive(Clone)]
pub struct TelemetryManager {
    pub(crate) core: Arc<TelemetryCore>,
}

impl TelemetryManager {
    /// Start a core with the default configuration
    pub fn init(platform: Arc<dyn Platform>) -> TelemetryResult<Self> {
        Self::init_with_config(platform, TelemetryConfig::default())
    }

    /// Start a core
    ///
    /// Reserves and allocates the registry, the event ring and the tracker,
    /// registers the predefined metrics and spawns the configured collector
    /// threads. Any failure rolls back everything acquired so far.
    pub fn init_with_config(platform: Arc<dyn Platform>, config: TelemetryConfig) -> TelemetryResult<Self> {
        config.validate()?;
        let metric_capacity = config.metric_capacity as usize;
        let event_capacity = config.event_capacity as usize;
        let tracking_capacity = config.memory_tracking_capacity as usize;

        let mut reservation = Reservation::new(platform.as_ref());
        reservation.reserve("metric registry", MetricRegistry::footprint(metric_capacity))?;
        let registry = MetricRegistry::new(metric_capacity, AnomalyPolicy::from_config(&config))?;
        reservation.reserve("event ring", EventRing::footprint(event_capacity))?;
        let events = EventRing::new(event_capacity)?;
        reservation.reserve("memory tracker", AllocationTracker::footprint(tracking_capacity))?;
        let memory = AllocationTracker::new(tracking_capacity)?;
        let reserved_bytes = reservation.commit();

        let manager = Self {
            core: Arc::new(TelemetryCore {
                config: RwLock::new(config),
                initialized: AtomicBool::new(true),
                running: AtomicBool::new(false),
                enabled: AtomicBool::new(config.enabled),
                registry: Mutex::new(registry),
                events,
                health: Mutex::new(HealthTable::new(config.alerts)),
                memory: Mutex::new(memory),
                stats: StatCounters::default(),
                predefined: RwLock::new(PredefinedMetrics::default()),
                threads: Mutex::new(Vec::new()),
                recovery_hook: RwLock::new(None),
                analytics_hook: RwLock::new(None),
                analytics_cycles: AtomicU64::new(0),
                reserved_bytes,
                platform,
            }),
        };

        if let Err(err) = manager.bootstrap(&config) {
            log::error!("telemetry: init failed: {}", err);
            manager.shutdown();
            return Err(err);
        }

        manager.log_fmt(
            Severity::Info,
            Subsystem::Core,
            format_args!(
                "Driver telemetry system initialized with {} metric slots, {} event slots",
                metric_capacity, event_capacity
            ),
        )?;
        log::info!(
            "telemetry: initialized ({} metrics, {} events, {} tracked allocations, {} KiB reserved)",
            metric_capacity,
            event_capacity,
            tracking_capacity,
            reserved_bytes / 1024
        );
        Ok(manager)
    }

    fn bootstrap(&self, config: &TelemetryConfig) -> TelemetryResult<()> {
        let mut ids = [MetricId::NONE; PREDEFINED.len()];
        for (slot, (name, description, kind)) in ids.iter_mut().zip(PREDEFINED) {
            *slot = self.register_metric(name, description, kind, Subsystem::Core)?;
        }
        *self.core.predefined.write() = PredefinedMetrics {
            driver_load_time: ids[0],
            interrupt_latency: ids[1],
            memory_usage: ids[2],
            cpu_usage: ids[3],
            io_throughput: ids[4],
            error_rate: ids[5],
            device_count: ids[6],
            tracked_memory: ids[7],
        };
        self.spawn_collectors(config.collectors)
    }

    /// Stop collectors, free every table and release reserved memory
    ///
    /// Idempotent. Must not be called from a collector thread.
    pub fn shutdown(&self) {
        if !self.core.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        let grace_ms = self.core.config.read().shutdown_grace_ms;
        self.stop_collectors(grace_ms as u64);

        self.core.registry.lock().release();
        self.core.events.release();
        self.core.health.lock().release();
        self.core.memory.lock().release();
        *self.core.predefined.write() = PredefinedMetrics::default();
        *self.core.recovery_hook.write() = None;
        *self.core.analytics_hook.write() = None;
        self.core.platform.release_memory(self.core.reserved_bytes);
        log::info!("telemetry: shut down");
    }

    /// Whether the core accepts calls
    pub fn is_initialized(&self) -> bool {
        self.core.initialized.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn ensure_ready(&self) -> TelemetryResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(TelemetryError::NotInitialized)
        }
    }

    /// Platform the core runs on
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.core.platform
    }

    /// Monotonic time (ns)
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.core.platform.now_ns()
    }

    /// Current configuration
    pub fn config(&self) -> TelemetryConfig {
        *self.core.config.read()
    }

    /// Ids of the predefined metrics (all zero after shutdown)
    pub fn predefined(&self) -> PredefinedMetrics {
        *self.core.predefined.read()
    }

    /// Swap runtime flags on a live core
    ///
    /// Capacities and the collector set are fixed at init; changes to them
    /// are ignored.
    pub fn configure(&self, config: TelemetryConfig) -> TelemetryResult<()> {
        self.ensure_ready()?;
        config.validate()?;

        let mut registry = self.core.registry.lock();
        let mut current = self.core.config.write();
        if config.event_capacity != current.event_capacity
            || config.metric_capacity != current.metric_capacity
            || config.memory_tracking_capacity != current.memory_tracking_capacity
            || config.collectors != current.collectors
        {
            log::warn!("telemetry: capacities and collectors are fixed at init; keeping current values");
        }
        let applied = TelemetryConfig {
            event_capacity: current.event_capacity,
            metric_capacity: current.metric_capacity,
            memory_tracking_capacity: current.memory_tracking_capacity,
            collectors: current.collectors,
            ..config
        };
        registry.set_policy(AnomalyPolicy::from_config(&applied));
        self.core.enabled.store(applied.enabled, Ordering::Release);
        *current = applied;
        drop(current);
        drop(registry);

        self.core.health.lock().set_alerts(applied.alerts);
        log::info!(
            "telemetry: reconfigured (enabled={}, anomaly_detection={}, interval={} ms)",
            applied.enabled,
            applied.anomaly_detection,
            applied.collection_interval_ms
        );
        Ok(())
    }

    // ========================================================================
    // METRICS
    // ========================================================================

    /// Register a metric
    pub fn register_metric(
        &self,
        name: &str,
        description: &str,
        kind: MetricKind,
        subsystem: Subsystem,
    ) -> TelemetryResult<MetricId> {
        self.ensure_ready()?;
        let now = self.now_ns();
        let result = self
            .core
            .registry
            .lock()
            .register(name, description, kind, subsystem, now);

        match result {
            Ok(id) => {
                self.push_event(Severity::Info, subsystem, |event| {
                    write_bounded(
                        &mut event.message,
                        format_args!("Registered metric '{}' (ID: {}, Type: {})", name, id, kind),
                    );
                    event.related_metric = Some(id);
                });
            },
            Err(TelemetryError::CapacityExhausted(_)) => {
                log::warn!("telemetry: metric registry full, '{}' not registered", name);
            },
            Err(_) => {},
        }
        result
    }

    /// Run `update` against the registry, measuring its cost
    ///
    /// Returns `Ok(None)` without touching anything when the master switch
    /// is off.
    fn apply_update<R, F>(&self, id: MetricId, update: F) -> TelemetryResult<Option<R>>
    where
        F: FnOnce(&mut MetricRegistry, u64) -> TelemetryResult<R>,
    {
        self.ensure_ready()?;
        if !self.core.enabled.load(Ordering::Acquire) {
            return Ok(None);
        }
        let platform = self.core.platform.as_ref();
        let start = platform.now_ns();
        let mut registry = self.core.registry.lock();
        let out = update(&mut registry, start)?;
        let overhead = platform.now_ns().saturating_sub(start);
        registry.note_overhead(id, overhead);
        drop(registry);

        self.core.stats.record_update(overhead);
        Ok(Some(out))
    }

    /// Add to a Counter or Rate metric
    pub fn update_counter(&self, id: MetricId, delta: u64) -> TelemetryResult<()> {
        self.apply_update(id, |registry, now| registry.update_counter(id, delta, now))
            .map(|_| ())
    }

    /// Set a Gauge, Memory or Bandwidth metric
    pub fn update_gauge(&self, id: MetricId, value: i64) -> TelemetryResult<()> {
        let verdict = self.apply_update(id, |registry, now| registry.update_gauge(id, value, now))?;
        if let Some(Some(verdict)) = verdict {
            self.report_anomaly(&verdict);
        }
        Ok(())
    }

    /// Apply a signed delta to a Gauge, Memory or Bandwidth metric
    pub fn adjust_gauge(&self, id: MetricId, delta: i64) -> TelemetryResult<()> {
        self.apply_update(id, |registry, now| registry.adjust_gauge(id, delta, now))
            .map(|_| ())
    }

    /// Record a Histogram sample
    pub fn record_histogram(&self, id: MetricId, value: u64) -> TelemetryResult<()> {
        self.apply_update(id, |registry, now| registry.record_histogram(id, value, now))
            .map(|_| ())
    }

    /// Record a Timer duration
    pub fn update_timer(&self, id: MetricId, duration_ns: u64) -> TelemetryResult<()> {
        self.apply_update(id, |registry, now| registry.update_timer(id, duration_ns, now))
            .map(|_| ())
    }

    /// Record a violated internal invariant as a Critical event
    pub(crate) fn internal_error(&self, what: &'static str) -> TelemetryError {
        self.push_event(Severity::Critical, Subsystem::Core, |event| {
            write_bounded(&mut event.message, format_args!("Internal error: {}", what));
        });
        log::error!("telemetry: internal error: {}", what);
        TelemetryError::InternalError(what)
    }

    /// Map a platform failure, recording internal ones
    pub(crate) fn platform_error(&self, err: HalError) -> TelemetryError {
        match TelemetryError::from(err) {
            TelemetryError::InternalError(what) => self.internal_error(what),
            other => other,
        }
    }

    pub(crate) fn report_anomaly(&self, verdict: &AnomalyVerdict) {
        self.core.stats.anomalies_detected.fetch_add(1, Ordering::Relaxed);
        let subsystem = self
            .core
            .registry
            .lock()
            .get(verdict.metric)
            .map(|m| m.subsystem)
            .unwrap_or_default();
        self.push_event(Severity::Anomaly, subsystem, |event| {
            write_bounded(&mut event.message, format_args!("{}", verdict));
            event.related_metric = Some(verdict.metric);
        });
    }

    /// Enable or disable a metric
    pub fn set_metric_enabled(&self, id: MetricId, enabled: bool) -> TelemetryResult<()> {
        self.ensure_ready()?;
        self.core.registry.lock().set_enabled(id, enabled)
    }

    /// Snapshot of a metric
    pub fn lookup(&self, id: MetricId) -> TelemetryResult<Metric> {
        self.ensure_ready()?;
        self.core.registry.lock().get(id).cloned()
    }

    /// Id of the first metric called `name`
    pub fn find_metric(&self, name: &str) -> Option<MetricId> {
        if !self.is_initialized() {
            return None;
        }
        self.core.registry.lock().find(name)
    }

    /// Registered metrics
    pub fn metric_count(&self) -> usize {
        self.core.registry.lock().len()
    }

    /// Per-second rate of a Rate metric
    pub fn rate_per_second(&self, id: MetricId) -> TelemetryResult<u64> {
        self.ensure_ready()?;
        let now = self.now_ns();
        self.core.registry.lock().rate_per_second(id, now)
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    /// Start timing an operation
    pub fn start_timer(&self, operation: &str) -> TelemetryResult<TimerToken> {
        self.ensure_ready()?;
        Ok(TimerToken::new(operation, self.now_ns()))
    }

    /// Start timing an operation whose duration feeds timer metric `id`
    pub fn start_timer_for(&self, operation: &str, id: MetricId) -> TelemetryResult<TimerToken> {
        self.start_timer(operation).map(|token| token.bind(id))
    }

    /// Stop a timer and return the measured duration (ns)
    ///
    /// Operations of 10 ms or more are logged as Performance events, then
    /// the duration is applied to the bound metric, if any. A failed metric
    /// update is returned after the event is logged. With telemetry
    /// disabled only the duration is computed.
    pub fn stop_timer(&self, token: TimerToken) -> TelemetryResult<u64> {
        self.ensure_ready()?;
        let duration = self.now_ns().saturating_sub(token.start_ns());
        if !self.core.enabled.load(Ordering::Acquire) {
            return Ok(duration);
        }

        if duration >= LONG_OPERATION_NS {
            self.push_event(Severity::Performance, Subsystem::Core, |event| {
                write_bounded(
                    &mut event.message,
                    format_args!(
                        "Long operation detected: '{}' took {} µs",
                        token.operation(),
                        duration / NS_PER_US
                    ),
                );
                event.related_metric = token.metric();
            });
        }
        if let Some(id) = token.metric() {
            self.update_timer(id, duration)?;
        }
        Ok(duration)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub(crate) fn push_event<F>(&self, severity: Severity, subsystem: Subsystem, fill: F) -> EventId
    where
        F: FnOnce(&mut DiagnosticEvent),
    {
        let level = severity.log_level();
        let id = self
            .core
            .events
            .push_with(self.core.platform.as_ref(), severity, subsystem, |event| {
                fill(event);
                if log::log_enabled!(target: "telemetry", level) {
                    log::log!(target: "telemetry", level, "{}", event);
                }
            });
        self.core.stats.events_logged.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Log a formatted event
    pub fn log_fmt(
        &self,
        severity: Severity,
        subsystem: Subsystem,
        args: fmt::Arguments<'_>,
    ) -> TelemetryResult<EventId> {
        self.ensure_ready()?;
        Ok(self.push_event(severity, subsystem, |event| {
            write_bounded(&mut event.message, args);
        }))
    }

    /// Log a pre-formatted event
    pub fn log_str(&self, severity: Severity, subsystem: Subsystem, message: &str) -> TelemetryResult<EventId> {
        self.ensure_ready()?;
        Ok(self.push_event(severity, subsystem, |event| {
            copy_bounded(&mut event.message, message);
        }))
    }

    /// Log a structured event
    pub fn log_event(&self, record: &EventRecord<'_>) -> TelemetryResult<EventId> {
        self.ensure_ready()?;
        Ok(self.push_event(record.severity, record.subsystem, |event| {
            copy_bounded(&mut event.message, record.message);
            if let Some(details) = record.details {
                copy_bounded(&mut event.details, details);
            }
            event.related_metric = record.related_metric;
            event.error_code = record.error_code;
        }))
    }

    /// Log an Error event carrying `code`
    pub fn log_error(&self, subsystem: Subsystem, code: u32, message: &str) -> TelemetryResult<EventId> {
        self.log_event(&EventRecord::new(Severity::Error, subsystem, message).with_error_code(code))
    }

    /// Copy of the events in the ring, oldest first
    pub fn drain_events(&self) -> TelemetryResult<Vec<DiagnosticEvent>> {
        self.ensure_ready()?;
        Ok(self.core.events.drain())
    }

    /// Copy of the newest `count` events, oldest first
    pub fn recent_events(&self, count: usize) -> TelemetryResult<Vec<DiagnosticEvent>> {
        self.ensure_ready()?;
        Ok(self.core.events.recent(count))
    }

    // ========================================================================
    // MEMORY TRACKING
    // ========================================================================

    /// Track an allocation made at `file:line`
    pub fn track_alloc(&self, address: usize, size: usize, file: &'static str, line: u32) -> TelemetryResult<()> {
        self.track(address, size, file, line, None)
    }

    /// Track an allocation attributed to a registered driver
    pub fn track_driver_alloc(
        &self,
        owner: DriverId,
        address: usize,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> TelemetryResult<()> {
        self.track(address, size, file, line, Some(owner))
    }

    fn track(
        &self,
        address: usize,
        size: usize,
        file: &'static str,
        line: u32,
        owner: Option<DriverId>,
    ) -> TelemetryResult<()> {
        self.ensure_ready()?;
        let platform = self.core.platform.as_ref();
        let record = AllocationRecord {
            address,
            size,
            allocated_ns: platform.now_ns(),
            file,
            line,
            thread_id: platform.current_thread_id(),
            owner,
            freed: false,
            leak_reported: false,
        };
        self.core.memory.lock().track_alloc(record)?;
        self.adjust_tracked_memory(size as i64);
        Ok(())
    }

    /// Mark a tracked allocation freed
    ///
    /// Frees of untracked addresses (including double frees) log a Warning
    /// and return `NotFound`.
    pub fn track_free(&self, address: usize) -> TelemetryResult<()> {
        self.ensure_ready()?;
        let result = self.core.memory.lock().track_free(address);
        match result {
            Ok(record) => {
                self.adjust_tracked_memory(-(record.size as i64));
                Ok(())
            },
            Err(TelemetryError::NotFound) => {
                self.core.stats.untracked_frees.fetch_add(1, Ordering::Relaxed);
                self.push_event(Severity::Warning, Subsystem::Core, |event| {
                    write_bounded(
                        &mut event.message,
                        format_args!("Attempted to free untracked memory address {:#x}", address),
                    );
                });
                Err(TelemetryError::NotFound)
            },
            Err(err) => Err(err),
        }
    }

    fn adjust_tracked_memory(&self, delta: i64) {
        let id = self.predefined().tracked_memory;
        if id.is_valid() {
            // Disabled metric or switch off: the tracker stays authoritative.
            let _ = self.adjust_gauge(id, delta);
        }
    }

    /// Report live allocations older than `threshold_ms`
    ///
    /// Each leak is reported once with a Warning event; a summary Error
    /// event counting every outstanding leak follows whenever new leaks
    /// were found.
    pub fn scan_leaks(&self, threshold_ms: u64) -> TelemetryResult<LeakSummary> {
        self.ensure_ready()?;
        let now = self.now_ns();
        let scan = self
            .core
            .memory
            .lock()
            .scan(now, threshold_ms.saturating_mul(NS_PER_MS));

        for leak in &scan.new_leaks {
            self.push_event(Severity::Warning, Subsystem::Core, |event| {
                write_bounded(
                    &mut event.message,
                    format_args!(
                        "Memory leak detected: {} bytes at {:#x} (allocated at {}:{})",
                        leak.size, leak.address, leak.file, leak.line
                    ),
                );
                write_bounded(
                    &mut event.details,
                    format_args!("age {} ms", leak.age_ns / NS_PER_MS),
                );
            });
            if let Some(owner) = leak.owner {
                self.core.health.lock().note_leak(owner);
            }
        }

        let summary = LeakSummary {
            new_leaks: scan.new_leaks.len() as u32,
            leaks: scan.outstanding,
            bytes: scan.outstanding_bytes,
        };
        if summary.new_leaks > 0 {
            self.core
                .stats
                .leaks_detected
                .fetch_add(summary.new_leaks as u64, Ordering::Relaxed);
            self.push_event(Severity::Error, Subsystem::Core, |event| {
                write_bounded(
                    &mut event.message,
                    format_args!(
                        "Memory leak summary: {} leaks totaling {} bytes",
                        summary.leaks, summary.bytes
                    ),
                );
            });
            log::warn!(
                "telemetry: {} new leaks, {} outstanding ({} bytes)",
                summary.new_leaks,
                summary.leaks,
                summary.bytes
            );
        }
        Ok(summary)
    }

    /// Live tracked allocations
    pub fn tracked_allocations(&self) -> usize {
        self.core.memory.lock().live_count()
    }

    // ========================================================================
    // DRIVER HEALTH
    // ========================================================================

    /// Register a driver and evaluate it once
    pub fn register_driver(&self, driver: Arc<dyn DriverHandle>) -> TelemetryResult<DriverId> {
        self.ensure_ready()?;
        let config = self.config();
        let policy = RecoveryPolicy {
            auto_recovery: config.auto_recovery,
            threshold: config.recovery_threshold,
            ..RecoveryPolicy::default()
        };
        let sample = DriverSample::read(driver.as_ref());
        let now = self.now_ns();
        let eval = self.core.health.lock().register(driver, sample, policy, now)?;

        self.push_event(Severity::Info, Subsystem::Core, |event| {
            write_bounded(
                &mut event.message,
                format_args!(
                    "Registered driver '{}' ({}) with status {}",
                    eval.name, eval.id, eval.to
                ),
            );
        });
        log::info!("telemetry: monitoring driver '{}' as {}", eval.name, eval.id);
        if eval.recovery_due {
            self.recover(&eval)?;
        }
        Ok(eval.id)
    }

    /// Re-evaluate one driver now
    pub fn update_driver_health(&self, id: DriverId) -> TelemetryResult<HealthStatus> {
        self.ensure_ready()?;
        let handle = self.core.health.lock().handle(id)?;
        let sample = DriverSample::read(handle.as_ref());
        self.evaluate_driver(id, sample)
    }

    /// Re-evaluate every registered driver; returns how many were checked
    pub fn check_all_driver_health(&self) -> TelemetryResult<usize> {
        self.ensure_ready()?;
        let handles = self.core.health.lock().handles();
        for (id, handle) in &handles {
            let sample = DriverSample::read(handle.as_ref());
            self.evaluate_driver(*id, sample)?;
        }
        Ok(handles.len())
    }

    fn evaluate_driver(&self, id: DriverId, sample: DriverSample) -> TelemetryResult<HealthStatus> {
        let now = self.now_ns();
        let eval = self.core.health.lock().apply(id, sample, now)?;
        self.core.stats.health_checks.fetch_add(1, Ordering::Relaxed);

        if eval.changed() {
            self.log_transition(&eval.name, eval.from, eval.to, None);
        }
        if eval.recovery_due {
            return self.recover(&eval);
        }
        Ok(eval.to)
    }

    fn log_transition(&self, name: &str, from: HealthStatus, to: HealthStatus, reason: Option<&dyn fmt::Display>) {
        let severity = if to.is_failing() {
            Severity::Critical
        } else {
            Severity::Warning
        };
        self.push_event(severity, Subsystem::Core, |event| {
            write_bounded(
                &mut event.message,
                format_args!("Driver '{}' health changed from {} to {}", name, from, to),
            );
            if let Some(reason) = reason {
                write_bounded(&mut event.details, format_args!("{}", reason));
            }
        });
    }

    fn recover(&self, eval: &Evaluation) -> TelemetryResult<HealthStatus> {
        let hook = if eval.auto_recovery {
            self.core.recovery_hook.read().clone()
        } else {
            None
        };

        let Some(hook) = hook else {
            let from = self.core.health.lock().mark_failed(eval.id, self.now_ns(), false)?;
            self.log_transition(&eval.name, from, HealthStatus::Failed, None);
            log::error!(
                "telemetry: driver '{}' failed after {} failing checks (no recovery)",
                eval.name,
                eval.failures
            );
            return Ok(HealthStatus::Failed);
        };

        self.core.stats.recoveries_attempted.fetch_add(1, Ordering::Relaxed);
        self.push_event(Severity::Recovery, Subsystem::Core, |event| {
            write_bounded(
                &mut event.message,
                format_args!(
                    "Initiating auto-recovery for driver '{}' after {} consecutive failures",
                    eval.name, eval.failures
                ),
            );
        });
        log::warn!("telemetry: restarting driver '{}'", eval.name);

        match hook.restart(eval.driver.as_ref()) {
            Ok(()) => {
                let restarted = self.core.health.lock().record_restart(eval.id);
                let restarts =
                    restarted.map_err(|_| self.internal_error("health record lost during recovery"))?;
                self.push_event(Severity::Recovery, Subsystem::Core, |event| {
                    write_bounded(
                        &mut event.message,
                        format_args!("Driver '{}' restarted (restart #{})", eval.name, restarts),
                    );
                });
                Ok(eval.to)
            },
            Err(err) => {
                let from = self.core.health.lock().mark_failed(eval.id, self.now_ns(), true)?;
                self.log_transition(&eval.name, from, HealthStatus::Failed, Some(&err));
                log::error!("telemetry: restart of driver '{}' failed: {}", eval.name, err);
                Ok(HealthStatus::Failed)
            },
        }
    }

    /// Current status of a driver
    pub fn driver_health(&self, id: DriverId) -> TelemetryResult<HealthStatus> {
        self.ensure_ready()?;
        self.core.health.lock().get(id).map(|record| record.status)
    }

    /// Full health record of a driver
    pub fn driver_health_record(&self, id: DriverId) -> TelemetryResult<DriverHealth> {
        self.ensure_ready()?;
        self.core.health.lock().get(id).cloned()
    }

    /// Change a driver's recovery policy
    pub fn set_auto_recovery(&self, id: DriverId, enabled: bool, threshold: u32) -> TelemetryResult<()> {
        self.ensure_ready()?;
        self.core.health.lock().set_auto_recovery(id, enabled, threshold)
    }

    /// Install the driver framework's restart hook
    pub fn set_recovery_hook(&self, hook: Arc<dyn RecoveryHook>) {
        *self.core.recovery_hook.write() = Some(hook);
    }

    /// Install trend and prediction callbacks
    ///
    /// The callbacks run under the registry lock and must not call back
    /// into the manager.
    pub fn set_analytics_hook(&self, hook: Arc<dyn AnalyticsHook>) {
        *self.core.analytics_hook.write() = Some(hook);
    }

    /// Registered drivers
    pub fn driver_count(&self) -> usize {
        self.core.health.lock().len()
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    /// Lifetime counters and table occupancy
    pub fn stats(&self) -> TelemetryStats {
        let s = &self.core.stats;
        let metrics_collected = s.metrics_collected.load(Ordering::Relaxed);
        let total_overhead = s.total_overhead_ns.load(Ordering::Relaxed);
        let metric_count = self.core.registry.lock().len();
        let driver_count = self.core.health.lock().len();
        let (tracked_allocations, tracked_bytes) = {
            let memory = self.core.memory.lock();
            (memory.live_count(), memory.live_bytes())
        };

        TelemetryStats {
            metrics_collected,
            events_logged: s.events_logged.load(Ordering::Relaxed),
            health_checks: s.health_checks.load(Ordering::Relaxed),
            anomalies_detected: s.anomalies_detected.load(Ordering::Relaxed),
            predictions_made: s.predictions_made.load(Ordering::Relaxed),
            leaks_detected: s.leaks_detected.load(Ordering::Relaxed),
            untracked_frees: s.untracked_frees.load(Ordering::Relaxed),
            recoveries_attempted: s.recoveries_attempted.load(Ordering::Relaxed),
            current_overhead_ns: s.current_overhead_ns.load(Ordering::Relaxed),
            peak_overhead_ns: s.peak_overhead_ns.load(Ordering::Relaxed),
            average_overhead_ns: total_overhead.checked_div(metrics_collected).unwrap_or(0),
            metric_count,
            driver_count,
            events_buffered: self.core.events.len(),
            events_overwritten: self.core.events.overwritten(),
            tracked_allocations,
            tracked_bytes,
        }
    }
}

impl fmt::Debug for TelemetryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryManager")
            .field("initialized", &self.is_initialized())
            .field("events", &self.core.events)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
