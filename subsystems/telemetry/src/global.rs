//! # Global Telemetry Instance
//!
//! Process-wide manager for producers that cannot thread a handle through.
//! Every free function here forwards to the installed manager and fails with
//! `NotInitialized` when there is none.

use alloc::sync::Arc;

use helix_hal::Platform;
use spin::RwLock;

use crate::config::TelemetryConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::event::{EventId, Severity};
use crate::manager::{PredefinedMetrics, TelemetryManager};
use crate::metric::{MetricId, MetricKind};
use crate::subsystem::Subsystem;

// =============================================================================
// GLOBAL MANAGER
// =============================================================================

static MANAGER: RwLock<Option<TelemetryManager>> = RwLock::new(None);

/// Initialize the global manager with the default configuration
pub fn init(platform: Arc<dyn Platform>) -> TelemetryResult<TelemetryManager> {
    init_with_config(platform, TelemetryConfig::default())
}

/// Initialize the global manager
///
/// Idempotent: when a manager is already installed it is returned and
/// `platform` and `config` are ignored.
pub fn init_with_config(platform: Arc<dyn Platform>, config: TelemetryConfig) -> TelemetryResult<TelemetryManager> {
    let mut slot = MANAGER.write();
    if let Some(manager) = slot.as_ref() {
        return Ok(manager.clone());
    }
    let manager = TelemetryManager::init_with_config(platform, config)?;
    *slot = Some(manager.clone());
    Ok(manager)
}

/// Shut the global manager down and uninstall it
pub fn shutdown() {
    let manager = MANAGER.write().take();
    if let Some(manager) = manager {
        manager.shutdown();
    }
}

/// Check if a global manager is installed
pub fn is_initialized() -> bool {
    MANAGER.read().is_some()
}

/// Run `f` against the global manager
pub fn with_manager<F, R>(f: F) -> TelemetryResult<R>
where
    F: FnOnce(&TelemetryManager) -> R,
{
    let manager = MANAGER
        .read()
        .as_ref()
        .cloned()
        .ok_or(TelemetryError::NotInitialized)?;
    Ok(f(&manager))
}

/// Predefined metric ids; all zero when no manager is installed
pub fn predefined() -> PredefinedMetrics {
    with_manager(|m| m.predefined()).unwrap_or_default()
}

// =============================================================================
// PRODUCER SHORTHANDS
// =============================================================================

/// Register a metric on the global manager
pub fn register_metric(
    name: &str,
    description: &str,
    kind: MetricKind,
    subsystem: Subsystem,
) -> TelemetryResult<MetricId> {
    with_manager(|m| m.register_metric(name, description, kind, subsystem))?
}

/// Add to a counter on the global manager
pub fn update_counter(id: MetricId, delta: u64) -> TelemetryResult<()> {
    with_manager(|m| m.update_counter(id, delta))?
}

/// Set a gauge on the global manager
pub fn update_gauge(id: MetricId, value: i64) -> TelemetryResult<()> {
    with_manager(|m| m.update_gauge(id, value))?
}

/// Record a histogram sample on the global manager
pub fn record_histogram(id: MetricId, value: u64) -> TelemetryResult<()> {
    with_manager(|m| m.record_histogram(id, value))?
}

/// Record a timer duration on the global manager
pub fn update_timer(id: MetricId, duration_ns: u64) -> TelemetryResult<()> {
    with_manager(|m| m.update_timer(id, duration_ns))?
}

/// Log an event on the global manager
pub fn log_str(severity: Severity, subsystem: Subsystem, message: &str) -> TelemetryResult<EventId> {
    with_manager(|m| m.log_str(severity, subsystem, message))?
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use helix_hal::MockPlatform;

    // Single test: the global slot is shared by the whole test binary.
    #[test]
    fn test_global_lifecycle() {
        assert!(!is_initialized());
        assert_eq!(predefined(), PredefinedMetrics::default());
        assert_eq!(update_counter(MetricId(1), 1), Err(TelemetryError::NotInitialized));

        let platform = Arc::new(MockPlatform::new());
        let first = init_with_config(platform.clone(), TelemetryConfig::manual()).unwrap();
        let second = init(Arc::new(MockPlatform::new())).unwrap();
        assert!(Arc::ptr_eq(&first.core, &second.core));
        assert_eq!(first.collector_count(), 0);

        let id = register_metric("ops", "", MetricKind::Counter, Subsystem::Core).unwrap();
        update_counter(id, 2).unwrap();
        record_histogram(predefined().interrupt_latency, 5).unwrap();
        log_str(Severity::Info, Subsystem::Core, "hello").unwrap();
        assert_eq!(with_manager(|m| m.metric_count()).unwrap(), 9);

        shutdown();
        shutdown();
        assert!(!is_initialized());
        assert!(!first.is_initialized());
        assert_eq!(predefined(), PredefinedMetrics::default());
        assert_eq!(platform.reserved_bytes(), 0);
    }
}
