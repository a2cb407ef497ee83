//! # Helix Driver Telemetry
//!
//! Metrics, diagnostic events, allocation tracking and per-driver health for
//! the driver framework, with bounded overhead on the producer path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Driver subsystems                           │
//! │       counters · gauges · histograms · timers · events · allocs      │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ MetricId / DriverId
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          TelemetryManager                            │
//! │  ┌──────────────┐ ┌─────────────┐ ┌──────────────┐ ┌──────────────┐  │
//! │  │   Metric     │ │   Event     │ │   Health     │ │  Allocation  │  │
//! │  │   Registry   │ │   Ring      │ │   Table      │ │  Tracker     │  │
//! │  └──────┬───────┘ └──────▲──────┘ └──────┬───────┘ └──────┬───────┘  │
//! │         │ anomalies      │ events        │ transitions    │ leaks    │
//! │         └────────────────┴───────────────┴────────────────┘          │
//! │                                                                      │
//! │   collectors: telemetry-perf · telemetry-health · telemetry-analytics│
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ helix_hal::Platform
//!                                    ▼
//!                 clock · threads · memory budget · samplers
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let manager = TelemetryManager::init(platform)?;
//! let ops = manager.register_metric("ops", "", MetricKind::Counter, Subsystem::Core)?;
//! manager.update_counter(ops, 1)?;
//! telemetry_event!(manager, Severity::Warning, Subsystem::Usb, "port {} reset", 3);
//! let report = manager.generate_report(DEFAULT_REPORT_LIMIT)?;
//! manager.shutdown();
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

// ============================================================================
// MODULES
// ============================================================================

pub mod anomaly;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod global;
pub mod health;
pub mod integration;
pub mod manager;
pub mod memory;
pub mod metric;
pub mod report;
pub mod subsystem;
pub mod timer;

#[cfg(test)]
mod scenarios;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use anomaly::{AnomalyPolicy, AnomalyVerdict};
pub use collector::{AnalyticsCycle, AnalyticsHook};
pub use config::{AlertConfig, AnomalyConfig, Collectors, ConfigError, SamplingConfig, TelemetryConfig};
pub use error::{Resource, TelemetryError, TelemetryResult};
pub use event::{DiagnosticEvent, EventId, EventRecord, Severity};
pub use health::{
    DriverHandle, DriverHealth, DriverId, HealthStatus, RecoveryError, RecoveryHook,
};
pub use integration::{BenchmarkResult, Dashboard, SubsystemMetrics, TopMetric};
pub use manager::{PredefinedMetrics, TelemetryManager, TelemetryStats, TELEMETRY_VERSION};
pub use memory::LeakSummary;
pub use metric::{Metric, MetricId, MetricKind, MetricValue};
pub use report::DEFAULT_REPORT_LIMIT;
pub use subsystem::Subsystem;
pub use timer::TimerToken;
