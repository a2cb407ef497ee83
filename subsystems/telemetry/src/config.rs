//! # Telemetry Configuration
//!
//! Runtime flags, sampling hints, alert thresholds and table capacities.
//! Capacities are consumed once by `init`; everything else may be swapped on
//! a live core through `configure`.
//!
//! A configuration can also be loaded from a small sectioned text format:
//!
//! ```text
//! enabled = true
//! event_capacity = 4096
//!
//! [alerts]
//! alert_threshold = 75
//! critical_threshold = 90
//! ```

use core::fmt;

use bitflags::bitflags;

use crate::error::TelemetryError;

bitflags! {
    /// Background collector threads started by `init`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Collectors: u8 {
        /// Platform sampler and rate windows
        const PERFORMANCE = 1 << 0;
        /// Driver health evaluation
        const HEALTH      = 1 << 1;
        /// Anomaly sweep, leak scan and predictive pass
        const ANALYTICS   = 1 << 2;
    }
}

// ============================================================================
// NESTED SECTIONS
// ============================================================================

/// Advisory sample-rate hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    /// Performance sampling hint (Hz)
    pub performance_hz: u32,
    /// Memory sampling hint (Hz)
    pub memory_hz: u32,
    /// I/O sampling hint (Hz)
    pub io_hz: u32,
    /// Allow the performance sampler to back off when overhead climbs
    pub adaptive: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            performance_hz: 1000,
            memory_hz: 10,
            io_hz: 100,
            adaptive: true,
        }
    }
}

/// CPU thresholds driving health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertConfig {
    /// CPU percentage above which a driver is in Warning
    pub alert_threshold: u32,
    /// CPU percentage above which a driver is Critical
    pub critical_threshold: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 80,
            critical_threshold: 95,
        }
    }
}

/// Anomaly detector policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyConfig {
    /// Deviation multiplier applied to the baseline
    pub k: u32,
    /// Updates required before a metric is checked
    pub baseline_window: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            k: 3,
            baseline_window: 10,
        }
    }
}

// ============================================================================
// TELEMETRY CONFIG
// ============================================================================

/// Complete telemetry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Master switch; metric updates become successful no-ops when off
    pub enabled: bool,
    /// Performance sampler period
    pub collection_interval_ms: u32,
    /// Run the performance sampler
    pub real_time_monitoring: bool,
    /// Run the anomaly detector
    pub anomaly_detection: bool,
    /// Run the predictive pass of the analytics collector
    pub predictive_analytics: bool,
    /// Sampling hints
    pub sampling: SamplingConfig,
    /// Health thresholds
    pub alerts: AlertConfig,
    /// Anomaly policy
    pub anomaly: AnomalyConfig,
    /// Event ring slots
    pub event_capacity: u32,
    /// Metric registry slots
    pub metric_capacity: u32,
    /// Live allocation records
    pub memory_tracking_capacity: u32,
    /// Collector threads spawned at init
    pub collectors: Collectors,
    /// Health checker period
    pub health_check_interval_ms: u32,
    /// Analytics period
    pub analytics_interval_ms: u32,
    /// Analytics cycles per predictive pass
    pub prediction_every: u32,
    /// Age after which a live allocation is a leak
    pub leak_threshold_ms: u64,
    /// Join grace before collector threads are terminated
    pub shutdown_grace_ms: u32,
    /// Default consecutive failures before auto-recovery
    pub recovery_threshold: u32,
    /// Default auto-recovery flag for new drivers
    pub auto_recovery: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_ms: 100,
            real_time_monitoring: true,
            anomaly_detection: true,
            predictive_analytics: true,
            sampling: SamplingConfig::default(),
            alerts: AlertConfig::default(),
            anomaly: AnomalyConfig::default(),
            event_capacity: 10_000,
            metric_capacity: 1024,
            memory_tracking_capacity: 10_000,
            collectors: Collectors::all(),
            health_check_interval_ms: 1000,
            analytics_interval_ms: 5000,
            prediction_every: 10,
            leak_threshold_ms: 30_000,
            shutdown_grace_ms: 2000,
            recovery_threshold: 3,
            auto_recovery: true,
        }
    }
}

impl TelemetryConfig {
    /// Configuration with no background threads; the host drives every tick
    pub fn manual() -> Self {
        Self::default().with_collectors(Collectors::empty())
    }

    /// Set the collector threads
    pub fn with_collectors(mut self, collectors: Collectors) -> Self {
        self.collectors = collectors;
        self
    }

    /// Set the event ring capacity
    pub fn with_event_capacity(mut self, capacity: u32) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the metric registry capacity
    pub fn with_metric_capacity(mut self, capacity: u32) -> Self {
        self.metric_capacity = capacity;
        self
    }

    /// Set the memory tracker capacity
    pub fn with_tracking_capacity(mut self, capacity: u32) -> Self {
        self.memory_tracking_capacity = capacity;
        self
    }

    /// Toggle the anomaly detector
    pub fn with_anomaly_detection(mut self, enabled: bool) -> Self {
        self.anomaly_detection = enabled;
        self
    }

    /// Set the anomaly policy
    pub fn with_anomaly(mut self, k: u32, baseline_window: u32) -> Self {
        self.anomaly = AnomalyConfig { k, baseline_window };
        self
    }

    /// Set the CPU thresholds
    pub fn with_alerts(mut self, alert_threshold: u32, critical_threshold: u32) -> Self {
        self.alerts = AlertConfig {
            alert_threshold,
            critical_threshold,
        };
        self
    }

    /// Set the collector periods
    pub fn with_intervals(mut self, collection_ms: u32, health_ms: u32, analytics_ms: u32) -> Self {
        self.collection_interval_ms = collection_ms;
        self.health_check_interval_ms = health_ms;
        self.analytics_interval_ms = analytics_ms;
        self
    }

    /// Set the default recovery policy for new drivers
    pub fn with_recovery(mut self, auto_recovery: bool, threshold: u32) -> Self {
        self.auto_recovery = auto_recovery;
        self.recovery_threshold = threshold;
        self
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("collection_interval_ms", self.collection_interval_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("analytics_interval_ms", self.analytics_interval_ms),
            ("prediction_every", self.prediction_every),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        let capacities = [
            ("event_capacity", self.event_capacity),
            ("metric_capacity", self.metric_capacity),
            ("memory_tracking_capacity", self.memory_tracking_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }

        if self.alerts.critical_threshold > 100 || self.alerts.alert_threshold > 100 {
            return Err(ConfigError::ThresholdRange);
        }
        if self.alerts.alert_threshold > self.alerts.critical_threshold {
            return Err(ConfigError::ThresholdOrder);
        }
        if self.anomaly.k == 0 {
            return Err(ConfigError::ZeroMultiplier);
        }
        if self.recovery_threshold == 0 {
            return Err(ConfigError::ZeroInterval("recovery_threshold"));
        }
        Ok(())
    }

    /// Parse the sectioned `key = value` format, starting from defaults
    ///
    /// `#` starts a comment. Booleans accept `true`/`false` or `1`/`0`.
    /// Collector sets are written as `collectors = performance|health`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let mut section = "";

        for raw in input.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Malformed);
            };
            cfg.apply(section, key.trim(), value.trim())?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match (section, key) {
            ("", "enabled") => self.enabled = parse_bool(value)?,
            ("", "collection_interval_ms") => self.collection_interval_ms = parse_u32(value)?,
            ("", "real_time_monitoring") => self.real_time_monitoring = parse_bool(value)?,
            ("", "anomaly_detection") => self.anomaly_detection = parse_bool(value)?,
            ("", "predictive_analytics") => self.predictive_analytics = parse_bool(value)?,
            ("", "event_capacity") => self.event_capacity = parse_u32(value)?,
            ("", "metric_capacity") => self.metric_capacity = parse_u32(value)?,
            ("", "memory_tracking_capacity") => self.memory_tracking_capacity = parse_u32(value)?,
            ("", "collectors") => self.collectors = parse_collectors(value)?,
            ("", "health_check_interval_ms") => self.health_check_interval_ms = parse_u32(value)?,
            ("", "analytics_interval_ms") => self.analytics_interval_ms = parse_u32(value)?,
            ("", "prediction_every") => self.prediction_every = parse_u32(value)?,
            ("", "leak_threshold_ms") => {
                self.leak_threshold_ms = value.parse().map_err(|_| ConfigError::Malformed)?
            },
            ("", "shutdown_grace_ms") => self.shutdown_grace_ms = parse_u32(value)?,
            ("", "recovery_threshold") => self.recovery_threshold = parse_u32(value)?,
            ("", "auto_recovery") => self.auto_recovery = parse_bool(value)?,
            ("sampling", "performance_hz") => self.sampling.performance_hz = parse_u32(value)?,
            ("sampling", "memory_hz") => self.sampling.memory_hz = parse_u32(value)?,
            ("sampling", "io_hz") => self.sampling.io_hz = parse_u32(value)?,
            ("sampling", "adaptive") => self.sampling.adaptive = parse_bool(value)?,
            ("alerts", "alert_threshold") => self.alerts.alert_threshold = parse_u32(value)?,
            ("alerts", "critical_threshold") => self.alerts.critical_threshold = parse_u32(value)?,
            ("anomaly", "k") => self.anomaly.k = parse_u32(value)?,
            ("anomaly", "baseline_window") => self.anomaly.baseline_window = parse_u32(value)?,
            _ => return Err(ConfigError::UnknownKey),
        }
        Ok(())
    }
}

fn parse_u32(value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::Malformed)
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::Malformed),
    }
}

fn parse_collectors(value: &str) -> Result<Collectors, ConfigError> {
    let mut set = Collectors::empty();
    for part in value.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        set |= match part {
            "performance" => Collectors::PERFORMANCE,
            "health" => Collectors::HEALTH,
            "analytics" => Collectors::ANALYTICS,
            "all" => Collectors::all(),
            "none" => Collectors::empty(),
            _ => return Err(ConfigError::Malformed),
        };
    }
    Ok(set)
}

// ============================================================================
// CONFIG ERROR
// ============================================================================

/// Configuration rejected by `validate` or `parse`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A period or cycle count is zero
    ZeroInterval(&'static str),
    /// A table capacity is zero
    ZeroCapacity(&'static str),
    /// A CPU threshold exceeds 100
    ThresholdRange,
    /// `alert_threshold` exceeds `critical_threshold`
    ThresholdOrder,
    /// Anomaly multiplier is zero
    ZeroMultiplier,
    /// Unparseable line or value
    Malformed,
    /// Key not recognized in its section
    UnknownKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval(name) => write!(f, "{} must be non-zero", name),
            Self::ZeroCapacity(name) => write!(f, "{} must be non-zero", name),
            Self::ThresholdRange => write!(f, "alert thresholds must be percentages"),
            Self::ThresholdOrder => write!(f, "alert_threshold exceeds critical_threshold"),
            Self::ZeroMultiplier => write!(f, "anomaly multiplier must be non-zero"),
            Self::Malformed => write!(f, "malformed configuration line"),
            Self::UnknownKey => write!(f, "unknown configuration key"),
        }
    }
}

impl From<ConfigError> for TelemetryError {
    fn from(_: ConfigError) -> Self {
        TelemetryError::InvalidParam("configuration")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = TelemetryConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.event_capacity, 10_000);
        assert_eq!(cfg.metric_capacity, 1024);
        assert_eq!(cfg.alerts.critical_threshold, 95);
        assert_eq!(cfg.collectors, Collectors::all());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = TelemetryConfig::default().with_event_capacity(0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCapacity("event_capacity")));

        let cfg = TelemetryConfig::default().with_alerts(96, 95);
        assert_eq!(cfg.validate(), Err(ConfigError::ThresholdOrder));

        let cfg = TelemetryConfig::default().with_alerts(80, 101);
        assert_eq!(cfg.validate(), Err(ConfigError::ThresholdRange));

        let cfg = TelemetryConfig::default().with_anomaly(0, 10);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMultiplier));

        let cfg = TelemetryConfig::default().with_intervals(0, 1000, 5000);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroInterval("collection_interval_ms"))
        );
    }

    #[test]
    fn test_parse_sections() {
        let text = "\
            # host overrides\n\
            event_capacity = 64\n\
            collectors = health|analytics\n\
            \n\
            [alerts]\n\
            alert_threshold = 70   # lower\n\
            critical_threshold = 90\n\
            [sampling]\n\
            adaptive = false\n";
        let cfg = TelemetryConfig::parse(text).unwrap();
        assert_eq!(cfg.event_capacity, 64);
        assert_eq!(cfg.collectors, Collectors::HEALTH | Collectors::ANALYTICS);
        assert_eq!(cfg.alerts.alert_threshold, 70);
        assert_eq!(cfg.alerts.critical_threshold, 90);
        assert!(!cfg.sampling.adaptive);
        assert_eq!(cfg.metric_capacity, 1024);
    }

    #[test]
    fn test_parse_rejects_unknown_and_invalid() {
        assert_eq!(
            TelemetryConfig::parse("[alerts]\nbogus = 1\n"),
            Err(ConfigError::UnknownKey)
        );
        assert_eq!(
            TelemetryConfig::parse("enabled = maybe\n"),
            Err(ConfigError::Malformed)
        );
        assert_eq!(
            TelemetryConfig::parse("[anomaly]\nk = 0\n"),
            Err(ConfigError::ZeroMultiplier)
        );
    }

    #[test]
    fn test_config_error_converts() {
        let err: TelemetryError = ConfigError::ThresholdOrder.into();
        assert_eq!(err.code(), -1);
    }
}
