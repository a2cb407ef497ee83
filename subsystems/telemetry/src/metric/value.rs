//! Kind-specific metric values.

use helix_hal::NS_PER_SEC;

use super::histogram::Histogram;
use super::MetricKind;

// ============================================================================
// TIMER
// ============================================================================

/// Accumulated durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    /// Sum of all durations (ns)
    pub total_ns: u64,
    /// Number of samples
    pub calls: u64,
    /// Shortest sample (`u64::MAX` when empty)
    pub min_ns: u64,
    /// Longest sample
    pub max_ns: u64,
}

impl TimerStats {
    /// Empty timer
    pub const fn new() -> Self {
        Self {
            total_ns: 0,
            calls: 0,
            min_ns: u64::MAX,
            max_ns: 0,
        }
    }

    /// Record one duration
    #[inline]
    pub fn record(&mut self, duration_ns: u64) {
        self.total_ns = self.total_ns.saturating_add(duration_ns);
        self.calls += 1;
        self.min_ns = self.min_ns.min(duration_ns);
        self.max_ns = self.max_ns.max(duration_ns);
    }

    /// Mean duration, 0 when empty
    pub const fn average_ns(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_ns / self.calls
        }
    }
}

impl Default for TimerStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RATE
// ============================================================================

/// Counter with a one-second rate window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateWindow {
    /// Lifetime total
    pub total: u64,
    /// Start of the current window (ns)
    pub window_start_ns: u64,
    /// Total when the current window opened
    pub window_base: u64,
    /// Rate of the last completed window
    pub last_rate: Option<u64>,
}

impl RateWindow {
    /// Window opened at `now_ns`
    pub const fn new(now_ns: u64) -> Self {
        Self {
            total: 0,
            window_start_ns: now_ns,
            window_base: 0,
            last_rate: None,
        }
    }

    fn window_rate(&self, now_ns: u64) -> u64 {
        let elapsed = now_ns.saturating_sub(self.window_start_ns);
        if elapsed == 0 {
            return 0;
        }
        let delta = self.total.saturating_sub(self.window_base) as u128;
        (delta * NS_PER_SEC as u128 / elapsed as u128).min(u64::MAX as u128) as u64
    }

    /// Per-second rate at `now_ns`
    ///
    /// A window younger than one second reports the last completed one when
    /// there is one.
    pub fn per_second(&self, now_ns: u64) -> u64 {
        let elapsed = now_ns.saturating_sub(self.window_start_ns);
        match self.last_rate {
            Some(rate) if elapsed < NS_PER_SEC => rate,
            _ => self.window_rate(now_ns),
        }
    }

    /// Close the current window if it is at least one second old
    pub fn roll(&mut self, now_ns: u64) {
        if now_ns.saturating_sub(self.window_start_ns) >= NS_PER_SEC {
            self.last_rate = Some(self.window_rate(now_ns));
            self.window_start_ns = now_ns;
            self.window_base = self.total;
        }
    }
}

// ============================================================================
// METRIC VALUE
// ============================================================================

/// Tagged metric value; the variant is fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    /// Monotonic accumulator
    Counter(u64),
    /// Instantaneous signed value
    Gauge(i64),
    /// Counter with a derived per-second rate
    Rate(RateWindow),
    /// Duration accumulator
    Timer(TimerStats),
    /// Logarithmic histogram
    Histogram(Histogram),
    /// Gauge in bytes
    Memory(i64),
    /// Gauge in bytes per second
    Bandwidth(i64),
}

impl MetricValue {
    /// Initial value for `kind`
    pub const fn new(kind: MetricKind, now_ns: u64) -> Self {
        match kind {
            MetricKind::Counter => MetricValue::Counter(0),
            MetricKind::Gauge => MetricValue::Gauge(0),
            MetricKind::Rate => MetricValue::Rate(RateWindow::new(now_ns)),
            MetricKind::Timer => MetricValue::Timer(TimerStats::new()),
            MetricKind::Histogram => MetricValue::Histogram(Histogram::new()),
            MetricKind::Memory => MetricValue::Memory(0),
            MetricKind::Bandwidth => MetricValue::Bandwidth(0),
        }
    }

    /// Kind tag of this value
    pub const fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Rate(_) => MetricKind::Rate,
            MetricValue::Timer(_) => MetricKind::Timer,
            MetricValue::Histogram(_) => MetricKind::Histogram,
            MetricValue::Memory(_) => MetricKind::Memory,
            MetricValue::Bandwidth(_) => MetricKind::Bandwidth,
        }
    }

    /// Signed value of gauge-like metrics
    pub const fn gauge(&self) -> Option<i64> {
        match self {
            MetricValue::Gauge(v) | MetricValue::Memory(v) | MetricValue::Bandwidth(v) => Some(*v),
            _ => None,
        }
    }

    /// Accumulated total of counter-like metrics
    pub const fn total(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            MetricValue::Rate(r) => Some(r.total),
            _ => None,
        }
    }

    /// Magnitude used to rank metrics on the dashboard
    pub fn magnitude(&self) -> u64 {
        match self {
            MetricValue::Counter(v) => *v,
            MetricValue::Gauge(v) | MetricValue::Memory(v) | MetricValue::Bandwidth(v) => {
                v.unsigned_abs()
            },
            MetricValue::Rate(r) => r.total,
            MetricValue::Timer(t) => t.total_ns,
            MetricValue::Histogram(h) => h.sum,
        }
    }
}
