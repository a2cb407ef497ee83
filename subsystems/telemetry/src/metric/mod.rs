//! # Metrics
//!
//! Typed statistical channels addressed by dense numeric ids.
//!
//! ```text
//!   id 1        id 2        id 3
//! +-----------+-----------+-----------+---- - -
//! | Timer     | Histogram | Gauge     |
//! | load_time | irq_lat   | mem_usage |
//! +-----------+-----------+-----------+---- - -
//!   slot 0      slot 1      slot 2
//! ```

mod histogram;
mod registry;
mod value;

use core::fmt;

pub use histogram::{Histogram, HISTOGRAM_BUCKETS};
pub use registry::MetricRegistry;
pub use value::{MetricValue, RateWindow, TimerStats};

use crate::event::text::{Description, Name};
use crate::subsystem::Subsystem;

// ============================================================================
// METRIC ID
// ============================================================================

/// Stable metric identifier; never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct MetricId(pub u32);

impl MetricId {
    /// Placeholder for "no metric"
    pub const NONE: MetricId = MetricId(0);

    /// Whether this id can refer to a metric
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Registry slot for this id
    #[inline]
    pub(crate) const fn slot(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0 as usize - 1)
        }
    }

    #[inline]
    pub(crate) const fn from_slot(slot: usize) -> Self {
        MetricId(slot as u32 + 1)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// METRIC KIND
// ============================================================================

/// Metric kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetricKind {
    /// Monotonic accumulator
    Counter   = 0,
    /// Instantaneous signed value
    Gauge     = 1,
    /// Counter with per-second rate
    Rate      = 2,
    /// Duration accumulator
    Timer     = 3,
    /// Logarithmic histogram
    Histogram = 4,
    /// Bytes gauge
    Memory    = 5,
    /// Bytes per second gauge
    Bandwidth = 6,
}

impl MetricKind {
    /// All kinds
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Rate,
        MetricKind::Timer,
        MetricKind::Histogram,
        MetricKind::Memory,
        MetricKind::Bandwidth,
    ];

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Timer => "timer",
            MetricKind::Histogram => "histogram",
            MetricKind::Memory => "memory",
            MetricKind::Bandwidth => "bandwidth",
        }
    }

    /// Accepts `update_counter`
    pub const fn is_counter_like(self) -> bool {
        matches!(self, MetricKind::Counter | MetricKind::Rate)
    }

    /// Accepts `update_gauge` and `adjust_gauge`
    pub const fn is_gauge_like(self) -> bool {
        matches!(self, MetricKind::Gauge | MetricKind::Memory | MetricKind::Bandwidth)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// METRIC
// ============================================================================

/// A registered metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    /// Metric id
    pub id: MetricId,
    /// Short name
    pub name: Name,
    /// Description
    pub description: Description,
    /// Owning subsystem
    pub subsystem: Subsystem,
    /// Updates accepted
    pub enabled: bool,
    /// Registration time (ns)
    pub registered_ns: u64,
    /// Last successful update (ns)
    pub last_update_ns: u64,
    /// Successful updates
    pub update_count: u64,
    /// Time spent in the last update (ns)
    pub overhead_ns: u64,
    /// Value
    pub value: MetricValue,
}

impl Metric {
    /// Kind tag
    #[inline]
    pub const fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}
