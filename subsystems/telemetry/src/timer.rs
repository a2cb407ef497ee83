//! Scoped operation timers.

use crate::event::text::{bounded, Name};
use crate::metric::MetricId;

/// Durations at or above this emit a Performance event (ns)
pub const LONG_OPERATION_NS: u64 = 10 * helix_hal::NS_PER_MS;

static_assertions::assert_not_impl_any!(TimerToken: Clone, Copy);

/// Token returned by `start_timer`, consumed by `stop_timer`
///
/// Not `Clone`: each measurement can be stopped once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a timer measures nothing until it is stopped"]
pub struct TimerToken {
    operation: Name,
    start_ns: u64,
    metric: Option<MetricId>,
}

impl TimerToken {
    pub(crate) fn new(operation: &str, start_ns: u64) -> Self {
        Self {
            operation: bounded(operation),
            start_ns,
            metric: None,
        }
    }

    /// Apply the measured duration to timer metric `id` on stop
    pub fn bind(mut self, id: MetricId) -> Self {
        self.metric = Some(id);
        self
    }

    /// Operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Start time (ns)
    pub fn start_ns(&self) -> u64 {
        self.start_ns
    }

    /// Bound metric
    pub fn metric(&self) -> Option<MetricId> {
        self.metric
    }
}
