//! # Diagnostic Events
//!
//! Timestamped, severity-tagged records kept in a bounded ring. All text
//! lives inline in fixed-capacity strings, so filling a slot never touches
//! the allocator.

mod ring;
mod severity;
pub mod text;

use core::fmt;

use arrayvec::ArrayVec;
use helix_hal::MAX_STACK_DEPTH;

pub use ring::EventRing;
pub use severity::Severity;
pub use text::{Details, Message};

use crate::metric::MetricId;
use crate::subsystem::Subsystem;

/// Captured return addresses
pub type StackTrace = ArrayVec<u64, MAX_STACK_DEPTH>;

static_assertions::const_assert_eq!(MAX_STACK_DEPTH, 16);

/// Event identifier, strictly increasing per core lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// DIAGNOSTIC EVENT
// ============================================================================

/// A diagnostic event as stored in the ring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Event id
    pub id: EventId,
    /// Severity
    pub severity: Severity,
    /// Emitting subsystem
    pub subsystem: Subsystem,
    /// Monotonic timestamp (ns)
    pub timestamp_ns: u64,
    /// Originating thread
    pub thread_id: u32,
    /// Originating CPU
    pub cpu_id: u32,
    /// Short message
    pub message: Message,
    /// Long details (empty when absent)
    pub details: Details,
    /// Related metric
    pub related_metric: Option<MetricId>,
    /// Error code for error events
    pub error_code: Option<u32>,
    /// Stack trace (severity >= Error only)
    pub stack: StackTrace,
}

impl DiagnosticEvent {
    /// Details text, if any
    pub fn details(&self) -> Option<&str> {
        if self.details.is_empty() {
            None
        } else {
            Some(self.details.as_str())
        }
    }

    fn reset(&mut self) {
        self.message.clear();
        self.details.clear();
        self.related_metric = None;
        self.error_code = None;
        self.stack.clear();
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.timestamp_ns, self.severity, self.subsystem, self.message
        )
    }
}

// ============================================================================
// EVENT RECORD
// ============================================================================

/// Structured event submitted by a producer
#[derive(Debug, Clone, Copy)]
pub struct EventRecord<'a> {
    /// Severity
    pub severity: Severity,
    /// Emitting subsystem
    pub subsystem: Subsystem,
    /// Short message
    pub message: &'a str,
    /// Long details
    pub details: Option<&'a str>,
    /// Related metric
    pub related_metric: Option<MetricId>,
    /// Error code
    pub error_code: Option<u32>,
}

impl<'a> EventRecord<'a> {
    /// New record with only a message
    pub const fn new(severity: Severity, subsystem: Subsystem, message: &'a str) -> Self {
        Self {
            severity,
            subsystem,
            message,
            details: None,
            related_metric: None,
            error_code: None,
        }
    }

    /// Attach details
    pub const fn with_details(mut self, details: &'a str) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a related metric
    pub const fn with_metric(mut self, id: MetricId) -> Self {
        self.related_metric = Some(id);
        self
    }

    /// Attach an error code
    pub const fn with_error_code(mut self, code: u32) -> Self {
        self.error_code = Some(code);
        self
    }
}

/// Log a formatted event through a manager
///
/// ```ignore
/// telemetry_event!(manager, Severity::Warning, Subsystem::Usb, "port {} reset", port);
/// ```
#[macro_export]
macro_rules! telemetry_event {
    ($manager:expr, $severity:expr, $subsystem:expr, $($arg:tt)+) => {
        $manager.log_fmt($severity, $subsystem, format_args!($($arg)+))
    };
}
