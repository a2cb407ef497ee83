//! # Event Ring
//!
//! Fixed-capacity FIFO of diagnostic events with overwrite-oldest on
//! overflow. Slots are preallocated at construction and reused in place.
//!
//! ```text
//!   head                 head + len
//!    |                        |
//!    v                        v
//!  +----+----+----+----+----+----+----+
//!  | E3 | E4 | E5 | E6 |    |    |    |   slots (capacity)
//!  +----+----+----+----+----+----+----+
//! ```

use alloc::vec::Vec;

use helix_hal::sync::Mutex;
use helix_hal::{Platform, MAX_STACK_DEPTH};

use super::{DiagnosticEvent, EventId, Severity, StackTrace};
use crate::error::{TelemetryError, TelemetryResult};
use crate::subsystem::Subsystem;

// ============================================================================
// RING STATE
// ============================================================================

struct RingState {
    slots: Vec<DiagnosticEvent>,
    capacity: usize,
    head: usize,
    len: usize,
    next_id: u64,
    overwritten: u64,
}

impl RingState {
    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity
    }

    /// Slot for the next event, displacing the oldest when full
    fn claim(&mut self) -> &mut DiagnosticEvent {
        let idx = if self.len < self.capacity {
            let idx = self.index(self.len);
            self.len += 1;
            idx
        } else {
            let idx = self.head;
            self.head = (self.head + 1) % self.capacity;
            self.overwritten += 1;
            idx
        };

        if idx == self.slots.len() {
            // First pass over the ring; capacity was reserved up front.
            self.slots.push(DiagnosticEvent::default());
        }
        &mut self.slots[idx]
    }
}

// ============================================================================
// EVENT RING
// ============================================================================

/// Bounded event ring
pub struct EventRing {
    state: Mutex<RingState>,
}

impl EventRing {
    /// Create a ring with `capacity` preallocated slots
    pub fn new(capacity: usize) -> TelemetryResult<Self> {
        if capacity == 0 {
            return Err(TelemetryError::InvalidParam("event capacity"));
        }
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        Ok(Self {
            state: Mutex::new(RingState {
                slots,
                capacity,
                head: 0,
                len: 0,
                next_id: 1,
                overwritten: 0,
            }),
        })
    }

    /// Bytes a ring of `capacity` slots occupies
    pub const fn footprint(capacity: usize) -> usize {
        capacity * core::mem::size_of::<DiagnosticEvent>()
    }

    /// Append an event and let `fill` write its payload
    ///
    /// The stack is captured before the ring lock is taken; id, timestamp
    /// and origin are assigned under it, so ring order, id order and
    /// timestamp order agree.
    pub fn push_with<F>(
        &self,
        platform: &dyn Platform,
        severity: Severity,
        subsystem: Subsystem,
        fill: F,
    ) -> EventId
    where
        F: FnOnce(&mut DiagnosticEvent),
    {
        let mut frames = [0u64; MAX_STACK_DEPTH];
        let depth = if severity.captures_stack() {
            platform.capture_stack(&mut frames).min(MAX_STACK_DEPTH)
        } else {
            0
        };
        let thread_id = platform.current_thread_id();
        let cpu_id = platform.current_cpu_id();

        let mut state = self.state.lock();
        let id = EventId(state.next_id);
        state.next_id += 1;
        let timestamp_ns = platform.now_ns();

        let slot = state.claim();
        slot.reset();
        slot.id = id;
        slot.severity = severity;
        slot.subsystem = subsystem;
        slot.timestamp_ns = timestamp_ns;
        slot.thread_id = thread_id;
        slot.cpu_id = cpu_id;
        slot.stack = frames[..depth].iter().copied().collect::<StackTrace>();
        fill(slot);
        id
    }

    /// Copy of the live events, oldest first
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        let state = self.state.lock();
        (0..state.len)
            .map(|offset| state.slots[state.index(offset)].clone())
            .collect()
    }

    /// Copy of the newest `count` events, oldest first
    pub fn recent(&self, count: usize) -> Vec<DiagnosticEvent> {
        let state = self.state.lock();
        let skip = state.len.saturating_sub(count);
        (skip..state.len)
            .map(|offset| state.slots[state.index(offset)].clone())
            .collect()
    }

    /// Count live events matching `pred`
    pub fn count_where<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&DiagnosticEvent) -> bool,
    {
        let state = self.state.lock();
        (0..state.len)
            .filter(|&offset| pred(&state.slots[state.index(offset)]))
            .count()
    }

    /// Live events
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    /// Whether the ring holds no events
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot count
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Events displaced by overflow
    pub fn overwritten(&self) -> u64 {
        self.state.lock().overwritten
    }

    /// Drop every event and release the slots
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.slots = Vec::new();
        state.head = 0;
        state.len = 0;
    }
}

impl core::fmt::Debug for EventRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventRing")
            .field("capacity", &state.capacity)
            .field("len", &state.len)
            .field("next_id", &state.next_id)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::text::copy_bounded;
    use helix_hal::MockPlatform;

    fn log(ring: &EventRing, platform: &MockPlatform, severity: Severity, msg: &str) -> EventId {
        ring.push_with(platform, severity, Subsystem::Core, |event| {
            copy_bounded(&mut event.message, msg);
        })
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let platform = MockPlatform::new();
        let ring = EventRing::new(4).unwrap();
        for i in 1..=6 {
            platform.advance_ns(10);
            let mut text: heapless::String<8> = heapless::String::new();
            crate::event::text::write_bounded(&mut text, format_args!("E{}", i));
            log(&ring, &platform, Severity::Info, &text);
        }

        let events = ring.drain();
        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["E3", "E4", "E5", "E6"]);
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
        assert!(events.windows(2).all(|w| w[0].timestamp_ns <= w[1].timestamp_ns));
        assert_eq!(ring.overwritten(), 2);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_drain_is_non_destructive() {
        let platform = MockPlatform::new();
        let ring = EventRing::new(8).unwrap();
        log(&ring, &platform, Severity::Info, "a");
        log(&ring, &platform, Severity::Info, "b");
        assert_eq!(ring.drain().len(), 2);
        assert_eq!(ring.drain().len(), 2);

        let recent = ring.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message.as_str(), "b");
        assert_eq!(ring.recent(10).len(), 2);
    }

    #[test]
    fn test_stack_only_for_errors() {
        let platform = MockPlatform::new();
        platform.set_stack_depth(5);
        let ring = EventRing::new(4).unwrap();
        log(&ring, &platform, Severity::Warning, "warn");
        log(&ring, &platform, Severity::Error, "err");

        let events = ring.drain();
        assert!(events[0].stack.is_empty());
        assert_eq!(events[1].stack.len(), 5);
    }

    #[test]
    fn test_reused_slot_is_reset() {
        let platform = MockPlatform::new();
        let ring = EventRing::new(1).unwrap();
        ring.push_with(&platform, Severity::Error, Subsystem::Pci, |event| {
            copy_bounded(&mut event.message, "first");
            copy_bounded(&mut event.details, "details");
            event.error_code = Some(5);
        });
        log(&ring, &platform, Severity::Info, "second");

        let events = ring.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.as_str(), "second");
        assert_eq!(events[0].details(), None);
        assert_eq!(events[0].error_code, None);
        assert!(events[0].stack.is_empty());
        assert_eq!(events[0].id, EventId(2));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(EventRing::new(0).is_err());
    }
}
