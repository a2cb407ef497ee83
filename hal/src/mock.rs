//! # Mock Platform
//!
//! Deterministic [`Platform`] for tests. The monotonic clock only moves when
//! the test advances it, samplers return whatever the test last set, and
//! stack captures produce synthetic kernel-looking addresses. Threads are
//! real std threads so collector lifecycles can be exercised end to end.

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{HalError, HalResult};
use crate::platform::{Platform, ThreadEntry, ThreadHandle, MAX_STACK_DEPTH};
use crate::threads::{self, ThreadTable};
use crate::time::{WallTime, NS_PER_MS};

/// Base of the synthetic return addresses produced by `capture_stack`
const FAKE_TEXT_BASE: u64 = 0xffff_ffff_8100_0000;

/// Wall-clock origin of the mock (2026-01-01T00:00:00Z)
const WALL_ORIGIN_NS: u64 = 1_767_225_600 * crate::time::NS_PER_SEC;

/// Test platform with a manually driven clock
pub struct MockPlatform {
    now: AtomicU64,
    threads: ThreadTable,
    reserved: AtomicUsize,
    budget: AtomicUsize,
    memory_bytes: AtomicU64,
    cpu_percent: AtomicU32,
    devices: AtomicU32,
    cpu_id: AtomicU32,
    stack_depth: AtomicUsize,
    real_sleep_ms: AtomicU64,
}

impl MockPlatform {
    /// Create a mock platform with the clock at zero
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
            threads: ThreadTable::new(),
            reserved: AtomicUsize::new(0),
            budget: AtomicUsize::new(usize::MAX),
            memory_bytes: AtomicU64::new(0),
            cpu_percent: AtomicU32::new(0),
            devices: AtomicU32::new(0),
            cpu_id: AtomicU32::new(0),
            stack_depth: AtomicUsize::new(4),
            real_sleep_ms: AtomicU64::new(1),
        }
    }

    /// Move the monotonic clock forward
    pub fn advance_ns(&self, ns: u64) {
        self.now.fetch_add(ns, Ordering::SeqCst);
    }

    /// Move the monotonic clock forward in milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.advance_ns(ms * NS_PER_MS);
    }

    /// Set the monotonic clock
    pub fn set_now_ns(&self, ns: u64) {
        self.now.store(ns, Ordering::SeqCst);
    }

    /// Limit total reservable bytes
    pub fn set_memory_budget(&self, bytes: usize) {
        self.budget.store(bytes, Ordering::SeqCst);
    }

    /// Bytes currently reserved
    pub fn reserved_bytes(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    /// Value returned by `memory_usage_bytes`
    pub fn set_memory_usage(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Value returned by `cpu_usage_percent`
    pub fn set_cpu_usage(&self, percent: u32) {
        self.cpu_percent.store(percent, Ordering::SeqCst);
    }

    /// Value returned by `active_device_count`
    pub fn set_device_count(&self, count: u32) {
        self.devices.store(count, Ordering::SeqCst);
    }

    /// Value returned by `current_cpu_id`
    pub fn set_cpu_id(&self, cpu: u32) {
        self.cpu_id.store(cpu, Ordering::SeqCst);
    }

    /// Number of frames `capture_stack` reports
    pub fn set_stack_depth(&self, depth: usize) {
        self.stack_depth.store(depth.min(MAX_STACK_DEPTH), Ordering::SeqCst);
    }

    /// Real time slept per `sleep_ms` call, regardless of the requested span
    pub fn set_real_sleep_ms(&self, ms: u64) {
        self.real_sleep_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockPlatform")
            .field("now_ns", &self.now.load(Ordering::Relaxed))
            .field("reserved", &self.reserved_bytes())
            .finish()
    }
}

impl Platform for MockPlatform {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> WallTime {
        WallTime::from_nanos(WALL_ORIGIN_NS + self.now_ns())
    }

    fn spawn_thread(&self, name: &'static str, entry: ThreadEntry) -> HalResult<ThreadHandle> {
        self.threads.spawn(name, entry)
    }

    fn join_thread(&self, handle: ThreadHandle, timeout_ms: u64) -> bool {
        self.threads.join(handle, timeout_ms)
    }

    fn terminate_thread(&self, handle: ThreadHandle) {
        self.threads.detach(handle);
    }

    fn sleep_ms(&self, _ms: u64) {
        // Keep collector loops cheap without tying them to the mock clock.
        thread::sleep(Duration::from_millis(self.real_sleep_ms.load(Ordering::Relaxed)));
    }

    fn capture_stack(&self, out: &mut [u64]) -> usize {
        let depth = self.stack_depth.load(Ordering::Relaxed).min(out.len());
        for (frame, slot) in out.iter_mut().take(depth).enumerate() {
            *slot = FAKE_TEXT_BASE + (frame as u64) * 0x40;
        }
        depth
    }

    fn current_thread_id(&self) -> u32 {
        threads::current_thread_id()
    }

    fn current_cpu_id(&self) -> u32 {
        self.cpu_id.load(Ordering::Relaxed)
    }

    fn reserve_memory(&self, bytes: usize) -> HalResult<()> {
        let budget = self.budget.load(Ordering::SeqCst);
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= budget)
            })
            .map(|_| ())
            .map_err(|_| HalError::OutOfMemory { requested: bytes })
    }

    fn release_memory(&self, bytes: usize) {
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    fn memory_usage_bytes(&self) -> u64 {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    fn cpu_usage_percent(&self) -> u32 {
        self.cpu_percent.load(Ordering::Relaxed)
    }

    fn active_device_count(&self) -> u32 {
        self.devices.load(Ordering::Relaxed)
    }
}
