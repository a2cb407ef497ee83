//! # Platform Trait
//!
//! The single seam between the telemetry core and the machine it runs on.

use alloc::boxed::Box;

use crate::error::HalResult;
use crate::time::WallTime;

/// Maximum number of return addresses a stack capture records
pub const MAX_STACK_DEPTH: usize = 16;

/// Entry point of a platform thread
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to a thread spawned through [`Platform::spawn_thread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadHandle(pub u64);

/// Services the telemetry core consumes.
///
/// Implementations must be callable concurrently from any thread. Clock,
/// identity and sampler methods are infallible and must not allocate; they
/// are called on the producer hot path.
pub trait Platform: Send + Sync {
    /// Monotonic time in nanoseconds since an arbitrary origin
    fn now_ns(&self) -> u64;

    /// Wall-clock time
    fn wall_time(&self) -> WallTime;

    /// Spawn a named thread running `entry`
    fn spawn_thread(&self, name: &'static str, entry: ThreadEntry) -> HalResult<ThreadHandle>;

    /// Wait up to `timeout_ms` for a thread to finish.
    ///
    /// Returns `true` once the thread has exited and its handle is released.
    /// On timeout the handle stays valid and `false` is returned.
    fn join_thread(&self, handle: ThreadHandle, timeout_ms: u64) -> bool;

    /// Forcibly stop a thread that did not exit within its grace period
    fn terminate_thread(&self, handle: ThreadHandle);

    /// Sleep the calling thread
    fn sleep_ms(&self, ms: u64);

    /// Record up to `out.len()` return addresses of the calling context.
    ///
    /// Returns the number of entries written.
    fn capture_stack(&self, out: &mut [u64]) -> usize;

    /// Identifier of the calling thread
    fn current_thread_id(&self) -> u32;

    /// Identifier of the CPU the caller is running on
    fn current_cpu_id(&self) -> u32;

    /// Reserve `bytes` of zeroed table memory from the platform budget
    fn reserve_memory(&self, bytes: usize) -> HalResult<()>;

    /// Return a reservation made with [`Platform::reserve_memory`]
    fn release_memory(&self, bytes: usize);

    /// Memory currently in use by the system, in bytes
    fn memory_usage_bytes(&self) -> u64;

    /// CPU utilisation, 0-100
    fn cpu_usage_percent(&self) -> u32;

    /// Number of devices currently bound to drivers
    fn active_device_count(&self) -> u32;
}
