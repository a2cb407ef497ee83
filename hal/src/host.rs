//! # Host Platform
//!
//! [`Platform`] implementation for hosted builds: std threads, `Instant` as
//! the monotonic clock and, on Linux, procfs/sysfs for the system samplers.
//! Samplers degrade to zero where the host exposes nothing.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::fs;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use spin::Mutex;

use crate::error::{HalError, HalResult};
use crate::platform::{Platform, ThreadEntry, ThreadHandle};
use crate::threads::{self, ThreadTable};
use crate::time::WallTime;

/// Clock ticks per second assumed for `/proc/self/stat` accounting
const USER_HZ: u64 = 100;

/// Page size assumed for `/proc/self/statm`
const PAGE_SIZE: u64 = 4096;

/// Bus directories whose entries count as active devices
const DEVICE_BUSES: [&str; 2] = ["/sys/bus/pci/devices", "/sys/bus/usb/devices"];

/// Last CPU accounting sample
#[derive(Debug, Clone, Copy)]
struct CpuSample {
    ticks: u64,
    at: Instant,
}

/// Hosted platform backed by the standard library
pub struct HostPlatform {
    origin: Instant,
    threads: ThreadTable,
    reserved: AtomicUsize,
    budget: usize,
    last_cpu: Mutex<Option<CpuSample>>,
}

impl HostPlatform {
    /// Create a host platform with an unlimited memory budget
    pub fn new() -> Self {
        Self::with_memory_budget(usize::MAX)
    }

    /// Create a host platform that refuses reservations beyond `budget` bytes
    pub fn with_memory_budget(budget: usize) -> Self {
        Self {
            origin: Instant::now(),
            threads: ThreadTable::new(),
            reserved: AtomicUsize::new(0),
            budget,
            last_cpu: Mutex::new(None),
        }
    }

    /// Bytes currently reserved
    pub fn reserved_bytes(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    fn process_cpu_ticks() -> Option<u64> {
        let stat = fs::read_to_string("/proc/self/stat").ok()?;
        // The command name may contain spaces; fields resume after ')'.
        let rest = stat.rsplit_once(')')?.1;
        let mut fields = rest.split_whitespace();
        // After ')': state is field 3, utime is 14, stime is 15.
        let utime: u64 = fields.nth(11)?.parse().ok()?;
        let stime: u64 = fields.next()?.parse().ok()?;
        Some(utime + stime)
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for HostPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostPlatform")
            .field("reserved", &self.reserved_bytes())
            .field("budget", &self.budget)
            .finish()
    }
}

impl Platform for HostPlatform {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn wall_time(&self) -> WallTime {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        WallTime {
            secs: since.as_secs(),
            nanos: since.subsec_nanos(),
        }
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

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    fn capture_stack(&self, _out: &mut [u64]) -> usize {
        // Hosted builds do not walk frames; events carry an empty trace.
        0
    }

    fn current_thread_id(&self) -> u32 {
        threads::current_thread_id()
    }

    fn current_cpu_id(&self) -> u32 {
        0
    }

    fn reserve_memory(&self, bytes: usize) -> HalResult<()> {
        let result = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= self.budget)
            });
        match result {
            Ok(_) => Ok(()),
            Err(_) => Err(HalError::OutOfMemory { requested: bytes }),
        }
    }

    fn release_memory(&self, bytes: usize) {
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    fn memory_usage_bytes(&self) -> u64 {
        fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|statm| {
                statm
                    .split_whitespace()
                    .nth(1)
                    .and_then(|pages| pages.parse::<u64>().ok())
            })
            .map(|pages| pages * PAGE_SIZE)
            .unwrap_or(0)
    }

    fn cpu_usage_percent(&self) -> u32 {
        let Some(ticks) = Self::process_cpu_ticks() else {
            return 0;
        };
        let now = Instant::now();
        let mut last = self.last_cpu.lock();
        let previous = last.replace(CpuSample { ticks, at: now });
        let Some(previous) = previous else {
            return 0;
        };

        let elapsed_ms = now.duration_since(previous.at).as_millis() as u64;
        if elapsed_ms == 0 {
            return 0;
        }
        let busy_ms = ticks.saturating_sub(previous.ticks) * 1000 / USER_HZ;
        (busy_ms * 100 / elapsed_ms).min(100) as u32
    }

    fn active_device_count(&self) -> u32 {
        DEVICE_BUSES
            .iter()
            .filter_map(|bus| fs::read_dir(bus).ok())
            .map(|entries| entries.count() as u32)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let platform = HostPlatform::new();
        let a = platform.now_ns();
        let b = platform.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_memory_budget() {
        let platform = HostPlatform::with_memory_budget(1024);
        assert!(platform.reserve_memory(1000).is_ok());
        assert_eq!(
            platform.reserve_memory(100),
            Err(HalError::OutOfMemory { requested: 100 })
        );
        platform.release_memory(1000);
        assert!(platform.reserve_memory(1024).is_ok());
        assert_eq!(platform.reserved_bytes(), 1024);
    }

    #[test]
    fn test_cpu_percent_bounded() {
        let platform = HostPlatform::new();
        let _ = platform.cpu_usage_percent();
        assert!(platform.cpu_usage_percent() <= 100);
    }
}
