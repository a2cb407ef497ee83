//! std-backed thread table shared by the host and mock platforms.

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::string::ToString;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use spin::Mutex;

use crate::error::{HalError, HalResult};
use crate::platform::{ThreadEntry, ThreadHandle};

/// Poll step while waiting for a thread to exit
const JOIN_POLL: Duration = Duration::from_millis(1);

pub(crate) struct ThreadTable {
    next: AtomicU64,
    live: Mutex<BTreeMap<u64, JoinHandle<()>>>,
}

impl ThreadTable {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn spawn(&self, name: &'static str, entry: ThreadEntry) -> HalResult<ThreadHandle> {
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(entry)
            .map_err(|_| HalError::ThreadSpawnFailed)?;

        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(id, join);
        log::debug!("hal: spawned thread '{}' as handle {}", name, id);
        Ok(ThreadHandle(id))
    }

    pub(crate) fn join(&self, handle: ThreadHandle, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let finished = match self.live.lock().get(&handle.0) {
                Some(join) => join.is_finished(),
                // Already joined or terminated.
                None => return true,
            };

            if finished {
                if let Some(join) = self.live.lock().remove(&handle.0) {
                    if join.join().is_err() {
                        log::error!("hal: thread handle {} panicked", handle.0);
                    }
                }
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
    }

    /// std threads cannot be killed; the thread is detached and left to
    /// observe its own stop flag.
    pub(crate) fn detach(&self, handle: ThreadHandle) {
        if self.live.lock().remove(&handle.0).is_some() {
            log::warn!(
                "hal: thread handle {} cannot be stopped on this platform, detaching",
                handle.0
            );
        }
    }
}

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

std::thread_local! {
    static THREAD_ID: u32 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small dense id for the calling std thread
pub(crate) fn current_thread_id() -> u32 {
    THREAD_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicBool;

    #[test]
    fn test_spawn_and_join() {
        let table = ThreadTable::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = table
            .spawn("hal-test", Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        assert!(table.join(handle, 5_000));
        assert!(ran.load(Ordering::SeqCst));
        // Second join on a released handle is a no-op.
        assert!(table.join(handle, 0));
    }

    #[test]
    fn test_join_timeout_then_detach() {
        let table = ThreadTable::new();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = table
            .spawn(
                "hal-spin",
                Box::new(move || {
                    while !flag.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(1));
                    }
                }),
            )
            .unwrap();

        assert!(!table.join(handle, 5));
        table.detach(handle);
        stop.store(true, Ordering::SeqCst);
        assert!(table.join(handle, 0));
    }

    #[test]
    fn test_thread_ids_are_distinct() {
        let here = current_thread_id();
        let there = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, current_thread_id());
    }
}
