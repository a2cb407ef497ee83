//! Platform locking primitives.
//!
//! Telemetry producers run in driver context, sometimes next to interrupt
//! handlers, so every lock in the core is a spinning lock with short critical
//! sections. Acquisition is `lock()`, release is dropping the guard.

pub use spin::{Mutex, MutexGuard, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};
