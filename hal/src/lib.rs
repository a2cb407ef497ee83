//! # Helix Platform Abstraction Layer
//!
//! The narrow set of platform services the driver telemetry core is allowed
//! to depend on. Everything above this crate is portable: a kernel port
//! implements [`Platform`] on top of its own timers, scheduler and allocator,
//! while host builds use [`HostPlatform`] and tests use [`MockPlatform`].
//!
//! ## Services
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Platform trait                          │
//! ├──────────────┬──────────────┬───────────────┬────────────────┤
//! │  Time        │  Threads     │  Memory       │  Samplers      │
//! │  now_ns      │  spawn       │  reserve      │  memory bytes  │
//! │  wall_time   │  join        │  release      │  cpu percent   │
//! │  sleep_ms    │  terminate   │               │  device count  │
//! ├──────────────┴──────────────┴───────────────┴────────────────┤
//! │  Identity: thread id, cpu id     Debug: stack capture          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The mutex primitive lives in [`sync`]; it is a spinning lock so it can be
//! taken from interrupt-adjacent contexts that must not sleep.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod platform;
pub mod sync;
pub mod time;

#[cfg(feature = "std")]
pub mod host;
#[cfg(feature = "std")]
pub mod mock;
#[cfg(feature = "std")]
mod threads;

pub use error::{HalError, HalResult};
#[cfg(feature = "std")]
pub use host::HostPlatform;
#[cfg(feature = "std")]
pub use mock::MockPlatform;
pub use platform::{Platform, ThreadEntry, ThreadHandle, MAX_STACK_DEPTH};
pub use time::{WallTime, NS_PER_MS, NS_PER_SEC, NS_PER_US};
