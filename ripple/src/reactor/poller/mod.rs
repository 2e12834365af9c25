//! Platform-specific wait primitive and wake channel.
//!
//! The reactor waits with a readiness call that takes a flat array of
//! descriptors (`poll(2)` on unix, `WSAPoll` on Windows). The array is the
//! snapshot maintained by the poll set, so registration changes never touch
//! kernel state; they only invalidate the snapshot.
//!
//! The wake channel is a descriptor living permanently at index 0 of that
//! array. Writing to it from any thread makes the wait return early.
//!
//! The concrete implementation is selected at compile time.

pub(crate) mod common;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;

pub(crate) use platform::{PollFd, WakeChannel, poll_entry, readiness, sys_poll};

pub use platform::RawHandle;
