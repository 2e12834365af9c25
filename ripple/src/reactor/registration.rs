//! Registrations and the descriptor records behind them.
//!
//! A [`Registration`] is what the caller holds. The [`Descriptor`] is what
//! the worker owns. Both share one atomic state cell, which is the only
//! piece of a registration that is ever touched from two threads.

use crate::error::{BoxError, ReadinessError};
use crate::source::Source;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Callback invoked on the worker thread with each received message.
pub type OnReadable = Box<dyn FnMut(Vec<u8>) -> Result<(), BoxError> + Send + 'static>;

/// Callback invoked on the worker thread when a registration fails.
pub type OnError = Box<dyn FnMut(ReadinessError) + Send + 'static>;

/// Identifier of a registration.
///
/// Ids come from a per-poller monotonic counter starting at one and are
/// never reused. Zero is never handed out; the poll set rejects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) const WAKE: RegistrationId = RegistrationId(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id generator shared by every handle of one poller.
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> RegistrationId {
        RegistrationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle of a registration.
///
/// Transitions only move forward:
/// `Pending -> Active -> Removing -> Removed`, with `Pending -> Removing`
/// allowed when a registration is cancelled before the worker applied it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RegistrationState {
    /// Queued; the worker has not applied it yet.
    Pending = 0,
    /// In the poll set and receiving events.
    Active = 1,
    /// Unregistered; removal is queued.
    Removing = 2,
    /// Dropped from the poll set. Terminal.
    Removed = 3,
}

impl RegistrationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Active,
            2 => Self::Removing,
            _ => Self::Removed,
        }
    }
}

/// Atomic cell holding a [`RegistrationState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: RegistrationState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> RegistrationState {
        RegistrationState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: RegistrationState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from -> to`, returning whether this call made the transition.
    pub(crate) fn transition(&self, from: RegistrationState, to: RegistrationState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves `Pending | Active -> Removing`.
    ///
    /// Returns `true` for exactly one caller per registration.
    pub(crate) fn begin_removal(&self) -> bool {
        self.transition(RegistrationState::Active, RegistrationState::Removing)
            || self.transition(RegistrationState::Pending, RegistrationState::Removing)
    }
}

/// Handle to one subscription.
///
/// Returned by [`Poller::register`](crate::Poller::register) and consumed by
/// [`Poller::unregister`](crate::Poller::unregister). Cloning the handle
/// does not duplicate the subscription.
#[derive(Clone, Debug)]
pub struct Registration {
    id: RegistrationId,
    state: Arc<StateCell>,
}

impl Registration {
    pub(crate) fn new(id: RegistrationId, state: Arc<StateCell>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Current lifecycle state as last published by the worker.
    pub fn state(&self) -> RegistrationState {
        self.state.load()
    }

    pub(crate) fn cell(&self) -> &StateCell {
        &self.state
    }
}

/// Worker-owned record for one registration.
pub(crate) struct Descriptor {
    pub(crate) source: Box<dyn Source>,
    pub(crate) on_readable: OnReadable,
    pub(crate) on_error: OnError,
    pub(crate) state: Arc<StateCell>,

    /// Set once an error has been routed to `on_error`.
    pub(crate) faulted: bool,
}

impl Descriptor {
    pub(crate) fn new(
        source: Box<dyn Source>,
        on_readable: OnReadable,
        on_error: OnError,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            source,
            on_readable,
            on_error,
            state,
            faulted: false,
        }
    }

    /// Whether the descriptor should take part in the next wait.
    pub(crate) fn is_pollable(&self) -> bool {
        !self.faulted && self.state.load() == RegistrationState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_and_skip_wake() {
        let ids = IdAllocator::new();

        let a = ids.next();
        let b = ids.next();

        assert_ne!(a, RegistrationId::WAKE);
        assert!(b > a);
    }

    #[test]
    fn test_removal_begins_once() {
        let cell = StateCell::new(RegistrationState::Active);

        assert!(cell.begin_removal());
        assert!(!cell.begin_removal());
        assert_eq!(cell.load(), RegistrationState::Removing);
    }

    #[test]
    fn test_pending_can_be_cancelled() {
        let cell = StateCell::new(RegistrationState::Pending);

        assert!(cell.begin_removal());
        assert!(!cell.transition(RegistrationState::Pending, RegistrationState::Active));
        assert_eq!(cell.load(), RegistrationState::Removing);
    }

    #[test]
    fn test_removed_is_terminal() {
        let cell = StateCell::new(RegistrationState::Removed);

        assert!(!cell.begin_removal());
        assert_eq!(cell.load(), RegistrationState::Removed);
    }
}
