//! The reactor: a worker thread multiplexing readiness of many sources.
//!
//! The reactor is made of four parts:
//! - a wake channel letting any thread interrupt the blocking wait,
//! - an action queue carrying registration changes to the worker,
//! - a poll set, owned by the worker, with a cached wait snapshot,
//! - the worker loop tying them together.
//!
//! Only the action queue and the wake channel are touched by more than one
//! thread. Everything else belongs to the worker.

mod action;
mod core;
mod poll_set;
mod registration;

pub(crate) mod poller;

pub use self::core::{Poller, PollerHandle};
pub use registration::{OnError, OnReadable, Registration, RegistrationId, RegistrationState};
