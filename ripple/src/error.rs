//! Error types.
//!
//! [`Error`] is returned to code that drives a [`Poller`](crate::Poller)
//! directly. [`ReadinessError`] is never returned from a call: it is handed
//! to a registration's error callback on the worker thread.

use std::io;

use thiserror::Error;

/// Error type produced by a readiness callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to callers of the poller.
#[derive(Debug, Error)]
pub enum Error {
    /// The wake channel could not be created. Fatal for construction.
    #[error("failed to create wake channel: {0}")]
    TransportBind(#[source] io::Error),

    /// The worker thread could not be spawned.
    #[error("failed to spawn poller thread: {0}")]
    Spawn(#[source] io::Error),

    /// A wake signal could not be written. Logged by the poller, never
    /// escalated: the bounded wait picks the pending work up later.
    #[error("failed to signal poller: {0}")]
    WakeSend(#[source] io::Error),

    /// The poller has been shut down and accepts no more registrations.
    #[error("poller is shut down")]
    Shutdown,
}

/// Failure of a single registration, delivered to its error callback.
///
/// After one of these is delivered the registration stops producing events
/// but stays registered until it is explicitly unregistered.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The readable callback returned an error.
    #[error("readiness callback failed: {0}")]
    Callback(#[source] BoxError),

    /// The readable callback panicked.
    #[error("readiness callback panicked: {0}")]
    CallbackPanic(String),

    /// Receiving from the source failed.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// Flushing the source on write readiness failed.
    #[error("flush failed: {0}")]
    Flush(#[source] io::Error),

    /// The wait primitive reported an error condition on the handle.
    #[error("handle reported an error condition")]
    Descriptor,

    /// The peer hung up and no data is left to read.
    #[error("handle hung up")]
    HangUp,
}
