//! # Ripple
//!
//! **Ripple** is a small readiness poller for the **Nebula** ecosystem.
//!
//! A single background thread blocks on every registered source at once and
//! runs the callback of whichever becomes ready. Any other thread may add or
//! remove sources at any time without blocking and without racing that
//! wait: changes go through a queue and an internal wake channel interrupts
//! the wait so they are picked up immediately.
//!
//! - Registration and unregistration never block
//! - Callbacks run on the poller thread, one at a time
//! - A failing source reports once through its error callback and goes
//!   quiet; its siblings are unaffected
//! - Shutdown joins the poller thread; no callback runs after it returns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ripple::Poller;
//! use std::net::UdpSocket;
//! use std::time::Duration;
//!
//! let poller = Poller::new(Duration::from_secs(10)).unwrap();
//!
//! let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
//! socket.set_nonblocking(true).unwrap();
//!
//! let registration = poller
//!     .register(
//!         socket,
//!         |data| {
//!             println!("received {} bytes", data.len());
//!             Ok(())
//!         },
//!         |error| eprintln!("source failed: {error}"),
//!     )
//!     .unwrap();
//!
//! // ...
//!
//! poller.unregister(&registration);
//! poller.shutdown();
//! ```
//!
//! ## Modules
//!
//! - [`source`] — The transport capability the poller consumes
//! - [`subscription`] — Iterator view over one source
//! - [`feed`] — One source shared by many subscribers
//!
//! Ripple logs through [`tracing`] and installs no subscriber of its own.

mod builder;
mod error;
mod reactor;

pub mod feed;
pub mod source;
pub mod subscription;

pub use builder::{DEFAULT_THREAD_NAME, DEFAULT_WAIT_TIMEOUT, PollerBuilder};
pub use error::{BoxError, Error, ReadinessError};
pub use feed::{Feed, FeedMessage, FeedSubscription};
pub use reactor::poller::RawHandle;
pub use reactor::poller::common::Interest;
pub use reactor::{
    OnError, OnReadable, Poller, PollerHandle, Registration, RegistrationId, RegistrationState,
};
pub use source::Source;
pub use subscription::Subscription;
