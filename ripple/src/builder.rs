use crate::error::Error;
use crate::reactor::Poller;

use std::time::Duration;

/// Default bound on a single wait.
///
/// The wait only times out when no wake signal arrives, so this is a
/// liveness fallback for a lost wake rather than a polling interval.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default name of the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "ripple-poller";

/// Builder for configuring and starting a [`Poller`].
///
/// # Examples
///
/// ```rust,no_run
/// use ripple::PollerBuilder;
/// use std::time::Duration;
///
/// let poller = PollerBuilder::new()
///     .wait_timeout(Duration::from_secs(2))
///     .thread_name("telemetry-poller")
///     .build()
///     .expect("failed to start poller");
/// ```
#[derive(Clone, Debug)]
pub struct PollerBuilder {
    /// Upper bound of one blocking wait.
    wait_timeout: Duration,

    /// Name given to the worker thread.
    thread_name: String,
}

impl PollerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Sets the upper bound of one blocking wait.
    ///
    /// Shorter bounds recover faster from a lost wake signal at the cost of
    /// idle wake-ups.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Sets the name of the worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Creates the wake channel and starts the worker thread.
    ///
    /// Fails with [`Error::TransportBind`] if the wake channel cannot be
    /// created and with [`Error::Spawn`] if the thread cannot be started.
    pub fn build(self) -> Result<Poller, Error> {
        Poller::start(self.wait_timeout, self.thread_name)
    }
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
