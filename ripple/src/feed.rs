//! One source, many readers.
//!
//! A [`Feed`] shares a single registration between any number of
//! [`FeedSubscription`]s. The source is registered when the first
//! subscriber arrives and unregistered when the last one leaves; a later
//! subscriber registers it again. Every subscriber sees every message
//! received while it is attached.

use crate::error::{BoxError, Error, ReadinessError};
use crate::reactor::{PollerHandle, Registration};
use crate::source::Source;

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One item of a feed. Errors are shared by every subscriber.
pub type FeedMessage = Result<Vec<u8>, Arc<ReadinessError>>;

#[derive(Default)]
struct FeedState {
    /// Generation of the current connection, set from the moment a
    /// registration is requested until it is released.
    live: Option<u64>,
    registration: Option<Registration>,
    subscribers: Vec<(u64, Sender<FeedMessage>)>,
    next_key: u64,
    generations: u64,
}

impl FeedState {
    /// Forgets the connection and drops every subscriber sender, which ends
    /// their iterators.
    fn disconnect(&mut self) -> Option<Registration> {
        self.live = None;
        self.subscribers.clear();
        self.registration.take()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned by the readable callback. When the worker releases the
/// registration, the subscribers of that connection are released with it.
struct Link {
    state: Arc<Mutex<FeedState>>,
    generation: u64,
}

impl Drop for Link {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.live == Some(self.generation) {
            state.disconnect();
        }
    }
}

/// A source shared by reference-counted subscribers.
///
/// # Examples
///
/// ```rust,no_run
/// use ripple::Poller;
/// use std::net::UdpSocket;
/// use std::time::Duration;
///
/// let poller = Poller::new(Duration::from_secs(10)).unwrap();
///
/// let socket = UdpSocket::bind("127.0.0.1:9000").unwrap();
/// socket.set_nonblocking(true).unwrap();
///
/// let feed = poller.feed(socket);
/// let logger = feed.subscribe().unwrap();
/// let counter = feed.subscribe().unwrap();
/// ```
pub struct Feed<S> {
    handle: PollerHandle,
    source: Arc<S>,
    state: Arc<Mutex<FeedState>>,
    connecting: Mutex<()>,
}

impl<S: Source + Sync> Feed<S> {
    pub(crate) fn new(handle: PollerHandle, source: S) -> Self {
        Self {
            handle,
            source: Arc::new(source),
            state: Arc::new(Mutex::new(FeedState::default())),
            connecting: Mutex::new(()),
        }
    }

    /// Attaches a new subscriber, registering the source if it is the
    /// first one.
    pub fn subscribe(&self) -> Result<FeedSubscription, Error> {
        let _connecting = lock(&self.connecting);

        let (sender, messages) = channel();
        let (key, generation) = {
            let mut state = lock(&self.state);

            let key = state.next_key;
            state.next_key += 1;
            state.subscribers.push((key, sender));

            let generation = match state.live {
                Some(_) => None,
                None => {
                    state.generations += 1;
                    state.live = Some(state.generations);
                    state.live
                }
            };
            (key, generation)
        };

        let subscription = FeedSubscription {
            handle: self.handle.clone(),
            state: self.state.clone(),
            key,
            messages,
            finished: false,
        };

        // The state lock is released here: a failed registration drops the
        // callbacks on this thread, and dropping them takes the lock.
        if let Some(generation) = generation {
            let registration = self.connect(generation)?;
            let mut state = lock(&self.state);

            if state.live == Some(generation) {
                tracing::debug!(id = %registration.id(), "feed connected");
                state.registration = Some(registration);
            } else {
                // Failed or released before it could be recorded.
                self.handle.unregister(&registration);
            }
        }

        Ok(subscription)
    }

    /// Number of attached subscribers.
    pub fn subscribers(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// The registration currently backing the feed, if any subscriber is
    /// attached.
    pub fn registration(&self) -> Option<Registration> {
        lock(&self.state).registration.clone()
    }

    fn connect(&self, generation: u64) -> Result<Registration, Error> {
        let link = Link {
            state: self.state.clone(),
            generation,
        };
        let errors = self.state.clone();
        let handle = self.handle.clone();

        self.handle.register_boxed(
            Box::new(self.source.clone()),
            Box::new(move |data: Vec<u8>| -> Result<(), BoxError> {
                let state = lock(&link.state);
                for (_, subscriber) in &state.subscribers {
                    let _ = subscriber.send(Ok(data.clone()));
                }
                Ok(())
            }),
            Box::new(move |error: ReadinessError| {
                let error = Arc::new(error);
                let mut state = lock(&errors);
                if state.live != Some(generation) {
                    return;
                }

                for (_, subscriber) in &state.subscribers {
                    let _ = subscriber.send(Err(error.clone()));
                }
                if let Some(registration) = state.disconnect() {
                    handle.unregister(&registration);
                }
            }),
        )
    }
}

/// One reader of a [`Feed`].
///
/// Iterating blocks until the next message. The sequence ends after the
/// first error or when the poller releases the registration. Dropping the
/// last subscriber unregisters the source.
pub struct FeedSubscription {
    handle: PollerHandle,
    state: Arc<Mutex<FeedState>>,
    key: u64,
    messages: Receiver<FeedMessage>,
    finished: bool,
}

impl FeedSubscription {
    /// Returns the next message if one is already buffered.
    pub fn try_next(&mut self) -> Option<FeedMessage> {
        if self.finished {
            return None;
        }

        match self.messages.try_recv() {
            Ok(message) => Some(self.observe(message)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    /// Waits up to `timeout` for the next message.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<FeedMessage> {
        if self.finished {
            return None;
        }

        match self.messages.recv_timeout(timeout) {
            Ok(message) => Some(self.observe(message)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn observe(&mut self, message: FeedMessage) -> FeedMessage {
        if message.is_err() {
            self.finished = true;
        }
        message
    }
}

impl Iterator for FeedSubscription {
    type Item = FeedMessage;

    fn next(&mut self) -> Option<FeedMessage> {
        if self.finished {
            return None;
        }

        match self.messages.recv() {
            Ok(message) => Some(self.observe(message)),
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.subscribers.retain(|(key, _)| *key != self.key);

        if state.subscribers.is_empty() && state.live.is_some() {
            if let Some(registration) = state.disconnect() {
                tracing::debug!(id = %registration.id(), "feed disconnected");
                self.handle.unregister(&registration);
            }
        }
    }
}
