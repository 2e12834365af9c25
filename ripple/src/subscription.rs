//! Pull-style access to a registration's messages.
//!
//! A [`Subscription`] turns the push callbacks of a registration into an
//! unbounded, lazily consumed sequence of byte buffers. The sequence ends
//! after the first error, or once the registration has been cancelled and
//! the worker has released it.

use crate::error::{BoxError, Error, ReadinessError};
use crate::reactor::{PollerHandle, Registration};
use crate::source::Source;

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::Duration;

/// One item of a subscription.
pub type Message = Result<Vec<u8>, ReadinessError>;

/// Iterator over the messages received on one source.
///
/// Iterating blocks the calling thread until the next message arrives.
/// Dropping the subscription unregisters it.
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
/// for message in poller.subscribe(socket).unwrap() {
///     match message {
///         Ok(bytes) => println!("{} bytes", bytes.len()),
///         Err(e) => eprintln!("subscription failed: {e}"),
///     }
/// }
/// ```
pub struct Subscription {
    handle: PollerHandle,
    registration: Registration,
    messages: Receiver<Message>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(handle: PollerHandle, source: Box<dyn Source>) -> Result<Self, Error> {
        let (sender, messages) = channel();
        let errors = sender.clone();

        let registration = handle.register_boxed(
            source,
            Box::new(move |data: Vec<u8>| -> Result<(), BoxError> {
                let _ = sender.send(Ok(data));
                Ok(())
            }),
            Box::new(move |error: ReadinessError| {
                let _ = errors.send(Err(error));
            }),
        )?;

        Ok(Self {
            handle,
            registration,
            messages,
            finished: false,
        })
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Returns the next message if one is already buffered.
    pub fn try_next(&mut self) -> Option<Message> {
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
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Message> {
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

    /// Stops the subscription.
    ///
    /// Messages received before the worker released the registration are
    /// still yielded, then the iterator ends.
    pub fn cancel(&self) {
        self.handle.unregister(&self.registration);
    }

    /// Whether the sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn observe(&mut self, message: Message) -> Message {
        if message.is_err() {
            self.finished = true;
        }
        message
    }
}

impl Iterator for Subscription {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
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

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.unregister(&self.registration);
    }
}
