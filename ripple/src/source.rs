//! The transport capability consumed by the poller.
//!
//! The poller knows nothing about framing, addressing or pub/sub semantics.
//! It only needs a pollable handle and a way to pull one message off it
//! without blocking. Anything that can provide that is a [`Source`].

use crate::reactor::poller::RawHandle;
use crate::reactor::poller::common::Interest;

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;

/// Largest datagram the built-in sources receive in one call.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// A pollable, message-oriented handle.
///
/// The poller calls [`recv`](Source::recv) once per readiness report, on the
/// worker thread. Implementations must not block: the handle should be in
/// non-blocking mode so a spurious readiness report costs a `WouldBlock`
/// rather than stalling every other registration.
pub trait Source: Send + 'static {
    /// The handle passed to the wait primitive.
    fn raw_handle(&self) -> RawHandle;

    /// Readiness the poller should wait for.
    ///
    /// Read again before every wait. A socket is writable almost all the
    /// time, so ask for write readiness only while output is queued for
    /// [`flush`](Source::flush); otherwise every wait returns at once. Output
    /// queued from another thread is picked up after the next wait, or
    /// sooner with [`PollerHandle::wake`](crate::PollerHandle::wake).
    fn interest(&self) -> Interest {
        Interest::READABLE
    }

    /// Receives one message.
    ///
    /// Returns `Ok(None)` when nothing is available.
    fn recv(&self) -> io::Result<Option<Vec<u8>>>;

    /// Sends one message without blocking.
    fn send(&self, _data: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::Unsupported.into())
    }

    /// Writes queued output. Called on write readiness while
    /// [`interest`](Source::interest) includes writes.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Source + Sync> Source for Arc<S> {
    fn raw_handle(&self) -> RawHandle {
        (**self).raw_handle()
    }

    fn interest(&self) -> Interest {
        (**self).interest()
    }

    fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        (**self).recv()
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        (**self).send(data)
    }

    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Maps a receive result onto the `Option` convention of [`Source::recv`].
fn datagram(result: io::Result<usize>, mut buffer: Vec<u8>) -> io::Result<Option<Vec<u8>>> {
    match result {
        Ok(n) => {
            buffer.truncate(n);
            Ok(Some(buffer))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e),
    }
}

impl Source for UdpSocket {
    fn raw_handle(&self) -> RawHandle {
        #[cfg(unix)]
        {
            std::os::fd::AsRawFd::as_raw_fd(self)
        }
        #[cfg(windows)]
        {
            std::os::windows::io::AsRawSocket::as_raw_socket(self)
        }
    }

    fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let result = UdpSocket::recv(self, &mut buffer);
        datagram(result, buffer)
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, data)
    }
}

#[cfg(unix)]
impl Source for std::os::unix::net::UnixDatagram {
    fn raw_handle(&self) -> RawHandle {
        std::os::fd::AsRawFd::as_raw_fd(self)
    }

    fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let result = std::os::unix::net::UnixDatagram::recv(self, &mut buffer);
        datagram(result, buffer)
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        std::os::unix::net::UnixDatagram::send(self, data)
    }
}
