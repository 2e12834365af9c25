//! Unix backend: `poll(2)` over the snapshot array.
//!
//! The wake channel is an `eventfd` on Linux and a non-blocking
//! `UnixDatagram` pair on the other unix targets.

use super::common::{Interest, Readiness, timeout_millis};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, poll, pollfd};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Raw pollable handle on unix: a file descriptor.
pub type RawHandle = RawFd;

/// One entry of the array handed to `poll(2)`.
pub(crate) type PollFd = pollfd;

/// Builds the `pollfd` entry for a handle and its interest.
pub(crate) fn poll_entry(handle: RawHandle, interest: Interest) -> PollFd {
    let mut events = 0;

    if interest.read {
        events |= POLLIN;
    }
    if interest.write {
        events |= POLLOUT;
    }

    pollfd {
        fd: handle,
        events,
        revents: 0,
    }
}

/// Decodes the `revents` of an entry after a wait.
pub(crate) fn readiness(entry: &PollFd) -> Readiness {
    let revents = entry.revents;

    Readiness {
        readable: revents & POLLIN != 0,
        writable: revents & POLLOUT != 0,
        hangup: revents & POLLHUP != 0,
        errored: revents & (POLLERR | POLLNVAL) != 0,
    }
}

/// Blocks until an entry is ready or `timeout` elapses.
///
/// Returns the number of entries with non-zero `revents`. An interrupted
/// wait (`EINTR`) is reported as zero ready entries.
pub(crate) fn sys_poll(entries: &mut [PollFd], timeout: Duration) -> io::Result<usize> {
    for entry in entries.iter_mut() {
        entry.revents = 0;
    }

    let rc = unsafe {
        poll(
            entries.as_mut_ptr(),
            entries.len() as nfds_t,
            timeout_millis(timeout),
        )
    };

    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }

    Ok(rc as usize)
}

#[cfg(target_os = "linux")]
pub(crate) use self::eventfd::WakeChannel;

#[cfg(not(target_os = "linux"))]
pub(crate) use self::pair::WakeChannel;

#[cfg(target_os = "linux")]
mod eventfd {
    use super::RawHandle;
    use crate::error::Error;

    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    /// Wake channel backed by a single non-blocking `eventfd`.
    ///
    /// Writers bump the counter, the worker reads it back to zero.
    pub(crate) struct WakeChannel {
        fd: OwnedFd,
    }

    impl WakeChannel {
        pub(crate) fn new() -> Result<Self, Error> {
            let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
            if fd < 0 {
                return Err(Error::TransportBind(io::Error::last_os_error()));
            }

            Ok(Self {
                fd: unsafe { OwnedFd::from_raw_fd(fd) },
            })
        }

        /// Interrupts the worker's wait.
        ///
        /// A saturated counter (`EAGAIN`) means a wake is already pending.
        pub(crate) fn signal(&self) -> Result<(), Error> {
            let buf: u64 = 1;
            let n = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    &buf as *const u64 as *const _,
                    size_of::<u64>(),
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(());
                }
                return Err(Error::WakeSend(err));
            }

            Ok(())
        }

        /// Resets the counter so the next wait blocks again.
        pub(crate) fn drain(&self) {
            let mut buf: u64 = 0;
            loop {
                let n = unsafe {
                    libc::read(
                        self.fd.as_raw_fd(),
                        &mut buf as *mut u64 as *mut _,
                        size_of::<u64>(),
                    )
                };
                if n <= 0 {
                    break;
                }
            }
        }

        pub(crate) fn raw_handle(&self) -> RawHandle {
            self.fd.as_raw_fd()
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod pair {
    use super::RawHandle;
    use crate::error::Error;

    use std::io;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixDatagram;

    /// Wake channel backed by a connected non-blocking datagram pair.
    pub(crate) struct WakeChannel {
        receiver: UnixDatagram,
        sender: UnixDatagram,
    }

    impl WakeChannel {
        pub(crate) fn new() -> Result<Self, Error> {
            let (sender, receiver) = UnixDatagram::pair().map_err(Error::TransportBind)?;
            sender.set_nonblocking(true).map_err(Error::TransportBind)?;
            receiver.set_nonblocking(true).map_err(Error::TransportBind)?;

            Ok(Self { receiver, sender })
        }

        /// Interrupts the worker's wait.
        ///
        /// A full socket buffer means wakes are already pending.
        pub(crate) fn signal(&self) -> Result<(), Error> {
            match self.sender.send(&[1]) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(Error::WakeSend(e)),
            }
        }

        /// Discards every pending wake datagram.
        pub(crate) fn drain(&self) {
            let mut buf = [0u8; 64];
            while self.receiver.recv(&mut buf).is_ok() {}
        }

        pub(crate) fn raw_handle(&self) -> RawHandle {
            self.receiver.as_raw_fd()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_makes_wait_return_early() {
        let wake = WakeChannel::new().unwrap();
        let mut entries = [poll_entry(wake.raw_handle(), Interest::READABLE)];

        wake.signal().unwrap();
        wake.signal().unwrap();

        let ready = sys_poll(&mut entries, Duration::from_secs(5)).unwrap();
        assert_eq!(ready, 1);
        assert!(readiness(&entries[0]).readable);

        wake.drain();

        let ready = sys_poll(&mut entries, Duration::from_millis(10)).unwrap();
        assert_eq!(ready, 0);
        assert!(readiness(&entries[0]).is_empty());
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        let wake = WakeChannel::new().unwrap();
        let mut entries = [poll_entry(wake.raw_handle(), Interest::READABLE)];

        let start = std::time::Instant::now();
        let ready = sys_poll(&mut entries, Duration::from_millis(30)).unwrap();

        assert_eq!(ready, 0);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
