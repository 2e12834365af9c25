//! Windows backend: `WSAPoll` over the snapshot array.
//!
//! Like the unix backend this is readiness-based. `WSAPoll` only accepts
//! sockets, so the wake channel is a connected loopback UDP pair and every
//! registered source must be a socket.

use super::common::{Interest, Readiness, timeout_millis};
use crate::error::Error;

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::os::windows::io::{AsRawSocket, RawSocket};
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock::{
    POLLERR, POLLHUP, POLLNVAL, POLLOUT, POLLRDNORM, SOCKET, SOCKET_ERROR, WSAPOLLFD, WSAPoll,
};

/// Raw pollable handle on Windows: a WinSock socket.
pub type RawHandle = RawSocket;

/// One entry of the array handed to `WSAPoll`.
pub(crate) type PollFd = WSAPOLLFD;

/// Builds the `WSAPOLLFD` entry for a socket and its interest.
///
/// `WSAPoll` rejects `POLLPRI`, so readability is requested as
/// `POLLRDNORM` only.
pub(crate) fn poll_entry(handle: RawHandle, interest: Interest) -> PollFd {
    let mut events = 0;

    if interest.read {
        events |= POLLRDNORM;
    }
    if interest.write {
        events |= POLLOUT;
    }

    WSAPOLLFD {
        fd: handle as SOCKET,
        events,
        revents: 0,
    }
}

/// Decodes the `revents` of an entry after a wait.
pub(crate) fn readiness(entry: &PollFd) -> Readiness {
    let revents = entry.revents as i32;

    Readiness {
        readable: revents & POLLRDNORM as i32 != 0,
        writable: revents & POLLOUT as i32 != 0,
        hangup: revents & POLLHUP as i32 != 0,
        errored: revents & (POLLERR | POLLNVAL) as i32 != 0,
    }
}

/// Blocks until an entry is ready or `timeout` elapses.
pub(crate) fn sys_poll(entries: &mut [PollFd], timeout: Duration) -> io::Result<usize> {
    for entry in entries.iter_mut() {
        entry.revents = 0;
    }

    let rc = unsafe {
        WSAPoll(
            entries.as_mut_ptr(),
            entries.len() as u32,
            timeout_millis(timeout),
        )
    };

    if rc == SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }

    Ok(rc as usize)
}

/// Wake channel backed by a connected non-blocking loopback UDP pair.
pub(crate) struct WakeChannel {
    receiver: UdpSocket,
    sender: UdpSocket,
}

impl WakeChannel {
    pub(crate) fn new() -> Result<Self, Error> {
        let (sender, receiver) = bind_pair().map_err(Error::TransportBind)?;
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
        self.receiver.as_raw_socket()
    }
}

fn bind_pair() -> io::Result<(UdpSocket, UdpSocket)> {
    let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;

    sender.connect(receiver.local_addr()?)?;
    receiver.connect(sender.local_addr()?)?;

    sender.set_nonblocking(true)?;
    receiver.set_nonblocking(true)?;

    Ok((sender, receiver))
}
