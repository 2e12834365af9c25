#![allow(dead_code)]

use ripple::{Poller, Registration};

use std::net::UdpSocket;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Generous upper bound for anything that should happen "immediately".
pub const PROMPT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Returns a connected `(sender, receiver)` loopback pair.
///
/// The receiver is non-blocking, ready to be registered.
pub fn udp_pair() -> (UdpSocket, UdpSocket) {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind receiver");
    let sender = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind sender");

    sender
        .connect(receiver.local_addr().unwrap())
        .expect("Failed to connect sender");
    receiver
        .connect(sender.local_addr().unwrap())
        .expect("Failed to connect receiver");
    receiver
        .set_nonblocking(true)
        .expect("Failed to set non-blocking");

    (sender, receiver)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }

    condition()
}

/// A registration whose callback parks the worker until released.
///
/// Holding the gate guarantees the worker is between two waits, so
/// everything made ready while it is held is reported by the same wait.
pub struct Gate {
    trigger: UdpSocket,
    entered: Receiver<()>,
    release: Sender<()>,
    pub registration: Registration,
}

impl Gate {
    pub fn new(poller: &Poller) -> Self {
        let (trigger, receiver) = udp_pair();
        let (entered_tx, entered) = channel();
        let (release, release_rx) = channel::<()>();

        let registration = poller
            .register(
                receiver,
                move |_| {
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                    Ok(())
                },
                |_| {},
            )
            .expect("Failed to register gate");

        Self {
            trigger,
            entered,
            release,
            registration,
        }
    }

    /// Blocks until the worker is parked inside the gate callback.
    pub fn hold(&self) {
        self.trigger.send(b"gate").expect("Failed to trigger gate");
        self.entered
            .recv_timeout(PROMPT)
            .expect("Worker never entered the gate");
    }

    pub fn release(&self) {
        self.release.send(()).expect("Gate callback is gone");
    }
}
