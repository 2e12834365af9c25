//! Subscribes to a loopback UDP socket and prints what arrives.
//!
//! Run with `RUST_LOG=ripple=debug cargo run --example subscribe` to see
//! the poller's lifecycle.

use ripple::PollerBuilder;

use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let poller = PollerBuilder::new()
        .wait_timeout(Duration::from_secs(10))
        .build()?;

    let pull = UdpSocket::bind("127.0.0.1:0")?;
    pull.set_nonblocking(true)?;
    let address = pull.local_addr()?;

    let mut subscription = poller.subscribe(pull)?;

    let push = thread::spawn(move || -> std::io::Result<()> {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        socket.connect(address)?;

        for word in ["Hello", "World", "Fresh"] {
            socket.send(word.as_bytes())?;
            thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    });

    while let Some(message) = subscription.next_timeout(Duration::from_millis(500)) {
        match message {
            Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            Err(e) => {
                eprintln!("subscription failed: {e}");
                break;
            }
        }
    }

    push.join().expect("push thread panicked")?;

    subscription.cancel();
    poller.shutdown();

    Ok(())
}
