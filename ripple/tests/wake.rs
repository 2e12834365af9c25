mod common;

use common::{PROMPT, init_tracing, udp_pair, wait_until};
use ripple::{Poller, RegistrationState};

use std::sync::mpsc::channel;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_registration_from_other_thread_interrupts_wait() {
    init_tracing();
    let poller = Poller::new(Duration::from_secs(10)).unwrap();

    let (_a_sender, a_receiver) = udp_pair();
    poller.register(a_receiver, |_| Ok(()), |_| {}).unwrap();
    assert!(wait_until(PROMPT, || poller.active_registrations() == 1));

    // Let the worker settle into a long wait.
    thread::sleep(Duration::from_millis(20));

    let (b_sender, b_receiver) = udp_pair();
    let (tx, rx) = channel();
    let handle = poller.handle();

    let registered = Instant::now();
    let registration = thread::spawn(move || {
        handle
            .register(
                b_receiver,
                move |data| {
                    let _ = tx.send((data, Instant::now()));
                    Ok(())
                },
                |_| {},
            )
            .unwrap()
    })
    .join()
    .expect("Registering thread panicked");

    assert!(wait_until(PROMPT, || registration.state()
        == RegistrationState::Active));
    assert!(registered.elapsed() < Duration::from_millis(50));

    let sent = Instant::now();
    b_sender.send(b"hello").unwrap();

    let (data, fired) = rx.recv_timeout(PROMPT).unwrap();
    assert_eq!(data, b"hello");
    assert!(
        fired.duration_since(sent) < Duration::from_millis(50),
        "callback fired after {:?}",
        fired.duration_since(sent)
    );
}

#[test]
fn test_unregister_interrupts_wait() {
    init_tracing();
    let poller = Poller::new(Duration::from_secs(10)).unwrap();
    let (_sender, receiver) = udp_pair();

    let registration = poller.register(receiver, |_| Ok(()), |_| {}).unwrap();
    assert!(wait_until(PROMPT, || registration.state()
        == RegistrationState::Active));
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    poller.unregister(&registration);

    assert!(wait_until(PROMPT, || registration.state()
        == RegistrationState::Removed));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_worker_wakes_on_timeout() {
    init_tracing();
    let poller = Poller::new(Duration::from_millis(20)).unwrap();

    let (_sender, receiver) = udp_pair();
    poller.register(receiver, |_| Ok(()), |_| {}).unwrap();
    assert!(wait_until(PROMPT, || poller.active_registrations() == 1));

    let before = poller.cycles();
    thread::sleep(Duration::from_millis(300));
    let after = poller.cycles();

    assert!(after - before >= 3, "only {} passes", after - before);
}

#[test]
fn test_shutdown_interrupts_wait() {
    init_tracing();
    let poller = Poller::new(Duration::from_secs(10)).unwrap();
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    poller.shutdown();

    assert!(poller.is_stopped());
    assert!(start.elapsed() < Duration::from_secs(5));
}
