use super::action::{Action, ActionQueue, ActionSender, action_queue};
use super::poll_set::PollSet;
use super::poller::common::Readiness;
use super::poller::{WakeChannel, sys_poll};
use super::registration::{
    Descriptor, IdAllocator, OnError, OnReadable, Registration, RegistrationId, RegistrationState,
    StateCell,
};
use crate::error::{BoxError, Error, ReadinessError};
use crate::feed::Feed;
use crate::source::Source;
use crate::subscription::Subscription;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Pause after a failed wait so a persistent failure does not spin.
const WAIT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const STOPPED: u8 = 2;

/// State shared between the poller, its handles and the worker.
struct Shared {
    state: AtomicU8,
    ids: IdAllocator,

    /// Completed wait/dispatch passes.
    cycles: AtomicU64,

    /// User registrations currently held by the worker.
    active: AtomicUsize,
}

/// Cloneable access to a running poller.
///
/// A handle can register and unregister from any thread without blocking.
/// It cannot shut the poller down; that is reserved for the owning
/// [`Poller`].
#[derive(Clone)]
pub struct PollerHandle {
    actions: ActionSender,
    wake: Arc<WakeChannel>,
    shared: Arc<Shared>,
}

impl PollerHandle {
    /// Starts watching `source`.
    ///
    /// Returns immediately; the registration becomes active on the worker's
    /// next drain. `on_readable` receives each message, `on_error` receives
    /// at most one [`ReadinessError`], after which the registration stays
    /// silent until it is unregistered.
    pub fn register<S, R, E>(
        &self,
        source: S,
        on_readable: R,
        on_error: E,
    ) -> Result<Registration, Error>
    where
        S: Source,
        R: FnMut(Vec<u8>) -> Result<(), BoxError> + Send + 'static,
        E: FnMut(ReadinessError) + Send + 'static,
    {
        self.register_boxed(Box::new(source), Box::new(on_readable), Box::new(on_error))
    }

    pub(crate) fn register_boxed(
        &self,
        source: Box<dyn Source>,
        on_readable: OnReadable,
        on_error: OnError,
    ) -> Result<Registration, Error> {
        if !self.is_running() {
            return Err(Error::Shutdown);
        }

        let id = self.shared.ids.next();
        let state = Arc::new(StateCell::new(RegistrationState::Pending));
        let descriptor = Descriptor::new(source, on_readable, on_error, state.clone());

        self.actions.enqueue(Action::Add { id, descriptor })?;

        // Shutdown may have started after the check above, in which case
        // teardown may already have drained the queue.
        if !self.is_running() {
            state.store(RegistrationState::Removed);
            return Err(Error::Shutdown);
        }

        self.signal();

        tracing::trace!(%id, "registration queued");

        Ok(Registration::new(id, state))
    }

    /// Stops watching a registration.
    ///
    /// Returns immediately. Calling it again, or on a registration that is
    /// already gone, does nothing. Once this returns no new dispatch starts
    /// for the registration; the source is dropped on the worker's next
    /// drain.
    pub fn unregister(&self, registration: &Registration) {
        if !registration.cell().begin_removal() {
            return;
        }

        let id = registration.id();
        match self.actions.enqueue(Action::Remove { id }) {
            Ok(()) => self.signal(),
            Err(_) => registration.cell().store(RegistrationState::Removed),
        }
    }

    /// Watches `source` and exposes its messages as an iterator.
    pub fn subscribe<S: Source>(&self, source: S) -> Result<Subscription, Error> {
        Subscription::new(self.clone(), Box::new(source))
    }

    /// Shares `source` between any number of subscribers.
    ///
    /// Nothing is registered until the first subscriber attaches.
    pub fn feed<S: Source + Sync>(&self, source: S) -> Feed<S> {
        Feed::new(self.clone(), source)
    }

    /// Number of user registrations held by the worker.
    ///
    /// The wake entry is not counted. Registrations that failed but were
    /// not yet unregistered are.
    pub fn active_registrations(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Number of completed wait/dispatch passes.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == RUNNING
    }

    /// Interrupts the current wait.
    ///
    /// The worker re-reads every source's [`interest`](Source::interest)
    /// before waiting again, so this is how output queued on a source from
    /// another thread gets flushed without waiting for the timeout.
    pub fn wake(&self) {
        self.signal();
    }

    fn signal(&self) {
        if let Err(e) = self.wake.signal() {
            tracing::warn!(error = %e, "wake signal lost, relying on wait timeout");
        }
    }
}

/// A readiness poller with a dedicated worker thread.
///
/// The worker blocks on every registered source at once and runs the
/// callbacks of whichever become ready. Registration changes made from
/// other threads interrupt the wait through an internal wake channel.
///
/// Dropping the poller shuts it down.
pub struct Poller {
    handle: PollerHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl Poller {
    /// Starts a poller whose wait is bounded by `wait_timeout`.
    pub fn new(wait_timeout: Duration) -> Result<Self, Error> {
        crate::PollerBuilder::new().wait_timeout(wait_timeout).build()
    }

    pub(crate) fn start(wait_timeout: Duration, thread_name: String) -> Result<Self, Error> {
        let wake = Arc::new(WakeChannel::new()?);
        let (actions, queue) = action_queue();

        let shared = Arc::new(Shared {
            state: AtomicU8::new(RUNNING),
            ids: IdAllocator::new(),
            cycles: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        });

        let worker = Worker {
            poll_set: PollSet::new(wake.raw_handle()),
            queue,
            wake: wake.clone(),
            shared: shared.clone(),
            wait_timeout,
        };

        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker.run())
            .map_err(Error::Spawn)?;

        let worker_id = join.thread().id();

        Ok(Self {
            handle: PollerHandle {
                actions,
                wake,
                shared,
            },
            worker: Mutex::new(Some(join)),
            worker_id,
        })
    }

    /// Returns a cloneable handle for registering from other components.
    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    /// See [`PollerHandle::register`].
    pub fn register<S, R, E>(
        &self,
        source: S,
        on_readable: R,
        on_error: E,
    ) -> Result<Registration, Error>
    where
        S: Source,
        R: FnMut(Vec<u8>) -> Result<(), BoxError> + Send + 'static,
        E: FnMut(ReadinessError) + Send + 'static,
    {
        self.handle.register(source, on_readable, on_error)
    }

    /// See [`PollerHandle::unregister`].
    pub fn unregister(&self, registration: &Registration) {
        self.handle.unregister(registration);
    }

    /// See [`PollerHandle::subscribe`].
    pub fn subscribe<S: Source>(&self, source: S) -> Result<Subscription, Error> {
        self.handle.subscribe(source)
    }

    /// See [`PollerHandle::feed`].
    pub fn feed<S: Source + Sync>(&self, source: S) -> Feed<S> {
        self.handle.feed(source)
    }

    pub fn active_registrations(&self) -> usize {
        self.handle.active_registrations()
    }

    pub fn cycles(&self) -> u64 {
        self.handle.cycles()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// See [`PollerHandle::wake`].
    pub fn wake(&self) {
        self.handle.wake();
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// When this returns no callback is running and none will run again.
    /// Concurrent and repeated calls are fine: the worker is joined once and
    /// every caller returns after it has stopped. Called from inside a
    /// callback, the stop is requested and the call returns without
    /// waiting, since the worker cannot join itself.
    pub fn shutdown(&self) {
        let shared = &self.handle.shared;

        if shared
            .state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!("poller shutdown requested");
            self.handle.signal();
        }

        if thread::current().id() == self.worker_id {
            return;
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(join) = worker.take() {
            if join.join().is_err() {
                tracing::error!("poller worker panicked");
            }
            shared.state.store(STOPPED, Ordering::Release);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.shared.state.load(Ordering::Acquire) == STOPPED
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The worker side of the poller. Lives on the poller thread.
struct Worker {
    poll_set: PollSet,
    queue: ActionQueue,
    wake: Arc<WakeChannel>,
    shared: Arc<Shared>,
    wait_timeout: Duration,
}

impl Worker {
    /// Main loop.
    ///
    /// Each pass:
    /// 1. Takes the snapshot, rebuilding it if the set changed
    /// 2. Waits on it, bounded by the wait timeout
    /// 3. Dispatches every ready entry
    /// 4. Drains and applies queued actions
    fn run(mut self) {
        tracing::debug!(timeout = ?self.wait_timeout, "poller worker started");

        while self.shared.state.load(Ordering::Acquire) == RUNNING {
            let snapshot = self.poll_set.snapshot();

            match sys_poll(&mut snapshot.entries, self.wait_timeout) {
                Ok(n) => {
                    tracing::trace!(ready = n, watched = snapshot.len() - 1, "wait returned");

                    if snapshot.wake_ready() {
                        self.wake.drain();
                    }

                    for (id, readiness) in snapshot.ready() {
                        self.dispatch(id, readiness);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "wait failed");
                    thread::sleep(WAIT_ERROR_BACKOFF.min(self.wait_timeout));
                }
            }

            self.apply_pending();
            self.shared.cycles.fetch_add(1, Ordering::AcqRel);
        }

        self.teardown();
    }

    fn apply_pending(&mut self) {
        for action in self.queue.drain_all() {
            tracing::trace!(id = %action.id(), "applying action");
            self.poll_set.apply(action);
        }
        self.shared.active.store(self.poll_set.len(), Ordering::Release);
    }

    /// Services one ready entry.
    fn dispatch(&mut self, id: RegistrationId, readiness: Readiness) {
        let Some(descriptor) = self.poll_set.get_mut(id) else {
            return;
        };
        if !descriptor.is_pollable() {
            return;
        }

        let failure = service(descriptor, readiness);

        if let Some(error) = failure {
            tracing::warn!(%id, %error, "registration failed");

            let on_error = &mut descriptor.on_error;
            if catch_unwind(AssertUnwindSafe(|| on_error(error))).is_err() {
                tracing::error!(%id, "error callback panicked");
            }
            self.poll_set.fault(id);
        }
    }

    /// Releases every registration after the loop exits.
    fn teardown(mut self) {
        for action in self.queue.drain_all() {
            if let Action::Add { descriptor, .. } = &action {
                descriptor.state.store(RegistrationState::Removed);
            }
        }

        self.poll_set.clear();
        self.shared.active.store(0, Ordering::Release);
        self.shared.state.store(STOPPED, Ordering::Release);

        tracing::debug!(cycles = self.shared.cycles.load(Ordering::Acquire), "poller worker stopped");
    }
}

/// Runs the source and callback work for one readiness report.
///
/// Returns the error to route to the registration's error callback.
fn service(descriptor: &mut Descriptor, readiness: Readiness) -> Option<ReadinessError> {
    if readiness.readable {
        match descriptor.source.recv() {
            Ok(Some(data)) => {
                let on_readable = &mut descriptor.on_readable;
                match catch_unwind(AssertUnwindSafe(|| on_readable(data))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Some(ReadinessError::Callback(e)),
                    Err(payload) => {
                        return Some(ReadinessError::CallbackPanic(panic_message(payload)));
                    }
                }
            }
            Ok(None) => {}
            Err(e) => return Some(ReadinessError::Receive(e)),
        }
    } else if readiness.errored {
        return Some(ReadinessError::Descriptor);
    } else if readiness.hangup {
        return Some(ReadinessError::HangUp);
    }

    if readiness.writable && descriptor.source.interest().write {
        if let Err(e) = descriptor.source.flush() {
            return Some(ReadinessError::Flush(e));
        }
    }

    None
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
