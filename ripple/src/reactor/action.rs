//! Pending mutations of the poll set.
//!
//! Any thread may enqueue an [`Action`]; only the worker drains them. The
//! queue is a plain `std::sync::mpsc` channel: producers never block and all
//! sends are linearised, so actions from one thread keep their order.

use super::registration::{Descriptor, RegistrationId};
use crate::error::Error;

use std::sync::mpsc::{Receiver, Sender, channel};

/// A mutation waiting to be applied by the worker.
pub(crate) enum Action {
    Add {
        id: RegistrationId,
        descriptor: Descriptor,
    },
    Remove {
        id: RegistrationId,
    },
}

impl Action {
    pub(crate) fn id(&self) -> RegistrationId {
        match self {
            Action::Add { id, .. } | Action::Remove { id } => *id,
        }
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub(crate) struct ActionSender {
    sender: Sender<Action>,
}

impl ActionSender {
    /// Queues an action. Does not wake the worker.
    ///
    /// Fails with [`Error::Shutdown`] once the worker has exited.
    pub(crate) fn enqueue(&self, action: Action) -> Result<(), Error> {
        self.sender.send(action).map_err(|_| Error::Shutdown)
    }
}

/// Consumer side of the queue, owned by the worker.
pub(crate) struct ActionQueue {
    receiver: Receiver<Action>,
}

impl ActionQueue {
    /// Takes every action queued so far.
    pub(crate) fn drain_all(&self) -> Vec<Action> {
        self.receiver.try_iter().collect()
    }
}

/// Creates a connected sender/queue pair.
pub(crate) fn action_queue() -> (ActionSender, ActionQueue) {
    let (sender, receiver) = channel();
    (ActionSender { sender }, ActionQueue { receiver })
}
