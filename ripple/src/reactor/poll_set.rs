//! Worker-owned set of active descriptors.
//!
//! The poll set maps registration ids to descriptors and keeps a flat
//! snapshot of them in the layout the wait primitive expects. The snapshot
//! is rebuilt lazily: every mutation throws it away and the next call to
//! [`PollSet::snapshot`] builds a fresh one.

use super::action::Action;
use super::poller::common::{Interest, Readiness};
use super::poller::{PollFd, RawHandle, poll_entry, readiness};
use super::registration::{Descriptor, RegistrationId, RegistrationState};

use std::collections::BTreeMap;

/// Flattened view of the poll set used for one wait.
///
/// Index 0 is always the wake channel. `ids[i]` names the registration
/// behind `entries[i + 1]`.
pub(crate) struct Snapshot {
    pub(crate) entries: Vec<PollFd>,
    ids: Vec<RegistrationId>,
}

impl Snapshot {
    /// Whether the wake entry reported readiness in the last wait.
    pub(crate) fn wake_ready(&self) -> bool {
        !readiness(&self.entries[0]).is_empty()
    }

    /// Ready user entries in array order.
    pub(crate) fn ready(&self) -> Vec<(RegistrationId, Readiness)> {
        self.entries[1..]
            .iter()
            .zip(&self.ids)
            .map(|(entry, id)| (*id, readiness(entry)))
            .filter(|(_, r)| !r.is_empty())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub(crate) struct PollSet {
    wake: RawHandle,
    descriptors: BTreeMap<RegistrationId, Descriptor>,
    snapshot: Option<Snapshot>,
}

impl PollSet {
    pub(crate) fn new(wake: RawHandle) -> Self {
        Self {
            wake,
            descriptors: BTreeMap::new(),
            snapshot: None,
        }
    }

    /// Applies one queued mutation.
    ///
    /// Both directions are idempotent: a duplicate add keeps the existing
    /// record and a remove of an unknown id does nothing. Either case means
    /// the registration layer handed out a bad id, so debug builds assert.
    pub(crate) fn apply(&mut self, action: Action) {
        self.snapshot = None;

        match action {
            Action::Add { id, descriptor } => {
                if id == RegistrationId::WAKE {
                    debug_assert!(false, "registration under the wake id");
                    tracing::error!(%id, "registration under the wake id ignored");
                    return;
                }
                if self.descriptors.contains_key(&id) {
                    debug_assert!(false, "duplicate registration {id}");
                    tracing::error!(%id, "duplicate registration ignored");
                    return;
                }

                descriptor
                    .state
                    .transition(RegistrationState::Pending, RegistrationState::Active);
                self.descriptors.insert(id, descriptor);

                tracing::debug!(%id, "registration added");
            }
            Action::Remove { id } => match self.descriptors.remove(&id) {
                Some(descriptor) => {
                    descriptor.state.store(RegistrationState::Removed);
                    tracing::debug!(%id, "registration removed");
                }
                None => {
                    debug_assert!(false, "removal of unknown registration {id}");
                    tracing::error!(%id, "removal of unknown registration ignored");
                }
            },
        }
    }

    /// Stops polling a descriptor after its error has been reported.
    pub(crate) fn fault(&mut self, id: RegistrationId) {
        if let Some(descriptor) = self.descriptors.get_mut(&id) {
            descriptor.faulted = true;
            self.snapshot = None;
        }
    }

    pub(crate) fn get_mut(&mut self, id: RegistrationId) -> Option<&mut Descriptor> {
        self.descriptors.get_mut(&id)
    }

    /// Returns the snapshot, rebuilding it if a mutation invalidated it.
    ///
    /// Membership is memoised; interest is not. Every call re-reads each
    /// source's interest so write readiness is only requested while the
    /// source has output pending.
    pub(crate) fn snapshot(&mut self) -> &mut Snapshot {
        let descriptors = &self.descriptors;
        let wake = self.wake;

        let snapshot = self.snapshot.get_or_insert_with(|| {
            let mut entries = Vec::with_capacity(descriptors.len() + 1);
            let mut ids = Vec::with_capacity(descriptors.len());

            entries.push(poll_entry(wake, Interest::READABLE));

            for (id, descriptor) in descriptors.iter().filter(|(_, d)| d.is_pollable()) {
                entries.push(poll_entry(
                    descriptor.source.raw_handle(),
                    descriptor.source.interest(),
                ));
                ids.push(*id);
            }

            Snapshot { entries, ids }
        });

        for (entry, id) in snapshot.entries[1..].iter_mut().zip(&snapshot.ids) {
            if let Some(descriptor) = descriptors.get(id) {
                *entry = poll_entry(descriptor.source.raw_handle(), descriptor.source.interest());
            }
        }

        snapshot
    }

    /// Number of user registrations held, faulted ones included.
    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Marks every remaining registration removed and drops it.
    pub(crate) fn clear(&mut self) {
        self.snapshot = None;
        for (_, descriptor) in std::mem::take(&mut self.descriptors) {
            descriptor.state.store(RegistrationState::Removed);
        }
    }
}
