//! Execute a single call as an all-or-nothing state transition.
//!
//! A [Context] is created by the host for every call. It carries the call's authorization
//! ([Witness]), the height of the block including the call, and a [Batch] over the persistent
//! [Store]. Operations mutate only the batch and record [Event]s. The host either
//! [Context::commit]s the result or drops the context (after an error), discarding every write
//! and notification the call produced.
//!
//! Effects outside the store (such as metrics) are registered with [Context::on_commit] and only
//! run once the call's writes were applied.

use crate::{
    authority::Witness,
    netmap::NodeState,
    store::{Batch, Store},
    types::Epoch,
};
use commonware_cryptography::{sha256::Digest, PublicKey};

/// A notification emitted by a successful call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<P: PublicKey> {
    /// A candidate was added to (or refreshed in) the candidate set.
    AddPeerSuccess(P),
    /// A candidate's state was changed (or the candidate was removed, if `Offline`).
    UpdateStateSuccess(P, NodeState),
    /// The network map advanced to a new epoch.
    NewEpoch(Epoch),
    /// A container was committed after reaching quorum.
    ContainerPut { id: Digest, owner: P },
    /// A container was removed after reaching quorum.
    ContainerDelete { id: Digest },
    /// Size estimation for the epoch should begin.
    StartEstimation(Epoch),
    /// Size estimation for the epoch should end.
    StopEstimation(Epoch),
    /// Stale estimations were removed for the epoch.
    EpochProcessed { epoch: Epoch, removed: usize },
    /// The alphabet member cast its committee vote.
    CommitteeVote { candidate: P, success: bool },
    /// A collaborator invoked after the state transition failed (the transition still holds).
    DownstreamFailure { collaborator: String, reason: String },
}

/// Transaction-scoped environment threaded through every mutating operation.
pub struct Context<'a, S: Store, W: Witness> {
    batch: Batch<'a, S>,
    witness: &'a W,
    height: u64,
    events: Vec<Event<W::PublicKey>>,
    hooks: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'a, S: Store, W: Witness> Context<'a, S, W> {
    /// Begin a call included at block `height` and authorized by `witness`.
    pub fn new(store: &'a mut S, witness: &'a W, height: u64) -> Self {
        Self {
            batch: Batch::new(store),
            witness,
            height,
            events: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Returns the authorization context of the call.
    pub fn witness(&self) -> &'a W {
        self.witness
    }

    /// Returns the height of the block including the call.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Returns the pending changes of the call.
    pub fn store(&mut self) -> &mut Batch<'a, S> {
        &mut self.batch
    }

    /// Record a notification.
    pub fn emit(&mut self, event: Event<W::PublicKey>) {
        self.events.push(event);
    }

    /// Returns the notifications recorded so far.
    pub fn events(&self) -> &[Event<W::PublicKey>] {
        &self.events
    }

    /// Run `hook` after the call's changes are written (never, if the context is dropped).
    pub fn on_commit(&mut self, hook: impl FnOnce() + 'a) {
        self.hooks.push(Box::new(hook));
    }

    /// Apply all changes to the underlying store, run commit hooks in registration order, and
    /// return the call's notifications.
    pub fn commit(self) -> Vec<Event<W::PublicKey>> {
        self.batch.write();
        for hook in self.hooks {
            hook();
        }
        self.events
    }
}
