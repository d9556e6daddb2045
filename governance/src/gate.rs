//! Execute an action exactly once after a quorum of validators requested it.
//!
//! # Protocol
//!
//! Every validator that wants an action performed submits the same call independently. For each
//! submission, [Gate::submit]:
//!
//! 1. Resolves the current validator set and derives `threshold = ⌊2n/3⌋ + 1`.
//! 2. Identifies the submitting validator (see [crate::authority::invoker]). Calls from anyone
//!    else fail with [Error::Unauthorized] before anything is written.
//! 3. Derives the proposal identifier from the method and arguments (see [Proposal]).
//! 4. Registers the submitter's vote on the ballot for that identifier.
//! 5. Returns [Status::Pending] if the ballot holds fewer than `threshold` distinct voters.
//! 6. Otherwise clears the ballot and performs the action, returning [Status::Executed].
//!
//! Steps 4-6 happen inside the caller's [Context]. If the action fails, the error is returned
//! and the context is dropped, so neither the vote nor the clearing of the ballot is persisted:
//! a retry from any validator can still reach quorum. Metrics are only updated once the context
//! is committed.
//!
//! # Threshold Drift
//!
//! The validator set is re-read on every submission, so the threshold of a long-lived ballot can
//! change between votes. [Policy::Live] follows the current set (the threshold is whatever the
//! set requires at the time of the vote). [Policy::Pinned] uses the threshold recorded when the
//! first vote was cast.
//!
//! # Liveness
//!
//! There is no timeout or cancellation. A proposal that never gathers enough identical
//! submissions stays pending (see [crate::ballot::prune] for explicit cleanup).

use crate::{
    authority::{invoker, Validators, Witness},
    ballot::{self, Proposal},
    context::Context,
    store::Store,
    types::quorum,
    Error,
};
use commonware_cryptography::Hasher;
use commonware_utils::hex;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::marker::PhantomData;
use tracing::{debug, info};

/// How the threshold of a ballot is determined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Re-derive the threshold from the validator set on every vote.
    #[default]
    Live,
    /// Use the threshold derived when the first vote was cast.
    Pinned,
}

/// Configuration for a [Gate].
#[derive(Clone, Debug)]
pub struct Config {
    /// Domain separator mixed into every proposal identifier.
    pub namespace: Vec<u8>,

    /// How the threshold of a ballot is determined.
    pub policy: Policy,
}

/// Outcome of a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The vote was recorded but quorum has not been reached.
    Pending { votes: usize, threshold: usize },
    /// Quorum was reached: the ballot was cleared and the action performed.
    Executed { votes: usize, threshold: usize },
}

impl Status {
    /// Returns true if the action was performed.
    pub fn executed(&self) -> bool {
        matches!(self, Status::Executed { .. })
    }
}

/// A quorum gate in front of arbitrary actions.
pub struct Gate<H: Hasher> {
    cfg: Config,

    votes: Counter,
    executed: Counter,

    _hasher: PhantomData<H>,
}

impl<H: Hasher> Gate<H> {
    /// Create a new gate, registering its metrics with `registry`.
    pub fn new(registry: &mut Registry, cfg: Config) -> Self {
        let gate = Self {
            cfg,
            votes: Counter::default(),
            executed: Counter::default(),
            _hasher: PhantomData,
        };
        registry.register("votes", "Number of votes recorded", gate.votes.clone());
        registry.register(
            "executed",
            "Number of actions executed at quorum",
            gate.executed.clone(),
        );
        gate
    }

    /// Start a proposal for `method` in this gate's namespace.
    pub fn proposal(&self, method: &'static str) -> Proposal<H> {
        Proposal::new(&self.cfg.namespace, method)
    }

    /// Vote for `proposal` on behalf of the caller and perform `action` once quorum is reached.
    pub fn submit<'a, S, W, V, F>(
        &self,
        ctx: &mut Context<'a, S, W>,
        validators: &V,
        proposal: Proposal<H>,
        action: F,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness,
        V: Validators<W::PublicKey>,
        F: FnOnce(&mut Context<'a, S, W>) -> Result<(), Error>,
    {
        // Resolve voter
        let validators = validators.validators();
        let current = quorum(validators.len());
        let Some(voter) = invoker(ctx.witness(), &validators) else {
            return Err(Error::Unauthorized);
        };

        // Record vote
        let method = proposal.method();
        let id = proposal.id();
        let height = ctx.height();
        let (ballot, recorded) = ballot::vote(ctx.store(), id.as_ref(), &voter, height, current)?;
        let votes = ballot.count();
        let threshold = match self.cfg.policy {
            Policy::Live => current,
            Policy::Pinned => ballot.threshold(),
        };
        if recorded {
            let counter = self.votes.clone();
            ctx.on_commit(move || {
                counter.inc();
            });
        }
        if votes < threshold {
            debug!(method, id = %hex(id.as_ref()), votes, threshold, "proposal pending");
            return Ok(Status::Pending { votes, threshold });
        }

        // Perform action
        ballot::clear(ctx.store(), id.as_ref());
        action(ctx)?;
        let counter = self.executed.clone();
        ctx.on_commit(move || {
            counter.inc();
        });
        info!(method, id = %hex(id.as_ref()), votes, threshold, "proposal executed");
        Ok(Status::Executed { votes, threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{authority::Signatures, ballot::Ballot, store::Memory};
    use commonware_cryptography::{ed25519, PrivateKeyExt, Sha256, Signer};
    use commonware_macros::test_traced;
    use prometheus_client::encoding::text::encode;

    const NAMESPACE: &[u8] = b"_GATE_TEST";

    fn signers(n: u64) -> Vec<ed25519::PrivateKey> {
        (0..n).map(ed25519::PrivateKey::from_seed).collect()
    }

    fn keys(signers: &[ed25519::PrivateKey]) -> Vec<ed25519::PublicKey> {
        signers.iter().map(|s| s.public_key()).collect()
    }

    fn witness(signer: &ed25519::PrivateKey) -> Signatures<ed25519::PublicKey> {
        let mut witness = Signatures::new(NAMESPACE, b"tx");
        witness.sign(signer);
        witness
    }

    fn gate(registry: &mut Registry, policy: Policy) -> Gate<Sha256> {
        Gate::new(
            registry,
            Config {
                namespace: NAMESPACE.to_vec(),
                policy,
            },
        )
    }

    /// Submit `test(arg)` from `signer`, counting executions in `executed`.
    fn submit(
        gate: &Gate<Sha256>,
        store: &mut Memory,
        validators: &Vec<ed25519::PublicKey>,
        signer: &ed25519::PrivateKey,
        arg: u64,
        executed: &mut usize,
    ) -> Result<Status, Error> {
        let witness = witness(signer);
        let mut ctx = Context::new(store, &witness, 1);
        let proposal = gate.proposal("test").with(&arg);
        let status = gate.submit(&mut ctx, validators, proposal, |_| {
            *executed += 1;
            Ok(())
        })?;
        ctx.commit();
        Ok(status)
    }

    fn ballot_of(
        gate: &Gate<Sha256>,
        store: &Memory,
        arg: u64,
    ) -> Option<Ballot<ed25519::PublicKey>> {
        let id = gate.proposal("test").with(&arg).id();
        ballot::get(store, id.as_ref()).unwrap()
    }

    #[test_traced]
    fn test_executes_once_at_quorum() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(7);
        let validators = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        // 4 distinct votes are not enough for 7 validators (threshold = 5)
        for signer in &signers[..4] {
            let status = submit(&gate, &mut store, &validators, signer, 1, &mut executed).unwrap();
            assert!(!status.executed());
        }
        assert_eq!(executed, 0);
        assert_eq!(ballot_of(&gate, &store, 1).unwrap().count(), 4);

        // 5th distinct vote executes the action and clears the ballot
        let status = submit(&gate, &mut store, &validators, &signers[4], 1, &mut executed).unwrap();
        assert_eq!(
            status,
            Status::Executed {
                votes: 5,
                threshold: 5
            }
        );
        assert_eq!(executed, 1);
        assert!(ballot_of(&gate, &store, 1).is_none());
        assert!(store.is_empty());

        // Check metrics
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("votes_total 5"));
        assert!(buffer.contains("executed_total 1"));
    }

    #[test_traced]
    fn test_late_votes_start_fresh_ballot() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(4);
        let validators = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        for signer in &signers[..3] {
            submit(&gate, &mut store, &validators, signer, 1, &mut executed).unwrap();
        }
        assert_eq!(executed, 1);

        // The 4th validator arrives late and opens a new ballot for the same identifier
        let status = submit(&gate, &mut store, &validators, &signers[3], 1, &mut executed).unwrap();
        assert_eq!(
            status,
            Status::Pending {
                votes: 1,
                threshold: 3
            }
        );
        assert_eq!(executed, 1);
    }

    #[test_traced]
    fn test_duplicate_votes_do_not_count() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(4);
        let validators = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        for _ in 0..5 {
            let status =
                submit(&gate, &mut store, &validators, &signers[0], 1, &mut executed).unwrap();
            assert_eq!(
                status,
                Status::Pending {
                    votes: 1,
                    threshold: 3
                }
            );
        }
        assert_eq!(executed, 0);

        // Only the first vote was recorded
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("votes_total 1"));
    }

    #[test_traced]
    fn test_metrics_ignore_dropped_calls() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(1);
        let validators = keys(&signers);
        let mut store = Memory::new();

        // The call executes but the host discards it
        let witness = witness(&signers[0]);
        {
            let mut ctx = Context::new(&mut store, &witness, 1);
            let proposal = gate.proposal("test").with(&1u64);
            let status = gate.submit(&mut ctx, &validators, proposal, |_| Ok(())).unwrap();
            assert!(status.executed());
        }
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("votes_total 0"));
        assert!(buffer.contains("executed_total 0"));

        // The same call committed is counted
        let mut executed = 0;
        submit(&gate, &mut store, &validators, &signers[0], 1, &mut executed).unwrap();
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("votes_total 1"));
        assert!(buffer.contains("executed_total 1"));
    }

    #[test_traced]
    fn test_different_arguments_are_different_ballots() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(4);
        let validators = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        submit(&gate, &mut store, &validators, &signers[0], 1, &mut executed).unwrap();
        submit(&gate, &mut store, &validators, &signers[1], 2, &mut executed).unwrap();
        submit(&gate, &mut store, &validators, &signers[2], 1, &mut executed).unwrap();
        assert_eq!(executed, 0);
        assert_eq!(ballot_of(&gate, &store, 1).unwrap().count(), 2);
        assert_eq!(ballot_of(&gate, &store, 2).unwrap().count(), 1);
    }

    #[test_traced]
    fn test_outsider_is_rejected_without_writes() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(5);
        let validators = keys(&signers[..4]);
        let mut store = Memory::new();
        let mut executed = 0;

        let result = submit(&gate, &mut store, &validators, &signers[4], 1, &mut executed);
        assert!(matches!(result, Err(Error::Unauthorized)));
        assert!(store.is_empty());
    }

    #[test_traced]
    fn test_failed_action_keeps_ballot() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(1);
        let validators = keys(&signers);
        let mut store = Memory::new();

        // The only validator reaches quorum, but the action fails
        let witness = witness(&signers[0]);
        {
            let mut ctx = Context::new(&mut store, &witness, 1);
            let proposal = gate.proposal("test").with(&1u64);
            let result = gate.submit(&mut ctx, &validators, proposal, |ctx| {
                ctx.store().put(b"effect".to_vec(), vec![1]);
                Err(Error::ActionFailed("test"))
            });
            assert!(matches!(result, Err(Error::ActionFailed("test"))));
        }
        assert!(store.is_empty());

        // A retry succeeds
        let mut executed = 0;
        let status = submit(&gate, &mut store, &validators, &signers[0], 1, &mut executed).unwrap();
        assert!(status.executed());
        assert_eq!(executed, 1);
    }

    #[test_traced]
    fn test_live_threshold_follows_shrinking_set() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(7);
        let all = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        for signer in &signers[..2] {
            submit(&gate, &mut store, &all, signer, 1, &mut executed).unwrap();
        }

        // The set shrinks to 4 (threshold 3): the next vote executes
        let shrunk = all[..4].to_vec();
        let status = submit(&gate, &mut store, &shrunk, &signers[2], 1, &mut executed).unwrap();
        assert_eq!(
            status,
            Status::Executed {
                votes: 3,
                threshold: 3
            }
        );
        assert_eq!(executed, 1);
    }

    #[test_traced]
    fn test_pinned_threshold_ignores_shrinking_set() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Pinned);
        let signers = signers(7);
        let all = keys(&signers);
        let mut store = Memory::new();
        let mut executed = 0;

        for signer in &signers[..2] {
            submit(&gate, &mut store, &all, signer, 1, &mut executed).unwrap();
        }

        // The set shrinks to 4 but the ballot keeps the threshold of 5
        let shrunk = all[..4].to_vec();
        for signer in &signers[2..4] {
            let status = submit(&gate, &mut store, &shrunk, signer, 1, &mut executed).unwrap();
            assert!(!status.executed());
        }
        assert_eq!(executed, 0);
        let ballot = ballot_of(&gate, &store, 1).unwrap();
        assert_eq!(ballot.count(), 4);
        assert_eq!(ballot.threshold(), 5);
    }

    #[test_traced]
    fn test_live_threshold_follows_growing_set() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Live);
        let signers = signers(7);
        let all = keys(&signers);
        let small = all[..4].to_vec();
        let mut store = Memory::new();
        let mut executed = 0;

        for signer in &signers[..2] {
            submit(&gate, &mut store, &small, signer, 1, &mut executed).unwrap();
        }

        // The set grows to 7 (threshold 5): 3 votes are no longer enough
        let status = submit(&gate, &mut store, &all, &signers[2], 1, &mut executed).unwrap();
        assert_eq!(
            status,
            Status::Pending {
                votes: 3,
                threshold: 5
            }
        );
        assert_eq!(executed, 0);
    }

    #[test_traced]
    fn test_pinned_threshold_ignores_growing_set() {
        let mut registry = Registry::default();
        let gate = gate(&mut registry, Policy::Pinned);
        let signers = signers(7);
        let all = keys(&signers);
        let small = all[..4].to_vec();
        let mut store = Memory::new();
        let mut executed = 0;

        for signer in &signers[..2] {
            submit(&gate, &mut store, &small, signer, 1, &mut executed).unwrap();
        }

        // The ballot was opened with a threshold of 3
        let status = submit(&gate, &mut store, &all, &signers[2], 1, &mut executed).unwrap();
        assert_eq!(
            status,
            Status::Executed {
                votes: 3,
                threshold: 3
            }
        );
        assert_eq!(executed, 1);
    }

    #[test]
    fn test_quorum_never_reached_early() {
        for n in 1..=10u64 {
            let mut registry = Registry::default();
            let gate = gate(&mut registry, Policy::Live);
            let signers = signers(n);
            let validators = keys(&signers);
            let mut store = Memory::new();
            let mut executed = 0;

            let threshold = quorum(n as usize);
            for (i, signer) in signers.iter().enumerate() {
                let status =
                    submit(&gate, &mut store, &validators, signer, 1, &mut executed).unwrap();
                assert_eq!(status.executed(), i + 1 == threshold, "n={n} vote={}", i + 1);
            }
            assert_eq!(executed, 1);
        }
    }
}
