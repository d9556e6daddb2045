//! Cast this Alphabet member's committee vote once a quorum of validators agrees on the
//! candidate list.
//!
//! Every Alphabet member runs its own [Alphabet] with a distinct [Config::index]. When the
//! validators agree on the candidates of an epoch, each member votes for
//! `candidates[index mod len(candidates)]`, so the members spread their votes across the list.
//! A refused committee vote is logged and reported but does not abort the call.

use crate::{
    authority::{Validators, Witness},
    context::{Context, Event},
    gate::{self, Gate, Status},
    netmap::Netmap,
    store::Store,
    types::Epoch,
    Error,
};
use commonware_cryptography::{sha256::Sha256, PublicKey};
use prometheus_client::registry::Registry;
use std::marker::PhantomData;
use tracing::{info, warn};

/// Configuration for an [Alphabet] member.
#[derive(Clone, Debug)]
pub struct Config {
    /// Configuration of the gate that guards the committee vote.
    pub gate: gate::Config,

    /// Position of this member in the Alphabet.
    pub index: usize,

    /// Human-readable name of this member.
    pub name: String,
}

/// Committee membership collaborator.
pub trait Committee<P: PublicKey> {
    /// Vote for `candidate`, returning false if the vote was refused.
    fn vote(&mut self, candidate: &P) -> bool;
}

/// An Alphabet member.
pub struct Alphabet<P: PublicKey> {
    cfg: Config,
    gate: Gate<Sha256>,
    _key: PhantomData<P>,
}

impl<P: PublicKey> Alphabet<P> {
    /// Create a member whose gate metrics are registered under the `gate` prefix.
    pub fn new(registry: &mut Registry, cfg: Config) -> Self {
        let gate = Gate::new(registry.sub_registry_with_prefix("gate"), cfg.gate.clone());
        Self {
            cfg,
            gate,
            _key: PhantomData,
        }
    }

    /// Returns the position of this member in the alphabet.
    pub fn index(&self) -> usize {
        self.cfg.index
    }

    /// Returns the name of this member.
    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    /// Vote for `candidates` as the committee of `epoch`.
    ///
    /// Fails with [Error::InvalidArgument] if `candidates` is empty and with
    /// [Error::StaleEpoch] unless `epoch` is the current epoch (both before voting).
    pub fn vote<S, W, V, C>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        netmap: &Netmap<P>,
        committee: &mut C,
        epoch: Epoch,
        candidates: Vec<P>,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
        C: Committee<P>,
    {
        if candidates.is_empty() {
            return Err(Error::InvalidArgument("no candidates"));
        }
        let current = netmap.epoch(ctx.store())?;
        if epoch != current {
            return Err(Error::StaleEpoch(current, epoch));
        }
        let proposal = self.gate.proposal("vote").with(&epoch).with(&candidates);
        let index = self.cfg.index;
        let name = self.cfg.name.as_str();
        self.gate.submit(ctx, validators, proposal, |ctx| {
            let candidate = candidates[index % candidates.len()].clone();
            let success = committee.vote(&candidate);
            if success {
                info!(name, %epoch, ?candidate, "voted for committee");
            } else {
                warn!(name, %epoch, ?candidate, "committee vote refused");
            }
            ctx.emit(Event::CommitteeVote { candidate, success });
            Ok(())
        })
    }
}
