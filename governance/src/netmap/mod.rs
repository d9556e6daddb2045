//! Maintain the candidate set and an epoch-indexed history of network map snapshots.
//!
//! # Overview
//!
//! Candidates are the live, mutable working set of nodes that want to participate in the
//! network. They are added with [Netmap::add_peer] and change status with
//! [Netmap::update_state]. At every epoch boundary, [Netmap::new_epoch] copies the candidates
//! that are not `Offline` into an immutable [Snapshot] and writes it into a [Ring] that retains
//! the last [Netmap::snapshot_count] epochs. Snapshots are addressed by how many epochs back
//! they were taken ([Netmap::snapshot]) or by absolute epoch ([Netmap::snapshot_by_epoch]).
//!
//! Every mutating operation is authorized by an aggregate multi-signature of a quorum of the
//! Alphabet (see [crate::authority::require_quorum]) rather than by a ballot.
//!
//! # Cleanup
//!
//! After an epoch transition, each registered [Cleanup] collaborator is invoked with the new
//! epoch. Cleanup is best-effort: a failing collaborator is logged and reported with
//! [Event::DownstreamFailure], but the transition itself still holds.

use crate::{
    authority::{require_quorum, Validators, Witness},
    context::{Context, Event},
    ring::Ring,
    store::Store,
    types::Epoch,
    Error,
};
use commonware_codec::{Decode, DecodeExt, Encode};
use commonware_cryptography::PublicKey;
use prometheus_client::{metrics::gauge::Gauge, registry::Registry};
use tracing::{debug, info, warn};

mod types;
pub use types::{Node, NodeState, Snapshot};

const CANDIDATE: &[u8] = b"netmap/candidate/";
const EPOCH: &[u8] = b"netmap/epoch";
const BLOCK: &[u8] = b"netmap/block";
const SNAPSHOT: &[u8] = b"netmap/snapshot";

/// Default number of epochs retained by the network map.
pub const DEFAULT_SNAPSHOT_COUNT: u32 = 10;

/// Configuration for a [Netmap].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of snapshots allocated by [Netmap::init].
    pub snapshot_count: u32,

    /// Maximum number of nodes decoded from a single snapshot.
    pub max_nodes: usize,

    /// Maximum size of a node descriptor.
    pub max_descriptor_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_count: DEFAULT_SNAPSHOT_COUNT,
            max_nodes: 4_096,
            max_descriptor_size: 4_096,
        }
    }
}

/// A collaborator notified after every epoch transition.
pub trait Cleanup {
    /// Name used when reporting failures.
    fn name(&self) -> &str;

    /// Release state that became stale at `epoch`.
    fn new_epoch(&mut self, epoch: Epoch) -> Result<(), Error>;
}

/// The network map.
pub struct Netmap<P: PublicKey> {
    cfg: Config,
    ring: Ring<Snapshot<P>>,

    epoch: Gauge,
    snapshot_count: Gauge,
}

impl<P: PublicKey> Netmap<P> {
    /// Create a handle to the network map, registering its metrics with `registry`.
    pub fn new(registry: &mut Registry, cfg: Config) -> Self {
        let ring = Ring::new(SNAPSHOT, (cfg.max_nodes, cfg.max_descriptor_size));
        let netmap = Self {
            cfg,
            ring,
            epoch: Gauge::default(),
            snapshot_count: Gauge::default(),
        };
        registry.register("epoch", "Current epoch", netmap.epoch.clone());
        registry.register(
            "snapshot_count",
            "Number of retained snapshots",
            netmap.snapshot_count.clone(),
        );
        netmap
    }

    /// Allocate the snapshot ring and start at epoch zero.
    ///
    /// Fails with [Error::InvalidArgument] if the network map was already initialized.
    pub fn init(&self, store: &mut impl Store) -> Result<(), Error> {
        if self.ring.initialized(store) {
            return Err(Error::InvalidArgument("netmap already initialized"));
        }
        self.ring.init(store, self.cfg.snapshot_count)?;
        store.put(EPOCH.to_vec(), Epoch::zero().encode().to_vec());
        store.put(BLOCK.to_vec(), 0u64.encode().to_vec());
        self.epoch.set(0);
        self.snapshot_count.set(self.cfg.snapshot_count as i64);
        info!(snapshot_count = self.cfg.snapshot_count, "initialized netmap");
        Ok(())
    }

    fn candidate_key(key: &P) -> Vec<u8> {
        let mut candidate = CANDIDATE.to_vec();
        candidate.extend_from_slice(key.as_ref());
        candidate
    }

    fn candidate(&self, store: &impl Store, key: &P) -> Result<Option<Node<P>>, Error> {
        let Some(raw) = store.get(&Self::candidate_key(key)) else {
            return Ok(None);
        };
        Ok(Some(Node::decode_cfg(
            raw.as_slice(),
            &self.cfg.max_descriptor_size,
        )?))
    }

    /// Add `key` to the candidate set as `Online` (replacing any previous descriptor).
    pub fn add_peer<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        alphabet: &V,
        key: P,
        descriptor: Vec<u8>,
    ) -> Result<(), Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        require_quorum(ctx.witness(), &alphabet.validators())?;
        if descriptor.len() > self.cfg.max_descriptor_size {
            return Err(Error::InvalidArgument("descriptor too large"));
        }
        let node = Node {
            key: key.clone(),
            descriptor,
            state: NodeState::Online,
        };
        ctx.store()
            .put(Self::candidate_key(&key), node.encode().to_vec());
        debug!(?key, "added peer");
        ctx.emit(Event::AddPeerSuccess(key));
        Ok(())
    }

    /// Change the status of candidate `key`.
    ///
    /// `Offline` removes the candidate. Fails with [Error::NotFound] if `key` is not a
    /// candidate.
    pub fn update_state<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        alphabet: &V,
        key: P,
        state: NodeState,
    ) -> Result<(), Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        require_quorum(ctx.witness(), &alphabet.validators())?;
        let Some(mut node) = self.candidate(ctx.store(), &key)? else {
            return Err(Error::NotFound("candidate"));
        };
        let candidate = Self::candidate_key(&key);
        match state {
            NodeState::Offline => ctx.store().delete(&candidate),
            NodeState::Online | NodeState::Maintenance => {
                node.state = state;
                ctx.store().put(candidate, node.encode().to_vec());
            }
        }
        debug!(?key, ?state, "updated peer state");
        ctx.emit(Event::UpdateStateSuccess(key, state));
        Ok(())
    }

    /// Returns every candidate in ascending key order.
    pub fn candidates(&self, store: &impl Store) -> Result<Vec<Node<P>>, Error> {
        store
            .scan(CANDIDATE)
            .into_iter()
            .map(|(_, raw)| {
                Node::decode_cfg(raw.as_slice(), &self.cfg.max_descriptor_size)
                    .map_err(Error::from)
            })
            .collect()
    }

    /// Advance to `epoch`, snapshotting the current candidate set.
    ///
    /// Fails with [Error::StaleEpoch] unless `epoch` is greater than the current epoch and with
    /// [Error::InvalidArgument] if the snapshot would hold more than [Config::max_nodes] nodes.
    /// Each collaborator in `cleanups` is invoked after the transition (failures do not revert
    /// it).
    pub fn new_epoch<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        alphabet: &V,
        epoch: Epoch,
        cleanups: &mut [&mut dyn Cleanup],
    ) -> Result<(), Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        require_quorum(ctx.witness(), &alphabet.validators())?;
        let current = self.epoch(ctx.store())?;
        if epoch <= current {
            return Err(Error::StaleEpoch(current, epoch));
        }

        // Snapshot candidates
        let snapshot = Snapshot::new(self.candidates(ctx.store())?);
        let nodes = snapshot.len();
        if nodes > self.cfg.max_nodes {
            return Err(Error::InvalidArgument("too many nodes in snapshot"));
        }
        self.ring.write(ctx.store(), &snapshot)?;
        let height = ctx.height();
        ctx.store().put(EPOCH.to_vec(), epoch.encode().to_vec());
        ctx.store().put(BLOCK.to_vec(), height.encode().to_vec());
        let gauge = self.epoch.clone();
        ctx.on_commit(move || {
            gauge.set(epoch.get() as i64);
        });
        info!(%epoch, height, nodes, "advanced epoch");

        // Notify collaborators
        for cleanup in cleanups.iter_mut() {
            if let Err(err) = cleanup.new_epoch(epoch) {
                warn!(collaborator = cleanup.name(), %epoch, ?err, "cleanup failed");
                ctx.emit(Event::DownstreamFailure {
                    collaborator: cleanup.name().to_string(),
                    reason: err.to_string(),
                });
            }
        }
        ctx.emit(Event::NewEpoch(epoch));
        Ok(())
    }

    /// Returns the current epoch.
    pub fn epoch(&self, store: &impl Store) -> Result<Epoch, Error> {
        let raw = store
            .get(EPOCH)
            .ok_or(Error::NotInitialized("netmap epoch"))?;
        Ok(Epoch::decode(raw.as_slice())?)
    }

    /// Returns the height of the block that performed the last epoch transition.
    pub fn last_epoch_block(&self, store: &impl Store) -> Result<u64, Error> {
        let raw = store
            .get(BLOCK)
            .ok_or(Error::NotInitialized("netmap block"))?;
        Ok(u64::decode(raw.as_slice())?)
    }

    /// Returns the snapshot taken at the most recent epoch transition.
    pub fn current(&self, store: &impl Store) -> Result<Snapshot<P>, Error> {
        self.ring.current(store)
    }

    /// Returns the snapshot taken `diff` epochs before the current one.
    ///
    /// Fails with [Error::OutOfRange] unless `diff < snapshot_count`.
    pub fn snapshot(&self, store: &impl Store, diff: u64) -> Result<Snapshot<P>, Error> {
        self.ring.read(store, diff)
    }

    /// Returns the snapshot taken at `epoch`.
    pub fn snapshot_by_epoch(
        &self,
        store: &impl Store,
        epoch: Epoch,
    ) -> Result<Snapshot<P>, Error> {
        let current = self.epoch(store)?;
        let Some(diff) = current.distance(epoch) else {
            return Err(Error::InvalidArgument("epoch is in the future"));
        };
        self.snapshot(store, diff)
    }

    /// Returns the number of retained snapshots.
    pub fn snapshot_count(&self, store: &impl Store) -> Result<u32, Error> {
        self.ring.capacity(store)
    }

    /// Change the number of retained snapshots to `count`, keeping the most recent ones.
    pub fn update_snapshot_count<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        alphabet: &V,
        count: u32,
    ) -> Result<(), Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        require_quorum(ctx.witness(), &alphabet.validators())?;
        self.ring.resize(ctx.store(), count)?;
        let gauge = self.snapshot_count.clone();
        ctx.on_commit(move || {
            gauge.set(count as i64);
        });
        Ok(())
    }
}
