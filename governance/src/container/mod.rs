//! Commit and remove containers once a quorum of validators agrees.
//!
//! # Overview
//!
//! A container is an opaque blob owned by a key and identified by its SHA-256 digest.
//! Containers are created ([Containers::put]) and removed ([Containers::delete]) only through
//! the [Gate]: each validator submits the same request independently and the change is applied
//! once a quorum of them did. At quorum, [Containers::put] charges the owner [Config::fee] for
//! every validator through a [Treasury]. Transfers are written to the call's [Context], so if any
//! of them fails, the whole call (including earlier transfers) is aborted and the ballot stays in
//! place.
//!
//! Storage nodes also report per-epoch size estimations of the containers they store (see
//! [Containers::put_container_size]). Estimation windows are opened and closed by the validators
//! ([Containers::start_estimation], [Containers::stop_estimation]) and stale estimations are
//! discarded by [Containers::process_epoch].

use crate::{
    authority::{Validators, Witness},
    context::{Context, Event},
    gate::{self, Gate, Status},
    store::Store,
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{
    Decode, DecodeExt, Encode, EncodeSize, Error as CodecError, Read, ReadRangeExt, Write,
};
use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Hasher, PublicKey,
};
use prometheus_client::registry::Registry;
use std::marker::PhantomData;
use tracing::{debug, info};

mod estimation;

const CONTAINER: &[u8] = b"container/";

/// Default number of epochs an estimation is retained for.
pub const DEFAULT_CLEANUP_DELTA: u64 = 3;

/// Configuration for [Containers].
#[derive(Clone, Debug)]
pub struct Config {
    /// Configuration of the gate that guards every validator action.
    pub gate: gate::Config,

    /// Amount charged to the owner of a new container for each validator.
    pub fee: u64,

    /// Number of epochs an estimation is retained for after the epoch it describes.
    pub cleanup_delta: u64,

    /// Maximum size of a container.
    pub max_container_size: usize,
}

/// Token accounting collaborator used to charge container fees.
///
/// Balances are read from and written to the `store` of the current call, so transfers are
/// committed or discarded together with the call that made them.
pub trait Treasury<P: PublicKey> {
    /// Returns the spendable balance of `account`.
    fn balance(&self, store: &impl Store, account: &P) -> Result<u64, Error>;

    /// Move `amount` from `from` to `to`, returning false if the transfer was refused.
    fn transfer(
        &mut self,
        store: &mut impl Store,
        from: &P,
        to: &P,
        amount: u64,
    ) -> Result<bool, Error>;
}

/// A stored container.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Record<P: PublicKey> {
    owner: P,
    data: Vec<u8>,
}

impl<P: PublicKey> Write for Record<P> {
    fn write(&self, buf: &mut impl BufMut) {
        self.owner.write(buf);
        self.data.write(buf);
    }
}

impl<P: PublicKey> Read for Record<P> {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_size: &usize) -> Result<Self, CodecError> {
        let owner = P::read(buf)?;
        let data = Vec::<u8>::read_range(buf, ..=*max_size)?;
        Ok(Self { owner, data })
    }
}

impl<P: PublicKey> EncodeSize for Record<P> {
    fn encode_size(&self) -> usize {
        self.owner.encode_size() + self.data.encode_size()
    }
}

/// Returns the identifier of `container`.
pub fn id(container: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(container);
    hasher.finalize()
}

fn key(id: &Digest) -> Vec<u8> {
    let mut key = CONTAINER.to_vec();
    key.extend_from_slice(id.as_ref());
    key
}

/// The container registry.
pub struct Containers<P: PublicKey> {
    cfg: Config,
    gate: Gate<Sha256>,
    _key: PhantomData<P>,
}

impl<P: PublicKey> Containers<P> {
    /// Create a handle to the container registry, registering its metrics with `registry`.
    pub fn new(registry: &mut Registry, cfg: Config) -> Self {
        let gate = Gate::new(registry.sub_registry_with_prefix("gate"), cfg.gate.clone());
        Self {
            cfg,
            gate,
            _key: PhantomData,
        }
    }

    fn record(&self, store: &impl Store, id: &Digest) -> Result<Option<Record<P>>, Error> {
        let Some(raw) = store.get(&key(id)) else {
            return Ok(None);
        };
        Ok(Some(Record::decode_cfg(
            raw.as_slice(),
            &self.cfg.max_container_size,
        )?))
    }

    /// Vote to store `container` on behalf of `owner`.
    ///
    /// At quorum, the owner is charged [Config::fee] for every validator and the container is
    /// stored under [id]. Fails with [Error::ActionFailed] if any transfer is refused (the call
    /// must then be dropped, which reverts the transfers already made).
    pub fn put<S, W, V, T>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        treasury: &mut T,
        owner: P,
        container: Vec<u8>,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
        T: Treasury<P>,
    {
        if container.is_empty() || container.len() > self.cfg.max_container_size {
            return Err(Error::InvalidArgument("invalid container size"));
        }
        let proposal = self.gate.proposal("put").with(&container).with(&owner);
        let fee = self.cfg.fee;
        self.gate.submit(ctx, validators, proposal, |ctx| {
            // Charge the owner
            if fee > 0 {
                let recipients = validators.validators();
                let total = fee.saturating_mul(recipients.len() as u64);
                if treasury.balance(ctx.store(), &owner)? < total {
                    return Err(Error::ActionFailed("insufficient balance for fee"));
                }
                for validator in &recipients {
                    if !treasury.transfer(ctx.store(), &owner, validator, fee)? {
                        return Err(Error::ActionFailed("fee transfer refused"));
                    }
                }
            }

            // Store the container
            let id = id(&container);
            let record = Record {
                owner: owner.clone(),
                data: container,
            };
            ctx.store().put(key(&id), record.encode().to_vec());
            info!(?id, ?owner, "stored container");
            ctx.emit(Event::ContainerPut { id, owner });
            Ok(())
        })
    }

    /// Vote to remove the container identified by `id`.
    ///
    /// Fails with [Error::NotFound] (before voting) if no such container exists.
    pub fn delete<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        id: Digest,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        if ctx.store().get(&key(&id)).is_none() {
            return Err(Error::NotFound("container"));
        }
        let proposal = self.gate.proposal("delete").with(&id);
        self.gate.submit(ctx, validators, proposal, |ctx| {
            ctx.store().delete(&key(&id));
            info!(?id, "removed container");
            ctx.emit(Event::ContainerDelete { id });
            Ok(())
        })
    }

    /// Returns the container identified by `id`, if any.
    pub fn get(&self, store: &impl Store, id: &Digest) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.record(store, id)?.map(|record| record.data))
    }

    /// Returns the owner of the container identified by `id`, if any.
    pub fn owner(&self, store: &impl Store, id: &Digest) -> Result<Option<P>, Error> {
        Ok(self.record(store, id)?.map(|record| record.owner))
    }

    /// Returns the identifiers of all containers (or only those of `owner`) in ascending order.
    pub fn list(&self, store: &impl Store, owner: Option<&P>) -> Result<Vec<Digest>, Error> {
        let mut ids = Vec::new();
        for (key, raw) in store.scan(CONTAINER) {
            let record = Record::<P>::decode_cfg(raw.as_slice(), &self.cfg.max_container_size)?;
            if owner.is_some_and(|owner| *owner != record.owner) {
                continue;
            }
            ids.push(Digest::decode(&key[CONTAINER.len()..])?);
        }
        debug!(count = ids.len(), "listed containers");
        Ok(ids)
    }
}
