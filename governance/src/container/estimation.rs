//! Per-epoch container size estimations.
//!
//! Estimations are stored as `estimation/<epoch BE><container id><reporter>` -> `size`. A
//! reporter holds at most one estimation per container and epoch: once recorded, an estimation
//! cannot be revised.

use super::Containers;
use crate::{
    authority::{Validators, Witness},
    context::{Context, Event},
    gate::Status,
    netmap::Netmap,
    store::Store,
    types::Epoch,
    Error,
};
use commonware_codec::{DecodeExt, Encode, FixedSize};
use commonware_cryptography::{sha256::Digest, PublicKey};
use tracing::{debug, info};

const ESTIMATION: &[u8] = b"estimation/";

fn epoch_prefix(epoch: Epoch) -> Vec<u8> {
    let mut key = ESTIMATION.to_vec();
    key.extend_from_slice(&epoch.get().to_be_bytes());
    key
}

fn container_prefix(epoch: Epoch, id: &Digest) -> Vec<u8> {
    let mut key = epoch_prefix(epoch);
    key.extend_from_slice(id.as_ref());
    key
}

/// Returns the epoch encoded in an estimation key.
fn key_epoch(key: &[u8]) -> Result<Epoch, Error> {
    let raw = key
        .get(ESTIMATION.len()..ESTIMATION.len() + 8)
        .ok_or(Error::InvalidArgument("malformed estimation key"))?;
    Ok(Epoch::new(u64::decode(raw)?))
}

/// Require that `epoch` is the current epoch or the one before it.
fn estimation_window(current: Epoch, epoch: Epoch) -> Result<(), Error> {
    match current.distance(epoch) {
        Some(0) | Some(1) => Ok(()),
        _ => Err(Error::StaleEpoch(current, epoch)),
    }
}

impl<P: PublicKey> Containers<P> {
    /// Record that `reporter` estimates container `id` to occupy `size` bytes in `epoch`.
    ///
    /// The call must be authorized by `reporter`, which must be part of the previous epoch's
    /// network map snapshot (storage nodes report on the epoch they just served). Estimations are
    /// accepted for epochs no older than [super::Config::cleanup_delta]. Returns false (and
    /// changes nothing) if `reporter` already estimated `id` for `epoch`.
    pub fn put_container_size<S, W>(
        &self,
        ctx: &mut Context<'_, S, W>,
        netmap: &Netmap<P>,
        epoch: Epoch,
        id: Digest,
        size: u64,
        reporter: P,
    ) -> Result<bool, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
    {
        if !ctx.witness().check(&reporter) {
            return Err(Error::Unauthorized);
        }
        let current = netmap.epoch(ctx.store())?;
        match current.distance(epoch) {
            Some(distance) if distance <= self.cfg.cleanup_delta => {}
            _ => return Err(Error::StaleEpoch(current, epoch)),
        }
        let snapshot = netmap.snapshot(ctx.store(), 1)?;
        if !snapshot.nodes().iter().any(|node| node.key == reporter) {
            return Err(Error::Unauthorized);
        }

        let mut key = container_prefix(epoch, &id);
        key.extend_from_slice(reporter.as_ref());
        if ctx.store().get(&key).is_some() {
            debug!(%epoch, ?id, ?reporter, "estimation already recorded");
            return Ok(false);
        }
        ctx.store().put(key, size.encode().to_vec());
        debug!(%epoch, ?id, ?reporter, size, "recorded estimation");
        Ok(true)
    }

    /// Returns every estimation of container `id` for `epoch` as `(reporter, size)` pairs.
    pub fn container_size(
        &self,
        store: &impl Store,
        epoch: Epoch,
        id: &Digest,
    ) -> Result<Vec<(P, u64)>, Error> {
        let prefix = container_prefix(epoch, id);
        store
            .scan(&prefix)
            .into_iter()
            .map(|(key, raw)| -> Result<(P, u64), Error> {
                let reporter = P::decode(&key[prefix.len()..])?;
                let size = u64::decode(raw.as_slice())?;
                Ok((reporter, size))
            })
            .collect()
    }

    /// Returns the identifiers of the containers estimated in `epoch` in ascending order.
    pub fn list_container_sizes(
        &self,
        store: &impl Store,
        epoch: Epoch,
    ) -> Result<Vec<Digest>, Error> {
        let prefix = epoch_prefix(epoch);
        let mut ids: Vec<Digest> = Vec::new();
        for (key, _) in store.scan(&prefix) {
            let raw = key
                .get(prefix.len()..prefix.len() + Digest::SIZE)
                .ok_or(Error::InvalidArgument("malformed estimation key"))?;
            let id = Digest::decode(raw)?;
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Vote to open the estimation window of `epoch`.
    ///
    /// Fails with [Error::StaleEpoch] (before voting) unless `epoch` is the current or previous
    /// epoch.
    pub fn start_estimation<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        netmap: &Netmap<P>,
        epoch: Epoch,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        estimation_window(netmap.epoch(ctx.store())?, epoch)?;
        let proposal = self.gate.proposal("startEstimation").with(&epoch);
        self.gate.submit(ctx, validators, proposal, |ctx| {
            info!(%epoch, "started estimation");
            ctx.emit(Event::StartEstimation(epoch));
            Ok(())
        })
    }

    /// Vote to close the estimation window of `epoch`.
    ///
    /// Fails with [Error::StaleEpoch] (before voting) unless `epoch` is the current or previous
    /// epoch.
    pub fn stop_estimation<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        netmap: &Netmap<P>,
        epoch: Epoch,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        estimation_window(netmap.epoch(ctx.store())?, epoch)?;
        let proposal = self.gate.proposal("stopEstimation").with(&epoch);
        self.gate.submit(ctx, validators, proposal, |ctx| {
            info!(%epoch, "stopped estimation");
            ctx.emit(Event::StopEstimation(epoch));
            Ok(())
        })
    }

    /// Vote to discard the estimations that are more than [super::Config::cleanup_delta] epochs
    /// older than `epoch`.
    ///
    /// Fails with [Error::StaleEpoch] (before voting) unless `epoch` is the current epoch.
    pub fn process_epoch<S, W, V>(
        &self,
        ctx: &mut Context<'_, S, W>,
        validators: &V,
        netmap: &Netmap<P>,
        epoch: Epoch,
    ) -> Result<Status, Error>
    where
        S: Store,
        W: Witness<PublicKey = P>,
        V: Validators<P>,
    {
        let current = netmap.epoch(ctx.store())?;
        if epoch != current {
            return Err(Error::StaleEpoch(current, epoch));
        }
        let proposal = self.gate.proposal("processEpoch").with(&epoch);
        let delta = self.cfg.cleanup_delta;
        self.gate.submit(ctx, validators, proposal, |ctx| {
            let mut stale = Vec::new();
            for (key, _) in ctx.store().scan(ESTIMATION) {
                let estimated = key_epoch(&key)?;
                if epoch.distance(estimated).is_some_and(|distance| distance > delta) {
                    stale.push(key);
                }
            }
            for key in &stale {
                ctx.store().delete(key);
            }
            let removed = stale.len();
            info!(%epoch, removed, "processed epoch");
            ctx.emit(Event::EpochProcessed { epoch, removed });
            Ok(())
        })
    }
}
