//! Execute quorum-gated actions and retain epoch-indexed history over a shared ledger.
//!
//! # Overview
//!
//! Validators of a decentralized network (the "Inner Ring" or "Alphabet") coordinate without
//! exchanging messages: every validator independently submits the same call to a shared,
//! serialized ledger and agreement emerges from state visible to all of them. This crate
//! provides the primitives that make that work:
//!
//! - [ballot]: per-proposal sets of distinct voters.
//! - [gate]: a quorum-gated action that executes exactly once after `⌊2n/3⌋ + 1` distinct
//!   validators submit identical arguments.
//! - [ring]: a fixed-capacity ring of epoch snapshots addressed by "epochs back", with online
//!   capacity resize.
//! - [netmap]: the candidate set, epoch transitions, and network map history.
//! - [container] and [alphabet]: the gated actions built on top of [gate].
//!
//! All persistent state lives in a [store::Store] passed explicitly to every operation. Each
//! call runs inside a [context::Context] that is either committed as a whole or dropped.
//!
//! # Status
//!
//! `commonware-governance` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

pub mod alphabet;
pub mod authority;
pub mod ballot;
pub mod container;
pub mod context;
pub mod gate;
pub mod netmap;
pub mod ring;
pub mod store;
pub mod types;

pub use types::{quorum, Epoch};

use thiserror::Error;

/// Errors that can occur when interacting with governance primitives.
#[derive(Debug, Error)]
pub enum Error {
    #[error("caller is not authorized")]
    Unauthorized,
    #[error("stale epoch: requested {1}, current {0}")]
    StaleEpoch(Epoch, Epoch),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("capacity has not changed: {0}")]
    NoChange(u32),
    #[error("diff {0} out of range for capacity {1}")]
    OutOfRange(u64, u32),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("action failed: {0}")]
    ActionFailed(&'static str),
}
