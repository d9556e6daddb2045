//! Track which validators endorsed a proposal.
//!
//! A [Ballot] is stored per proposal identifier (see [Proposal]) and holds the distinct set of
//! voters that endorsed it. A voter contributes at most one vote per ballot no matter how many
//! times it calls [vote]. Ballots are created on the first vote, grow with every new distinct
//! voter, and are removed with [clear] by whoever observes quorum. A ballot that never reaches
//! quorum persists until it is explicitly [prune]d.
//!
//! # Format
//!
//! ```text
//! +---------+--------------+-----------------+-----------------------------+
//! | Version | Height (var) | Threshold (var) | Voters (len + sorted keys)  |
//! +---------+--------------+-----------------+-----------------------------+
//! ```

use crate::{store::Store, Error};
use bytes::{Buf, BufMut};
use commonware_codec::{
    varint::UInt, DecodeExt, Encode, EncodeSize, Error as CodecError, Read, ReadExt,
    ReadRangeExt, Write,
};
use commonware_cryptography::PublicKey;
use commonware_utils::hex;
use tracing::debug;

mod proposal;
pub use proposal::Proposal;

/// Prefix of every ballot key.
const PREFIX: &[u8] = b"ballot";

/// Version of the serialized [Ballot] record.
const VERSION: u8 = 0;

/// Upper bound on the number of voters decoded from a single ballot.
pub const MAX_VOTERS: usize = 1024;

/// The distinct voters that endorsed a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot<P: PublicKey> {
    height: u64,
    threshold: u64,
    voters: Vec<P>,
}

impl<P: PublicKey> Ballot<P> {
    fn new(height: u64, threshold: u64) -> Self {
        Self {
            height,
            threshold,
            voters: Vec::new(),
        }
    }

    /// Returns the number of distinct voters.
    pub fn count(&self) -> usize {
        self.voters.len()
    }

    /// Returns the voters in ascending key order.
    pub fn voters(&self) -> &[P] {
        &self.voters
    }

    /// Returns true if `voter` endorsed the ballot.
    pub fn contains(&self, voter: &P) -> bool {
        self.voters.binary_search(voter).is_ok()
    }

    /// Returns the height of the block that included the first vote.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Returns the threshold derived when the first vote was cast.
    pub fn threshold(&self) -> usize {
        self.threshold as usize
    }

    /// Add `voter`, returning false if it already voted.
    fn insert(&mut self, voter: &P) -> bool {
        match self.voters.binary_search(voter) {
            Ok(_) => false,
            Err(index) => {
                self.voters.insert(index, voter.clone());
                true
            }
        }
    }
}

impl<P: PublicKey> Write for Ballot<P> {
    fn write(&self, buf: &mut impl BufMut) {
        VERSION.write(buf);
        UInt(self.height).write(buf);
        UInt(self.threshold).write(buf);
        self.voters.write(buf);
    }
}

impl<P: PublicKey> Read for Ballot<P> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        if u8::read(buf)? != VERSION {
            return Err(CodecError::Invalid(
                "governance::ballot::Ballot",
                "unsupported version",
            ));
        }
        let height = UInt::read(buf)?.into();
        let threshold = UInt::read(buf)?.into();
        let voters = Vec::<P>::read_range(buf, ..=MAX_VOTERS)?;
        if voters.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CodecError::Invalid(
                "governance::ballot::Ballot",
                "voters not strictly ascending",
            ));
        }
        Ok(Self {
            height,
            threshold,
            voters,
        })
    }
}

impl<P: PublicKey> EncodeSize for Ballot<P> {
    fn encode_size(&self) -> usize {
        VERSION.encode_size()
            + UInt(self.height).encode_size()
            + UInt(self.threshold).encode_size()
            + self.voters.encode_size()
    }
}

fn key(id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX.len() + id.len());
    key.extend_from_slice(PREFIX);
    key.extend_from_slice(id);
    key
}

/// Returns the ballot stored for `id`, if any.
pub fn get<P: PublicKey>(store: &impl Store, id: &[u8]) -> Result<Option<Ballot<P>>, Error> {
    let Some(raw) = store.get(&key(id)) else {
        return Ok(None);
    };
    Ok(Some(Ballot::decode(raw.as_slice())?))
}

/// Register `voter` for `id` and return the resulting ballot (its [Ballot::count] is the number
/// of distinct voters) along with whether the vote was recorded.
///
/// If no ballot exists yet, one is created at `height` with `threshold` recorded as the
/// threshold in force at the first vote. A repeated vote from the same voter does not change
/// the ballot and is not an error (it is reported as not recorded).
pub fn vote<P: PublicKey>(
    store: &mut impl Store,
    id: &[u8],
    voter: &P,
    height: u64,
    threshold: usize,
) -> Result<(Ballot<P>, bool), Error> {
    let mut ballot = match get(store, id)? {
        Some(ballot) => ballot,
        None => Ballot::new(height, threshold as u64),
    };
    if !ballot.insert(voter) {
        debug!(id = %hex(id), ?voter, count = ballot.count(), "duplicate vote");
        return Ok((ballot, false));
    }
    if ballot.count() > MAX_VOTERS {
        return Err(Error::InvalidArgument("too many voters"));
    }
    store.put(key(id), ballot.encode().to_vec());
    debug!(id = %hex(id), ?voter, count = ballot.count(), "recorded vote");
    Ok((ballot, true))
}

/// Remove all recorded voters for `id`.
pub fn clear(store: &mut impl Store, id: &[u8]) {
    store.delete(&key(id));
}

/// Remove every ballot whose first vote was included before `height`, returning how many were
/// removed.
///
/// Ballots never expire on their own. This is an explicit garbage-collection pass for
/// proposals that were abandoned before reaching quorum.
pub fn prune<P: PublicKey>(store: &mut impl Store, height: u64) -> Result<usize, Error> {
    let mut stale = Vec::new();
    for (key, raw) in store.scan(PREFIX) {
        let ballot = Ballot::<P>::decode(raw.as_slice())?;
        if ballot.height() < height {
            stale.push(key);
        }
    }
    for key in &stale {
        store.delete(key);
    }
    debug!(height, pruned = stale.len(), "pruned ballots");
    Ok(stale.len())
}
