//! Types shared across governance primitives.
//!
//! - [`Epoch`]: A discrete, monotonically increasing logical time unit over which network
//!   topology is snapshotted.
//!
//! - [`quorum`]: The minimum number of distinct validators required to approve a gated action.

use bytes::{Buf, BufMut};
use commonware_codec::{varint::UInt, EncodeSize, Error, Read, ReadExt, Write};
use std::fmt::{self, Display, Formatter};

/// A discrete, monotonically increasing logical time unit.
///
/// Explicit construction with [Epoch::new] is required to create an instance from a raw
/// integer. Implicit conversions are not provided to prevent mixing epochs with other counters
/// (block heights, snapshot diffs).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// Returns epoch zero.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Creates a new epoch from a u64 value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying u64 value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next epoch.
    ///
    /// # Panics
    ///
    /// Panics if the epoch would overflow u64::MAX.
    pub fn next(self) -> Self {
        Self(self.0.checked_add(1).expect("epoch overflow"))
    }

    /// Returns the previous epoch, or `None` if this is epoch zero.
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// Returns how many epochs `earlier` lies behind `self`, or `None` if `earlier` is in the
    /// future.
    pub fn distance(self, earlier: Self) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Write for Epoch {
    fn write(&self, buf: &mut impl BufMut) {
        UInt(self.0).write(buf);
    }
}

impl Read for Epoch {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let value: u64 = UInt::read(buf)?.into();
        Ok(Self(value))
    }
}

impl EncodeSize for Epoch {
    fn encode_size(&self) -> usize {
        UInt(self.0).encode_size()
    }
}

/// Compute the minimum number of distinct approvals required from a set of `n` validators:
/// `⌊2n/3⌋ + 1`.
///
/// Unlike a `3f + 1` fault threshold, this is defined for every `n` (including sets too small to
/// tolerate a fault), so a single validator can always approve its own proposals.
pub fn quorum(n: usize) -> usize {
    n * 2 / 3 + 1
}
