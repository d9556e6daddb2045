//! A fixed-capacity ring of values addressed by "epochs back".
//!
//! # Layout
//!
//! A [Ring] occupies three kinds of keys below its prefix:
//!
//! ```text
//! <prefix>/capacity        -> u32 (number of slots)
//! <prefix>/cursor          -> u32 (slot holding the most recent value)
//! <prefix>/slot/<u32 BE>   -> T
//! ```
//!
//! The slot at `cursor` holds the most recently written value and the slot at
//! `(cursor - diff + capacity) mod capacity` holds the value written `diff` writes earlier. A
//! slot that is absent from the store (never written, or vacated by [Ring::resize]) reads as
//! `T::default()`.
//!
//! Readers are expected to only ever ask for values relative to the cursor ([Ring::read]), so
//! the physical slot of a value may change across a [Ring::resize] without affecting them.

use crate::{store::Store, Error};
use commonware_codec::{Decode, DecodeExt, Encode, Read};
use std::marker::PhantomData;
use tracing::debug;

mod resize;

const CAPACITY: &[u8] = b"/capacity";
const CURSOR: &[u8] = b"/cursor";
const SLOT: &[u8] = b"/slot/";

/// A ring of `T` stored below a fixed key prefix.
pub struct Ring<T: Encode + Read + Default> {
    prefix: Vec<u8>,
    cfg: T::Cfg,
    _value: PhantomData<T>,
}

impl<T: Encode + Read + Default> Ring<T> {
    /// Create a handle to the ring stored below `prefix`. Values are decoded with `cfg`.
    pub fn new(prefix: &[u8], cfg: T::Cfg) -> Self {
        Self {
            prefix: prefix.to_vec(),
            cfg,
            _value: PhantomData,
        }
    }

    fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len() + 4);
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    fn slot_key(&self, index: u32) -> Vec<u8> {
        let mut key = self.key(SLOT);
        key.extend_from_slice(&index.to_be_bytes());
        key
    }

    /// Allocate `capacity` empty slots and place the cursor at slot 0.
    pub fn init(&self, store: &mut impl Store, capacity: u32) -> Result<(), Error> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be positive"));
        }
        let empty = T::default().encode().to_vec();
        for index in 0..capacity {
            store.put(self.slot_key(index), empty.clone());
        }
        self.set_capacity(store, capacity);
        self.set_cursor(store, 0);
        debug!(capacity, "initialized ring");
        Ok(())
    }

    /// Returns true if [Ring::init] was called on `store`.
    pub fn initialized(&self, store: &impl Store) -> bool {
        store.get(&self.key(CAPACITY)).is_some()
    }

    /// Returns the number of slots.
    pub fn capacity(&self, store: &impl Store) -> Result<u32, Error> {
        let raw = store
            .get(&self.key(CAPACITY))
            .ok_or(Error::NotInitialized("ring capacity"))?;
        Ok(u32::decode(raw.as_slice())?)
    }

    /// Returns the slot holding the most recent value.
    pub fn cursor(&self, store: &impl Store) -> Result<u32, Error> {
        let raw = store
            .get(&self.key(CURSOR))
            .ok_or(Error::NotInitialized("ring cursor"))?;
        Ok(u32::decode(raw.as_slice())?)
    }

    fn set_capacity(&self, store: &mut impl Store, capacity: u32) {
        store.put(self.key(CAPACITY), capacity.encode().to_vec());
    }

    fn set_cursor(&self, store: &mut impl Store, cursor: u32) {
        store.put(self.key(CURSOR), cursor.encode().to_vec());
    }

    /// Advance the cursor and overwrite the slot it lands on with `value`.
    pub fn write(&self, store: &mut impl Store, value: &T) -> Result<(), Error> {
        let capacity = self.capacity(store)?;
        let cursor = (self.cursor(store)? + 1) % capacity;
        store.put(self.slot_key(cursor), value.encode().to_vec());
        self.set_cursor(store, cursor);
        Ok(())
    }

    /// Returns the value written `diff` writes before the most recent one.
    ///
    /// Fails with [Error::OutOfRange] unless `diff < capacity`.
    pub fn read(&self, store: &impl Store, diff: u64) -> Result<T, Error> {
        let capacity = self.capacity(store)?;
        if diff >= capacity as u64 {
            return Err(Error::OutOfRange(diff, capacity));
        }
        let cursor = self.cursor(store)? as u64;
        let capacity = capacity as u64;
        let index = (cursor + capacity - diff) % capacity;
        match store.get(&self.slot_key(index as u32)) {
            Some(raw) => Ok(T::decode_cfg(raw.as_slice(), &self.cfg)?),
            None => Ok(T::default()),
        }
    }

    /// Returns the most recently written value.
    pub fn current(&self, store: &impl Store) -> Result<T, Error> {
        self.read(store, 0)
    }
}
