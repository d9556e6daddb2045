//! Persist opaque values under byte keys.
//!
//! [Store] is the only view of persistent state available to governance primitives. It is
//! supplied explicitly to every operation (there is no ambient storage context) and is assumed
//! to be accessed by a single, serialized transaction at a time.
//!
//! [Memory] is an ordered in-memory implementation. [Batch] buffers changes on top of any
//! [Store] so that a transaction can be applied atomically (with [Batch::write]) or discarded
//! (by dropping it).

use std::collections::BTreeMap;

/// A key-value store holding opaque, serialized blobs.
pub trait Store {
    /// Returns the value stored at `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Stores `value` at `key`, overwriting any previous value.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Removes `key`. Removing a missing key is a no-op.
    fn delete(&mut self, key: &[u8]);

    /// Returns all key-value pairs whose key starts with `prefix`, in ascending key order.
    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// Iterate over the entries of an ordered map that start with `prefix`.
fn prefixed<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a V)> + 'a {
    map.range(prefix.to_vec()..)
        .take_while(move |(key, _)| key.starts_with(prefix))
}

/// An in-memory [Store] backed by an ordered map.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Memory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for Memory {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        prefixed(&self.entries, prefix)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// A set of changes that may be written to an underlying [Store] with [Batch::write].
///
/// Puts and deletes are not applied to the store until the batch is written but are reflected
/// in reads (including scans) from the batch.
pub struct Batch<'a, S: Store> {
    /// The underlying store.
    store: &'a mut S,

    /// The diff of changes to the store.
    ///
    /// If the value is Some, the key is being created or updated.
    /// If the value is None, the key is being deleted.
    ///
    /// We use a BTreeMap instead of HashMap to allow for a deterministic iteration order.
    diff: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: Store> Batch<'a, S> {
    /// Returns a new, empty batch over `store`.
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            diff: BTreeMap::new(),
        }
    }

    /// Returns the number of keys changed by the batch.
    pub fn len(&self) -> usize {
        self.diff.len()
    }

    /// Returns true if the batch contains no changes.
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// Apply all changes to the underlying store.
    pub fn write(self) {
        for (key, value) in self.diff {
            match value {
                Some(value) => self.store.put(key, value),
                None => self.store.delete(&key),
            }
        }
    }
}

impl<S: Store> Store for Batch<'_, S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(value) = self.diff.get(key) {
            return value.clone();
        }
        self.store.get(key)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.diff.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.diff.insert(key.to_vec(), None);
    }

    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan(prefix).into_iter().collect();
        for (key, value) in prefixed(&self.diff, prefix) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}
