//! Change the capacity of a [Ring] without disturbing recent history.
//!
//! For every `diff < min(current, new)`, [Ring::read] returns the same value after a resize as
//! it did before. Values are relocated as opaque blobs (they are never decoded).
//!
//! # Grow
//!
//! The slots after the cursor hold the oldest values (the wrapped-around tail). They are shifted
//! forward by `new - current` (highest index first, so no value is overwritten before it is
//! moved) and the slots they vacate are deleted. The cursor does not move.
//!
//! ```text
//! current = 5, cursor = 1, new = 7
//!
//!   before: [ e5 e6 | e2 e3 e4 ]
//!   after:  [ e5 e6 | __ __ e2 e3 e4 ]
//! ```
//!
//! # Shrink
//!
//! The oldest `current - new` values are discarded. If the cursor still fits (`cursor < new`),
//! the newest part of the tail is shifted backward by `current - new`. Otherwise the `new`
//! values ending at the cursor are moved to the front and the cursor becomes `new - 1`. Either
//! way, slots `new..current` are deleted.
//!
//! ```text
//! current = 10, cursor = 6, new = 4
//!
//!   before: [ e10 e11 e12 e13 e14 e15 e16 | e7 e8 e9 ]
//!   after:  [ e13 e14 e15 e16 ]            (cursor = 3)
//! ```

use super::Ring;
use crate::{store::Store, Error};
use commonware_codec::{Encode, Read};
use tracing::info;

impl<T: Encode + Read + Default> Ring<T> {
    /// Copy the blob at slot `from` to slot `to` (deleting `to` if `from` is vacant).
    fn relocate(&self, store: &mut impl Store, from: u32, to: u32) {
        match store.get(&self.slot_key(from)) {
            Some(raw) => store.put(self.slot_key(to), raw),
            None => store.delete(&self.slot_key(to)),
        }
    }

    /// Change the number of slots to `capacity`, preserving the most recent values.
    ///
    /// Fails with [Error::InvalidArgument] if `capacity` is zero and with [Error::NoChange] if it
    /// matches the current capacity.
    pub fn resize(&self, store: &mut impl Store, capacity: u32) -> Result<(), Error> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be positive"));
        }
        let current = self.capacity(store)?;
        if capacity == current {
            return Err(Error::NoChange(capacity));
        }
        let mut cursor = self.cursor(store)?;

        // Relocate retained values and compute the vacated range
        let (start, end) = if capacity > current {
            let shift = capacity - current;
            for index in (cursor + shift + 1..capacity).rev() {
                self.relocate(store, index - shift, index);
            }
            (cursor + 1, (cursor + 1 + shift).min(current))
        } else {
            let (shift, first) = if cursor < capacity {
                (current - capacity, cursor + 1)
            } else {
                let shift = cursor - capacity + 1;
                cursor = capacity - 1;
                (shift, 0)
            };
            for index in first..capacity {
                self.relocate(store, index + shift, index);
            }
            (capacity, current)
        };
        for index in start..end {
            store.delete(&self.slot_key(index));
        }

        self.set_capacity(store, capacity);
        self.set_cursor(store, cursor);
        info!(from = current, to = capacity, cursor, "resized ring");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Memory;
    use test_case::test_case;

    fn ring() -> Ring<u64> {
        Ring::new(b"ring", ())
    }

    /// Initialize a ring of `capacity` and write values `1..=writes`.
    fn filled(capacity: u32, writes: u64) -> (Memory, Ring<u64>) {
        let mut store = Memory::new();
        let ring = ring();
        ring.init(&mut store, capacity).unwrap();
        for value in 1..=writes {
            ring.write(&mut store, &value).unwrap();
        }
        (store, ring)
    }

    fn window(store: &Memory, ring: &Ring<u64>) -> Vec<u64> {
        let capacity = ring.capacity(store).unwrap() as u64;
        (0..capacity).map(|diff| ring.read(store, diff).unwrap()).collect()
    }

    #[test]
    fn test_resize_preserves_recent_window() {
        // Every capacity, cursor position, and target capacity in a small domain
        for capacity in 1..=6u32 {
            for writes in 0..(2 * capacity as u64) {
                for target in 1..=7u32 {
                    if target == capacity {
                        continue;
                    }
                    let (mut store, ring) = filled(capacity, writes);
                    let before = window(&store, &ring);

                    ring.resize(&mut store, target).unwrap();
                    let after = window(&store, &ring);

                    let retained = capacity.min(target) as usize;
                    assert_eq!(
                        after[..retained],
                        before[..retained],
                        "capacity={capacity} writes={writes} target={target}"
                    );
                    assert!(
                        after[retained..].iter().all(|value| *value == 0),
                        "capacity={capacity} writes={writes} target={target}"
                    );
                    assert!(ring.cursor(&store).unwrap() < target);
                    assert!(store.scan(b"ring/slot/").len() <= target as usize);

                    // Writes continue from the preserved window
                    ring.write(&mut store, &100).unwrap();
                    assert_eq!(ring.current(&store).unwrap(), 100);
                    if retained > 1 {
                        assert_eq!(ring.read(&store, 1).unwrap(), before[0]);
                    }
                }
            }
        }
    }

    #[test_case(3, 5; "grow by two")]
    #[test_case(4, 5; "grow by one")]
    #[test_case(1, 6; "grow from one")]
    #[test_case(10, 15; "grow after wrap")]
    fn test_grow_then_shrink_round_trip(capacity: u32, target: u32) {
        for writes in 0..(2 * capacity as u64) {
            let (mut store, ring) = filled(capacity, writes);
            let before = window(&store, &ring);

            ring.resize(&mut store, target).unwrap();
            ring.resize(&mut store, capacity).unwrap();
            assert_eq!(window(&store, &ring), before, "writes={writes}");
        }
    }

    #[test]
    fn test_shrink_with_cursor_beyond_new_capacity() {
        // 16 writes into 10 slots leave the cursor at 6
        let (mut store, ring) = filled(10, 16);
        assert_eq!(ring.cursor(&store).unwrap(), 6);
        let before = window(&store, &ring);

        ring.resize(&mut store, 4).unwrap();
        assert_eq!(ring.cursor(&store).unwrap(), 3);
        assert_eq!(ring.capacity(&store).unwrap(), 4);
        assert_eq!(window(&store, &ring), before[..4]);
        assert_eq!(window(&store, &ring), vec![16, 15, 14, 13]);
    }

    #[test]
    fn test_shrink_with_cursor_within_new_capacity() {
        // 12 writes into 10 slots leave the cursor at 2
        let (mut store, ring) = filled(10, 12);
        assert_eq!(ring.cursor(&store).unwrap(), 2);

        ring.resize(&mut store, 4).unwrap();
        assert_eq!(ring.cursor(&store).unwrap(), 2);
        assert_eq!(window(&store, &ring), vec![12, 11, 10, 9]);
    }

    #[test]
    fn test_grow_leaves_older_slots_empty() {
        let (mut store, ring) = filled(5, 6);
        assert_eq!(ring.cursor(&store).unwrap(), 1);

        ring.resize(&mut store, 7).unwrap();
        assert_eq!(ring.cursor(&store).unwrap(), 1);
        assert_eq!(window(&store, &ring), vec![6, 5, 4, 3, 2, 0, 0]);
    }

    #[test]
    fn test_resize_rejects_invalid_capacity() {
        let (mut store, ring) = filled(4, 2);
        assert!(matches!(
            ring.resize(&mut store, 4),
            Err(Error::NoChange(4))
        ));
        assert!(matches!(
            ring.resize(&mut store, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(window(&store, &ring), vec![2, 1, 0, 0]);
    }

    #[test]
    fn test_resize_requires_init() {
        let mut store = Memory::new();
        assert!(matches!(
            ring().resize(&mut store, 3),
            Err(Error::NotInitialized(_))
        ));
    }
}
