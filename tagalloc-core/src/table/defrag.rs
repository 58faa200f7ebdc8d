//! In-place compaction of the slot array.
//!
//! Shrinking truncates the buffer, so every live record has to sit below the
//! new end first. Compaction moves each record found after a hole into the
//! earliest hole until no hole precedes a record. Worst case is O(n^2) in the
//! table size; it only runs on the shrink path, where tables are small.

use crate::raw::RawAllocator;
use crate::table::AllocationTable;

impl<A: RawAllocator> AllocationTable<A> {
    /// Look for an empty slot followed by an occupied one, scanning from
    /// `start`. Returns `(first_empty, first_valid_after_it)`.
    pub fn fragmentation(&self, start: usize) -> Option<(usize, usize)> {
        let slots = self.slots();
        let first_empty = start + slots.get(start..)?.iter().position(Option::is_none)?;
        let first_valid = first_empty
            + 1
            + slots[first_empty + 1..]
                .iter()
                .position(Option::is_some)?;
        Some((first_empty, first_valid))
    }

    pub fn is_fragmented(&self) -> bool {
        self.fragmentation(0).is_some()
    }

    /// Compact all records into a contiguous prefix. Returns the number of
    /// records moved.
    pub fn defragment(&mut self) -> usize {
        let mut cursor = 0;
        let mut moves = 0;
        while let Some((empty, valid)) = self.fragmentation(cursor) {
            let slots = self.slots.as_mut_slice();
            slots[empty] = slots[valid].take();
            moves += 1;
            cursor = empty;
        }
        self.counters.defrag_moves += moves as u64;
        if moves > 0 {
            tracing::debug!(moves, table_size = self.table_size(), "defragmented table");
        }
        moves
    }
}

#[cfg(test)]
mod tests {
    use crate::table::tests::{address, policy, record, table};
    use proptest::prelude::*;

    #[test]
    fn compact_table_is_not_fragmented() {
        let mut t = table(8, policy(8, 4, 8));
        for addr in 1..=3 {
            t.insert(record(addr * 0x10, 4, b"AAAA")).unwrap();
        }
        assert!(!t.is_fragmented());
        assert_eq!(t.defragment(), 0);
    }

    #[test]
    fn fragmentation_reports_first_hole_and_next_record() {
        let mut t = table(8, policy(8, 4, 8));
        for addr in 1..=5 {
            t.insert(record(addr * 0x10, 4, b"AAAA")).unwrap();
        }
        t.remove(address(0x20)).unwrap();
        t.remove(address(0x30)).unwrap();
        assert_eq!(t.fragmentation(0), Some((1, 3)));
        assert_eq!(t.fragmentation(4), None);
        assert_eq!(t.fragmentation(8), None);
        assert_eq!(t.fragmentation(100), None);
    }

    #[test]
    fn defragment_moves_records_down_in_order() {
        let mut t = table(8, policy(8, 4, 8));
        for addr in 1..=6 {
            t.insert(record(addr * 0x10, addr, b"AAAA")).unwrap();
        }
        for addr in [0x10, 0x30, 0x40] {
            t.remove(address(addr)).unwrap();
        }

        assert_eq!(t.defragment(), 3);
        let order: Vec<usize> = t.records().map(|r| r.addr()).collect();
        assert_eq!(order, vec![0x20, 0x50, 0x60]);
        assert!(t.slots()[3..].iter().all(Option::is_none));
        assert_eq!(t.counters().defrag_moves, 3);
    }

    proptest! {
        #[test]
        fn defragment_leaves_live_prefix(occupied in proptest::collection::vec(any::<bool>(), 1..96)) {
            let size = occupied.len();
            let mut t = table(size, policy(1, 8, 1024));
            for index in 0..size {
                t.insert(record((index + 1) * 0x10, index + 1, b"PROP")).unwrap();
            }
            for (index, keep) in occupied.iter().enumerate() {
                if !keep {
                    t.remove(address((index + 1) * 0x10)).unwrap();
                }
            }
            let live = t.valid_count();
            let total = t.total_size();

            t.defragment();

            prop_assert!(t.slots()[..live].iter().all(Option::is_some));
            prop_assert!(t.slots()[live..].iter().all(Option::is_none));
            prop_assert_eq!(t.total_size(), total);
            prop_assert!(!t.is_fragmented());
        }
    }
}
