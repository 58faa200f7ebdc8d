//! Table growth and shrinking.
//!
//! Growth adds a fixed `grow_step` rather than doubling, to bound the slack a
//! small device carries. Shrinking removes `shrink_step` entries once more
//! than `shrink_step` slots are idle. `shrink_step > grow_step`, so one
//! allocation across a boundary cannot make the table oscillate.

use crate::error::TrackerError;
use crate::raw::RawAllocator;
use crate::table::AllocationTable;

impl<A: RawAllocator> AllocationTable<A> {
    /// Add one growth step of empty slots.
    pub fn grow(&mut self) -> Result<(), TrackerError> {
        let from = self.table_size();
        let to = from
            .checked_add(self.policy.grow_step)
            .ok_or(TrackerError::TableReallocation { from, to: usize::MAX })?;
        self.resize(to)?;
        self.counters.grows += 1;
        tracing::debug!(from, to, live_count = self.live_count, "grew allocation table");
        Ok(())
    }

    /// Whether the idle slots justify dropping a shrink step without going
    /// below the minimum size.
    ///
    /// The decision follows the live count. After an untracked free that
    /// count can undercount the occupied slots, so the step is skipped when
    /// the occupied slots would not fit in the smaller table.
    pub fn should_shrink(&self) -> bool {
        let size = self.table_size();
        if size.saturating_sub(self.live_count) <= self.policy.shrink_step {
            return false;
        }
        match size.checked_sub(self.policy.shrink_step) {
            Some(shrunk) if shrunk >= self.policy.min_table_size => {
                self.valid_count() <= shrunk
            }
            _ => false,
        }
    }

    /// Shrink by one step if [`Self::should_shrink`]. Returns whether it did.
    pub fn maybe_shrink(&mut self) -> Result<bool, TrackerError> {
        if !self.should_shrink() {
            return Ok(false);
        }
        let from = self.table_size();
        let to = from - self.policy.shrink_step;
        self.resize(to)?;
        self.counters.shrinks += 1;
        tracing::debug!(from, to, live_count = self.live_count, "shrank allocation table");
        Ok(true)
    }

    /// Reallocate the table to `new_size` entries, compacting first when
    /// shrinking. Resizing to the current size does nothing.
    pub fn resize(&mut self, new_size: usize) -> Result<(), TrackerError> {
        if new_size < self.policy.min_table_size {
            return Err(TrackerError::BelowMinimumSize {
                requested: new_size,
                minimum: self.policy.min_table_size,
            });
        }
        let size = self.table_size();
        if new_size == size {
            return Ok(());
        }

        if new_size < size {
            self.defragment();
            if let Some(offset) = self.slots()[new_size..].iter().position(Option::is_some) {
                return Err(TrackerError::ShrinkWouldDiscard {
                    requested: new_size,
                    slot: new_size + offset,
                });
            }
        }

        self.slots.reallocate(new_size)?;
        self.counters.reallocations += 1;
        self.counters.peak_table_size = self.counters.peak_table_size.max(new_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TrackerError;
    use crate::table::tests::{address, policy, record, table};
    use proptest::prelude::*;

    fn fill(t: &mut crate::table::AllocationTable<crate::raw::SystemAllocator>, count: usize) {
        for n in 0..count {
            t.insert(record((n + 1) * 0x10, 4, b"AAAA")).unwrap();
        }
    }

    #[test]
    fn full_table_grows_by_one_step() {
        let mut t = table(64, policy(32, 32, 64));
        fill(&mut t, 64);
        assert_eq!(t.table_size(), 64);
        assert_eq!(t.counters().grows, 0);

        t.insert(record(0x10_0000, 4, b"AAAA")).unwrap();
        assert_eq!(t.table_size(), 96);
        assert_eq!(t.counters().grows, 1);
        assert_eq!(t.live_count(), 65);
        assert_eq!(t.find_empty_slot(), Some(65));
    }

    #[test]
    fn zero_grow_step_violates_growth_invariant() {
        let mut t = table(2, policy(2, 0, 4));
        fill(&mut t, 2);
        assert!(matches!(
            t.insert(record(0x999, 4, b"AAAA")),
            Err(TrackerError::GrowthInvariant { table_size: 2 })
        ));
        assert_eq!(t.live_count(), 2);
    }

    #[test]
    fn shrink_waits_for_threshold_then_drops_one_step() {
        let mut t = table(64, policy(32, 32, 64));
        fill(&mut t, 96);
        assert_eq!(t.table_size(), 96);

        // Free from the front so the survivors end up fragmented.
        for n in 0..64 {
            t.remove(address((n + 1) * 0x10)).unwrap();
            assert_eq!(t.table_size(), 96, "live count {}", t.live_count());
        }
        assert_eq!(t.live_count(), 32);

        t.remove(address(65 * 0x10)).unwrap();
        assert_eq!(t.live_count(), 31);
        assert_eq!(t.table_size(), 32);
        assert_eq!(t.counters().shrinks, 1);
        assert!(t.counters().defrag_moves > 0);

        for n in 65..76 {
            t.remove(address((n + 1) * 0x10)).unwrap();
        }
        assert_eq!(t.live_count(), 20);
        assert_eq!(t.table_size(), 32);
        assert_eq!(t.counters().shrinks, 1);

        for n in 76..96 {
            assert!(t.find(address((n + 1) * 0x10)).is_some());
        }
    }

    #[test]
    fn undercounted_table_waits_until_records_fit() {
        let mut t = table(96, policy(32, 32, 64));
        fill(&mut t, 96);
        for n in 0..63 {
            t.remove(address((n + 1) * 0x10)).unwrap();
        }
        assert_eq!(t.live_count(), 33);

        // Two frees of addresses the table never held.
        assert_eq!(t.remove(address(0xdead0)).unwrap(), None);
        assert_eq!(t.remove(address(0xbeef0)).unwrap(), None);
        assert_eq!(t.live_count(), 31);
        assert_eq!(t.valid_count(), 33);
        assert!(!t.should_shrink());
        assert_eq!(t.table_size(), 96);
        assert_eq!(t.counters().shrinks, 0);
        assert_eq!(t.counters().failed_shrinks, 0);

        t.remove(address(64 * 0x10)).unwrap();
        assert_eq!(t.valid_count(), 32);
        assert_eq!(t.table_size(), 32);
        assert_eq!(t.counters().shrinks, 1);
        for n in 64..96 {
            assert!(t.find(address((n + 1) * 0x10)).is_some());
        }
    }

    #[test]
    fn shrink_never_goes_below_minimum() {
        let mut t = table(40, policy(32, 4, 8));
        fill(&mut t, 2);
        t.remove(address(0x10)).unwrap();
        assert_eq!(t.table_size(), 32);
        t.remove(address(0x20)).unwrap();
        assert_eq!(t.table_size(), 32);
        assert!(!t.should_shrink());
    }

    #[test]
    fn resize_to_current_size_is_a_no_op() {
        let mut t = table(32, policy(32, 32, 64));
        fill(&mut t, 3);
        t.remove(address(0x10)).unwrap();
        let before: Vec<_> = t.slots().to_vec();
        let counters = t.counters();

        t.resize(32).unwrap();

        assert_eq!(t.slots(), &before[..]);
        assert_eq!(t.counters(), counters);
        assert!(t.is_fragmented());
    }

    #[test]
    fn resize_below_minimum_is_rejected() {
        let mut t = table(32, policy(32, 32, 64));
        assert!(matches!(
            t.resize(16),
            Err(TrackerError::BelowMinimumSize {
                requested: 16,
                minimum: 32
            })
        ));
        assert_eq!(t.table_size(), 32);
    }

    #[test]
    fn shrink_refuses_to_truncate_live_records() {
        let mut t = table(8, policy(2, 2, 4));
        fill(&mut t, 5);
        assert!(matches!(
            t.resize(4),
            Err(TrackerError::ShrinkWouldDiscard {
                requested: 4,
                slot: 4
            })
        ));
        assert_eq!(t.table_size(), 8);
        assert_eq!(t.valid_count(), 5);
    }

    #[test]
    fn explicit_shrink_compacts_first() {
        let mut t = table(8, policy(2, 2, 8));
        fill(&mut t, 6);
        for addr in [0x10, 0x20, 0x30] {
            t.remove(address(addr)).unwrap();
        }
        t.resize(4).unwrap();
        let kept: Vec<usize> = t.records().map(|r| r.addr()).collect();
        assert_eq!(kept, vec![0x40, 0x50, 0x60]);
    }

    proptest! {
        #[test]
        fn live_records_survive_any_free_order(order in Just((1..=80usize).collect::<Vec<_>>()).prop_shuffle()) {
            let mut t = table(32, policy(32, 16, 24));
            fill(&mut t, 80);
            for (done, n) in order.iter().enumerate() {
                t.remove(address(n * 0x10)).unwrap();
                let remaining = &order[done + 1..];
                prop_assert_eq!(t.live_count(), remaining.len());
                prop_assert!(t.table_size() >= 32);
                for m in remaining {
                    prop_assert!(t.find(address(m * 0x10)).is_some());
                }
            }
        }
    }
}
