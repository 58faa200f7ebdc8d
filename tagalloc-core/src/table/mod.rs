//! ## tagalloc-core::table
//! **The tracked allocation table**
//!
//! A fixed number of slots in one buffer from the raw allocator. Each slot
//! holds a [`TrackedAllocation`] or is empty. Slots are reused first-fit; the
//! table grows by a fixed step when full and shrinks (after compaction) once
//! enough slots sit idle.
//!
//! Nothing in here locks. Every method takes `&self` or `&mut self` and the
//! caller is expected to hold the [`ConcurrencyGuard`](crate::guard::ConcurrencyGuard).
//!
//! ### Submodules:
//! - `buffer`: raw slot storage
//! - `defrag`: in-place compaction
//! - `resize`: growth, shrinking and hysteresis

use std::ptr::NonNull;

use serde::Serialize;
use tagalloc_config::TrackerConfig;

use crate::error::TrackerError;
use crate::raw::RawAllocator;
use crate::record::{Slot, TrackedAllocation};

pub mod buffer;
pub mod defrag;
pub mod resize;

use buffer::SlotBuffer;

/// Sizing rules the table enforces on itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TablePolicy {
    pub min_table_size: usize,
    pub grow_step: usize,
    pub shrink_step: usize,
}

impl From<&TrackerConfig> for TablePolicy {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            min_table_size: config.min_table_size,
            grow_step: config.grow_step,
            shrink_step: config.shrink_step,
        }
    }
}

/// Running totals of table maintenance work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResizeCounters {
    pub grows: u64,
    pub shrinks: u64,
    pub reallocations: u64,
    pub defrag_moves: u64,
    /// Shrinks abandoned because the reallocation failed.
    pub failed_shrinks: u64,
    pub peak_table_size: usize,
    pub peak_live_count: usize,
}

pub struct AllocationTable<A: RawAllocator> {
    slots: SlotBuffer<A>,
    live_count: usize,
    policy: TablePolicy,
    counters: ResizeCounters,
}

impl<A: RawAllocator> AllocationTable<A> {
    pub fn new(
        initial_size: usize,
        policy: TablePolicy,
        allocator: A,
    ) -> Result<Self, TrackerError> {
        if initial_size < policy.min_table_size {
            return Err(TrackerError::BelowMinimumSize {
                requested: initial_size,
                minimum: policy.min_table_size,
            });
        }
        Ok(Self {
            slots: SlotBuffer::with_len(initial_size, allocator)?,
            live_count: 0,
            policy,
            counters: ResizeCounters {
                peak_table_size: initial_size,
                ..ResizeCounters::default()
            },
        })
    }

    pub fn from_config(config: &TrackerConfig, allocator: A) -> Result<Self, TrackerError> {
        Self::new(config.initial_table_size, config.into(), allocator)
    }

    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    /// Size of the slot buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.slots.byte_len()
    }

    /// The externally visible allocation count.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn policy(&self) -> &TablePolicy {
        &self.policy
    }

    pub fn counters(&self) -> ResizeCounters {
        self.counters
    }

    pub fn slots(&self) -> &[Slot] {
        self.slots.as_slice()
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackedAllocation> {
        self.slots().iter().flatten()
    }

    /// Number of occupied slots, by scanning. Equals [`Self::live_count`]
    /// unless an untracked address was freed.
    pub fn valid_count(&self) -> usize {
        self.records().count()
    }

    /// Sum of the sizes of all occupied slots.
    pub fn total_size(&self) -> usize {
        self.records().map(|r| r.size).sum()
    }

    pub fn find_empty_slot(&self) -> Option<usize> {
        self.slots().iter().position(Option::is_none)
    }

    pub fn find(&self, address: NonNull<u8>) -> Option<usize> {
        self.slots()
            .iter()
            .position(|slot| matches!(slot, Some(r) if r.address == address))
    }

    /// Store `record` in the first empty slot, growing the table if it is
    /// full. Returns the slot index.
    pub fn insert(&mut self, record: TrackedAllocation) -> Result<usize, TrackerError> {
        if record.size == 0 {
            return Err(TrackerError::ZeroSizedRecord);
        }

        let index = match self.find_empty_slot() {
            Some(index) => index,
            None => {
                self.grow()?;
                self.find_empty_slot()
                    .ok_or(TrackerError::GrowthInvariant {
                        table_size: self.table_size(),
                    })?
            }
        };

        self.slots.as_mut_slice()[index] = Some(record);
        self.live_count += 1;
        self.counters.peak_live_count = self.counters.peak_live_count.max(self.live_count);
        tracing::trace!(
            slot = index,
            tag = %record.tag,
            size = record.size,
            address = format_args!("{:#x}", record.addr()),
            "tracked allocation"
        );
        Ok(index)
    }

    /// Clear the slot holding `address`, then shrink if enough of the table
    /// is idle.
    ///
    /// The live count drops by one even when no slot matches. Freeing an
    /// address the table never saw therefore makes [`Self::live_count`]
    /// disagree with [`Self::valid_count`].
    ///
    /// A failed shrink does not fail the removal: the record is already gone
    /// and the table keeps its current size.
    pub fn remove(
        &mut self,
        address: NonNull<u8>,
    ) -> Result<Option<TrackedAllocation>, TrackerError> {
        let removed = self
            .find(address)
            .and_then(|index| self.slots.as_mut_slice()[index].take());

        self.live_count = self.live_count.saturating_sub(1);

        match &removed {
            Some(record) => tracing::trace!(
                tag = %record.tag,
                size = record.size,
                address = format_args!("{:#x}", record.addr()),
                "released allocation"
            ),
            None => tracing::warn!(
                address = format_args!("{:#x}", address.as_ptr() as usize),
                live_count = self.live_count,
                "freed an untracked address; live count decremented anyway"
            ),
        }

        if let Err(error) = self.maybe_shrink() {
            self.counters.failed_shrinks += 1;
            tracing::warn!(
                %error,
                table_size = self.table_size(),
                live_count = self.live_count,
                "shrink skipped"
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::raw::SystemAllocator;
    use crate::tag::Tag;

    pub(crate) fn address(addr: usize) -> NonNull<u8> {
        NonNull::new(addr as *mut u8).expect("test addresses are non-zero")
    }

    pub(crate) fn record(addr: usize, size: usize, tag: &[u8; 4]) -> TrackedAllocation {
        #[cfg(feature = "timestamps")]
        return TrackedAllocation::new(
            address(addr),
            size,
            Tag::from(tag),
            std::time::Duration::ZERO,
        );
        #[cfg(not(feature = "timestamps"))]
        return TrackedAllocation::new(address(addr), size, Tag::from(tag));
    }

    pub(crate) fn policy(min: usize, grow: usize, shrink: usize) -> TablePolicy {
        TablePolicy {
            min_table_size: min,
            grow_step: grow,
            shrink_step: shrink,
        }
    }

    pub(crate) fn table(initial: usize, policy: TablePolicy) -> AllocationTable<SystemAllocator> {
        AllocationTable::new(initial, policy, SystemAllocator).unwrap()
    }

    #[test]
    fn empty_slots_are_found_first_fit() {
        let mut t = table(4, policy(4, 2, 4));
        assert_eq!(t.find_empty_slot(), Some(0));
        t.insert(record(0x10, 8, b"AAAA")).unwrap();
        t.insert(record(0x20, 8, b"AAAA")).unwrap();
        assert_eq!(t.find_empty_slot(), Some(2));

        t.remove(address(0x10)).unwrap();
        assert_eq!(t.find_empty_slot(), Some(0));
    }

    #[test]
    fn insert_reuses_freed_slot() {
        let mut t = table(4, policy(4, 2, 4));
        t.insert(record(0x10, 8, b"AAAA")).unwrap();
        t.insert(record(0x20, 8, b"BBBB")).unwrap();
        t.remove(address(0x10)).unwrap();
        assert_eq!(t.insert(record(0x30, 8, b"CCCC")).unwrap(), 0);
        assert_eq!(t.live_count(), 2);
    }

    #[test]
    fn zero_sized_record_is_rejected() {
        let mut t = table(4, policy(4, 2, 4));
        assert!(matches!(
            t.insert(record(0x10, 0, b"AAAA")),
            Err(TrackerError::ZeroSizedRecord)
        ));
        assert_eq!(t.live_count(), 0);
    }

    #[test]
    fn initial_size_below_minimum_is_rejected() {
        assert!(matches!(
            AllocationTable::new(8, policy(16, 8, 16), SystemAllocator),
            Err(TrackerError::BelowMinimumSize {
                requested: 8,
                minimum: 16
            })
        ));
    }

    #[test]
    fn remove_returns_the_record() {
        let mut t = table(4, policy(4, 2, 4));
        let r = record(0x40, 12, b"RMVE");
        t.insert(r).unwrap();
        assert_eq!(t.remove(address(0x40)).unwrap(), Some(r));
        assert_eq!(t.live_count(), 0);
        assert_eq!(t.valid_count(), 0);
    }

    #[test]
    fn unmatched_remove_still_decrements_live_count() {
        let mut t = table(4, policy(4, 2, 4));
        t.insert(record(0x10, 8, b"AAAA")).unwrap();
        t.insert(record(0x20, 8, b"BBBB")).unwrap();

        assert_eq!(t.remove(address(0xdead0)).unwrap(), None);

        // Known discrepancy: the count no longer matches the occupied slots.
        assert_eq!(t.live_count(), 1);
        assert_eq!(t.valid_count(), 2);
    }

    #[test]
    fn unmatched_remove_on_empty_table_does_not_wrap() {
        let mut t = table(4, policy(4, 2, 4));
        assert_eq!(t.remove(address(0x10)).unwrap(), None);
        assert_eq!(t.live_count(), 0);
    }

    #[test]
    fn total_size_ignores_slot_order() {
        let mut t = table(4, policy(4, 2, 4));
        t.insert(record(0x10, 16, b"TAGA")).unwrap();
        t.insert(record(0x20, 32, b"TAGB")).unwrap();
        t.insert(record(0x30, 64, b"TAGC")).unwrap();
        t.remove(address(0x10)).unwrap();
        assert_eq!(t.total_size(), 96);
    }

    #[test]
    fn tags_are_kept_verbatim() {
        let mut t = table(4, policy(4, 2, 4));
        t.insert(record(0x10, 4, b"\0\x01AB")).unwrap();
        let stored = t.records().next().unwrap();
        assert_eq!(stored.tag.as_bytes(), b"\0\x01AB");
    }
}
