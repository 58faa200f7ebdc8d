//! ## tagalloc-core::stats
//! **Locked snapshots and the allocation dump**
//!
//! Counting and summing happen under the table lock. A dump copies the whole
//! slot array under the lock and does all scanning and formatting on the copy
//! afterwards, so printing over a slow channel never holds up allocators.

use std::io::{self, Write};
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::raw::RawAllocator;
use crate::record::{Slot, TrackedAllocation};
use crate::table::{AllocationTable, ResizeCounters};
use crate::tag::Tag;

/// Aggregate figures from one locked pass over the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub live_count: usize,
    /// Occupied slots by scan; differs from `live_count` only after an
    /// untracked free.
    pub valid_count: usize,
    pub total_size: usize,
    pub table_size: usize,
    pub table_bytes: usize,
    pub counters: ResizeCounters,
}

impl TrackerStats {
    pub(crate) fn capture<A: RawAllocator>(table: &AllocationTable<A>) -> Self {
        Self {
            live_count: table.live_count(),
            valid_count: table.valid_count(),
            total_size: table.total_size(),
            table_size: table.table_size(),
            table_bytes: table.byte_len(),
            counters: table.counters(),
        }
    }
}

/// A point-in-time copy of the whole table.
#[derive(Clone, Debug)]
pub struct TableSnapshot {
    slots: Vec<Slot>,
    live_count: usize,
    table_bytes: usize,
    counters: ResizeCounters,
    taken_at: Duration,
}

impl TableSnapshot {
    pub(crate) fn capture<A: RawAllocator>(table: &AllocationTable<A>, taken_at: Duration) -> Self {
        Self {
            slots: table.slots().to_vec(),
            live_count: table.live_count(),
            table_bytes: table.byte_len(),
            counters: table.counters(),
            taken_at,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    pub fn table_bytes(&self) -> usize {
        self.table_bytes
    }

    pub fn counters(&self) -> ResizeCounters {
        self.counters
    }

    /// Clock reading when the copy was taken.
    pub fn taken_at(&self) -> Duration {
        self.taken_at
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackedAllocation> {
        self.slots.iter().flatten()
    }

    pub fn total_size(&self) -> usize {
        self.records().map(|r| r.size).sum()
    }

    /// How long `record` had been live when the snapshot was taken.
    #[cfg(feature = "timestamps")]
    pub fn age(&self, record: &TrackedAllocation) -> Duration {
        self.taken_at.saturating_sub(record.created_at)
    }

    pub fn entries(&self) -> Vec<DumpEntry> {
        self.records()
            .map(|record| DumpEntry {
                tag: record.tag,
                size: record.size,
                #[cfg(feature = "timestamps")]
                age_secs: self.age(record).as_secs_f64(),
                address: record.addr(),
            })
            .collect()
    }

    /// Serializable form of the whole snapshot.
    pub fn report(&self) -> DumpReport {
        DumpReport {
            live_count: self.live_count,
            table_size: self.table_size(),
            table_bytes: self.table_bytes,
            total_size: self.total_size(),
            counters: self.counters,
            entries: self.entries(),
        }
    }

    /// Write the human-readable dump. Tag bytes are written raw.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "*** TAGGED ALLOCATION STATS ***")?;
        writeln!(out, "Allocation count: {}", self.live_count)?;
        writeln!(
            out,
            "Table size: {} ({} bytes)",
            self.table_size(),
            self.table_bytes
        )?;

        for record in self.records() {
            out.write_all(b"Tag: ")?;
            out.write_all(record.tag.as_bytes())?;
            write!(out, ", Size: {}", record.size)?;
            #[cfg(feature = "timestamps")]
            write!(out, ", Time: {:.3}", self.age(record).as_secs_f64())?;
            writeln!(out, ", Pointer: 0x{:X}", record.addr())?;
        }
        Ok(())
    }
}

/// One live record as it appears in a dump.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DumpEntry {
    pub tag: Tag,
    pub size: usize,
    /// Seconds the allocation had been live at snapshot time.
    #[cfg(feature = "timestamps")]
    pub age_secs: f64,
    #[serde(serialize_with = "serialize_hex")]
    pub address: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DumpReport {
    pub live_count: usize,
    pub table_size: usize,
    pub table_bytes: usize,
    pub total_size: usize,
    pub counters: ResizeCounters,
    pub entries: Vec<DumpEntry>,
}

fn serialize_hex<S: Serializer>(address: &usize, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("0x{:X}", address))
}
