//! The per-allocation record kept in each table slot.

use std::ptr::NonNull;
#[cfg(feature = "timestamps")]
use std::time::Duration;

use crate::tag::Tag;

/// Metadata for one live allocation.
///
/// `address` is an identifier only: the table never reads or writes through
/// it, and the memory behind it belongs to whoever holds the allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedAllocation {
    pub address: NonNull<u8>,
    pub size: usize,
    pub tag: Tag,
    /// Creation time on the tracker's clock.
    #[cfg(feature = "timestamps")]
    pub created_at: Duration,
}

// SAFETY: the address is never dereferenced through a record, so sharing a
// record across threads cannot race on the memory it names.
unsafe impl Send for TrackedAllocation {}
unsafe impl Sync for TrackedAllocation {}

/// One table position. `None` is the empty sentinel.
pub type Slot = Option<TrackedAllocation>;

impl TrackedAllocation {
    #[cfg(feature = "timestamps")]
    pub fn new(address: NonNull<u8>, size: usize, tag: Tag, created_at: Duration) -> Self {
        Self {
            address,
            size,
            tag,
            created_at,
        }
    }

    #[cfg(not(feature = "timestamps"))]
    pub fn new(address: NonNull<u8>, size: usize, tag: Tag) -> Self {
        Self { address, size, tag }
    }

    /// Address as an integer, for display.
    pub fn addr(&self) -> usize {
        self.address.as_ptr() as usize
    }
}
