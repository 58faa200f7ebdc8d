//! ## tagalloc-core::tracker
//! **The public allocation surface**
//!
//! [`TagTracker`] asks the raw allocator for memory, records the block in the
//! locked table, and hands back a [`Tracked`] handle that returns the block
//! when freed or dropped.
//!
//! Every operation comes in two forms. `try_*` returns the [`TrackerError`];
//! the plain form treats any error as fatal and applies the configured
//! [`FailurePolicy`].

use std::alloc::Layout;
use std::fmt;
use std::io;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::NonNull;
use std::slice;

use tagalloc_config::{FailurePolicy, TrackerConfig};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{OrFatal, TrackerError};
use crate::guard::ConcurrencyGuard;
use crate::raw::{RawAllocator, SystemAllocator};
use crate::record::TrackedAllocation;
use crate::stats::{TableSnapshot, TrackerStats};
use crate::table::AllocationTable;
use crate::tag::Tag;

pub struct TagTracker<A = SystemAllocator, C = MonotonicClock>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    table: ConcurrencyGuard<AllocationTable<A>>,
    allocator: A,
    clock: C,
    policy: FailurePolicy,
}

impl TagTracker {
    /// A tracker over the system allocator with a monotonic clock.
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_parts(config, SystemAllocator, MonotonicClock::new())
    }
}

impl<A, C> TagTracker<A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    pub fn with_parts(config: &TrackerConfig, allocator: A, clock: C) -> Result<Self, TrackerError> {
        config.check()?;
        let table = AllocationTable::from_config(config, allocator.clone())?;
        tracing::debug!(
            table_size = table.table_size(),
            table_bytes = table.byte_len(),
            "allocation tracker ready"
        );
        Ok(Self {
            table: ConcurrencyGuard::new(table, config.lock_timeout()),
            allocator,
            clock,
            policy: config.failure_policy,
        })
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn try_allocate_one<T>(&self, tag: impl Into<Tag>) -> Result<Tracked<'_, T, A, C>, TrackerError> {
        self.try_allocate_array(1, tag)
    }

    /// Allocate uninitialized room for `count` values of `T`.
    pub fn try_allocate_array<T>(
        &self,
        count: usize,
        tag: impl Into<Tag>,
    ) -> Result<Tracked<'_, T, A, C>, TrackerError> {
        let layout = Layout::array::<T>(count).map_err(|_| TrackerError::LayoutOverflow)?;
        if layout.size() == 0 {
            return Err(TrackerError::ZeroSizedRecord);
        }
        let tag = tag.into();
        #[cfg(feature = "timestamps")]
        let created_at = self.clock.now();

        let address = self
            .allocator
            .allocate(layout)
            .ok_or(TrackerError::AllocatorExhausted {
                size: layout.size(),
            })?;

        #[cfg(feature = "timestamps")]
        let record = TrackedAllocation::new(address, layout.size(), tag, created_at);
        #[cfg(not(feature = "timestamps"))]
        let record = TrackedAllocation::new(address, layout.size(), tag);

        if let Err(error) = self.with_table(|table| table.insert(record)) {
            // SAFETY: allocated just above with this layout and never shared.
            unsafe { self.allocator.release(address, layout) };
            return Err(error);
        }

        Ok(Tracked {
            tracker: self,
            ptr: address.cast(),
            len: count,
            layout,
        })
    }

    pub fn allocate_one<T>(&self, tag: impl Into<Tag>) -> Tracked<'_, T, A, C> {
        self.try_allocate_one(tag).or_fatal(self.policy)
    }

    pub fn allocate_array<T>(&self, count: usize, tag: impl Into<Tag>) -> Tracked<'_, T, A, C> {
        self.try_allocate_array(count, tag).or_fatal(self.policy)
    }

    /// Same as dropping the handle.
    pub fn free<T>(&self, handle: Tracked<'_, T, A, C>) {
        debug_assert!(std::ptr::eq(handle.tracker, self));
        handle.free()
    }

    pub fn try_free<T>(&self, handle: Tracked<'_, T, A, C>) -> Result<(), TrackerError> {
        debug_assert!(std::ptr::eq(handle.tracker, self));
        handle.try_free()
    }

    /// Untrack `address` and hand it back to the raw allocator.
    ///
    /// If the table has no record for `address` the live count is still
    /// decremented; see [`AllocationTable::remove`].
    ///
    /// # Safety
    ///
    /// `address` must have been obtained from this tracker's allocator with
    /// `layout`, and must not be used or freed again afterwards. It must not
    /// belong to a live [`Tracked`] handle.
    pub unsafe fn try_free_raw(
        &self,
        address: NonNull<u8>,
        layout: Layout,
    ) -> Result<Option<TrackedAllocation>, TrackerError> {
        let removed = self.with_table(|table| table.remove(address))?;
        // SAFETY: contract passed through to the caller.
        unsafe { self.allocator.release(address, layout) };
        Ok(removed)
    }

    /// # Safety
    ///
    /// Same contract as [`Self::try_free_raw`].
    pub unsafe fn free_raw(&self, address: NonNull<u8>, layout: Layout) {
        // SAFETY: contract passed through to the caller.
        unsafe { self.try_free_raw(address, layout) }.or_fatal(self.policy);
    }

    pub fn try_count(&self) -> Result<usize, TrackerError> {
        self.table.read(|table| table.live_count())
    }

    /// Number of live allocations.
    pub fn count(&self) -> usize {
        self.try_count().or_fatal(self.policy)
    }

    pub fn try_total_size(&self) -> Result<usize, TrackerError> {
        self.table.read(|table| table.total_size())
    }

    /// Bytes held by live allocations, not counting the table itself.
    pub fn total_size(&self) -> usize {
        self.try_total_size().or_fatal(self.policy)
    }

    pub fn try_table_size(&self) -> Result<usize, TrackerError> {
        self.table.read(|table| table.table_size())
    }

    pub fn table_size(&self) -> usize {
        self.try_table_size().or_fatal(self.policy)
    }

    pub fn try_stats(&self) -> Result<TrackerStats, TrackerError> {
        self.table.read(TrackerStats::capture)
    }

    pub fn stats(&self) -> TrackerStats {
        self.try_stats().or_fatal(self.policy)
    }

    pub fn try_snapshot(&self) -> Result<TableSnapshot, TrackerError> {
        self.table
            .read(|table| TableSnapshot::capture(table, self.clock.now()))
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.try_snapshot().or_fatal(self.policy)
    }

    /// Write a report of every live allocation to `out`. The table is only
    /// locked while it is copied.
    pub fn dump<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        self.snapshot().write_report(out)
    }

    fn with_table<R>(
        &self,
        f: impl FnOnce(&mut AllocationTable<A>) -> Result<R, TrackerError>,
    ) -> Result<R, TrackerError> {
        self.table.write(f)?
    }

    /// Untrack and release a handle's block. On error the block stays
    /// allocated so the table never names freed memory.
    fn release(&self, address: NonNull<u8>, layout: Layout) -> Result<(), TrackerError> {
        self.with_table(|table| table.remove(address))?;
        // SAFETY: handles own their block, allocated with `layout`.
        unsafe { self.allocator.release(address, layout) };
        Ok(())
    }
}

impl<A, C> fmt::Debug for TagTracker<A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTracker")
            .field("stats", &self.try_stats().ok())
            .field("policy", &self.policy)
            .finish()
    }
}

/// An owned, tracked block of `len` uninitialized `T`s.
///
/// Dropping the handle frees the block. Values written into it are not
/// dropped.
pub struct Tracked<'t, T, A = SystemAllocator, C = MonotonicClock>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    tracker: &'t TagTracker<A, C>,
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: the handle owns its block exclusively, like a `Box<[T]>`.
unsafe impl<T: Send, A, C> Send for Tracked<'_, T, A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
}
unsafe impl<T: Sync, A, C> Sync for Tracked<'_, T, A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
}

impl<T, A, C> Tracked<'_, T, A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    /// Number of `T` slots in the block.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block size in bytes.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// The address the table records for this block.
    pub fn address(&self) -> NonNull<u8> {
        self.ptr.cast()
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn as_uninit_slice(&self) -> &[MaybeUninit<T>] {
        // SAFETY: the block holds `len` properly aligned `T` slots, and
        // `MaybeUninit` makes no claim about their contents.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast(), self.len) }
    }

    pub fn as_uninit_slice_mut(&mut self) -> &mut [MaybeUninit<T>] {
        // SAFETY: as above, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().cast(), self.len) }
    }

    /// Initialize every slot with `f(index)`.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> T) -> &mut [T] {
        for (index, slot) in self.as_uninit_slice_mut().iter_mut().enumerate() {
            slot.write(f(index));
        }
        // SAFETY: every slot was written above.
        unsafe { self.assume_init_mut() }
    }

    /// # Safety
    ///
    /// Every slot must have been initialized.
    pub unsafe fn assume_init(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// # Safety
    ///
    /// Every slot must have been initialized.
    pub unsafe fn assume_init_mut(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn free(self) {
        drop(self)
    }

    pub fn try_free(self) -> Result<(), TrackerError> {
        let this = ManuallyDrop::new(self);
        this.tracker.release(this.address(), this.layout)
    }
}

impl<T, A, C> Drop for Tracked<'_, T, A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    fn drop(&mut self) {
        self.tracker
            .release(self.address(), self.layout)
            .or_fatal(self.tracker.policy)
    }
}

impl<T, A, C> fmt::Debug for Tracked<'_, T, A, C>
where
    A: RawAllocator + Clone,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("address", &self.ptr)
            .field("len", &self.len)
            .field("size", &self.layout.size())
            .finish()
    }
}
