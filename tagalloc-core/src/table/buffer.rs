//! Contiguous slot storage obtained from the raw allocator.
//!
//! The buffer is always exactly `len * size_of::<Slot>()` bytes and every
//! slot in it is initialized.

use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use crate::error::TrackerError;
use crate::raw::RawAllocator;
use crate::record::Slot;

pub struct SlotBuffer<A: RawAllocator> {
    ptr: NonNull<Slot>,
    len: usize,
    layout: Layout,
    allocator: A,
}

// SAFETY: the buffer uniquely owns its slots, and slots are `Send`.
unsafe impl<A: RawAllocator> Send for SlotBuffer<A> {}

fn layout_for(len: usize) -> Option<Layout> {
    Layout::array::<Slot>(len).ok().filter(|l| l.size() > 0)
}

impl<A: RawAllocator> SlotBuffer<A> {
    /// Allocate `len` empty slots.
    pub fn with_len(len: usize, allocator: A) -> Result<Self, TrackerError> {
        let layout = layout_for(len).ok_or(TrackerError::TableAllocation { entries: len })?;
        let ptr = allocator
            .allocate(layout)
            .ok_or(TrackerError::TableAllocation { entries: len })?
            .cast::<Slot>();
        // SAFETY: freshly allocated for `len` slots.
        unsafe { fill_empty(ptr, 0, len) };
        Ok(Self {
            ptr,
            len,
            layout,
            allocator,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len * mem::size_of::<Slot>()
    }

    pub fn as_slice(&self) -> &[Slot] {
        // SAFETY: `ptr` covers `len` initialized slots.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Slot] {
        // SAFETY: as above, and `&mut self` gives exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Reallocate to `new_len` slots. Slots past the new end are dropped
    /// without inspection; new slots start empty. On failure the buffer is
    /// unchanged.
    pub fn reallocate(&mut self, new_len: usize) -> Result<(), TrackerError> {
        if new_len == self.len {
            return Ok(());
        }
        let failed = TrackerError::TableReallocation {
            from: self.len,
            to: new_len,
        };
        let new_layout = match layout_for(new_len) {
            Some(layout) => layout,
            None => return Err(failed),
        };
        // SAFETY: `ptr` was obtained from `allocator` with `self.layout`,
        // and `new_layout.size()` is non-zero.
        let ptr = unsafe {
            self.allocator
                .reallocate(self.ptr.cast(), self.layout, new_layout.size())
        }
        .ok_or(failed)?
        .cast::<Slot>();

        if new_len > self.len {
            // SAFETY: the tail past the old length is allocated but
            // uninitialized.
            unsafe { fill_empty(ptr, self.len, new_len) };
        }
        self.ptr = ptr;
        self.len = new_len;
        self.layout = new_layout;
        Ok(())
    }
}

/// # Safety
///
/// `ptr` must be valid for writes of slots `from..to`.
unsafe fn fill_empty(ptr: NonNull<Slot>, from: usize, to: usize) {
    for index in from..to {
        unsafe { ptr.as_ptr().add(index).write(None) };
    }
}

impl<A: RawAllocator> Drop for SlotBuffer<A> {
    fn drop(&mut self) {
        // SAFETY: allocated by `allocator` with this layout; slots are `Copy`
        // so there is nothing to drop in place.
        unsafe { self.allocator.release(self.ptr.cast(), self.layout) }
    }
}
