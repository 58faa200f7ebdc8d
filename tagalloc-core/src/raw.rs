//! The allocation primitive the tracker sits on top of.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::Arc;

/// A platform allocate/reallocate/release primitive.
///
/// # Safety
///
/// Implementations must return memory that is valid for `layout.size()` bytes
/// and aligned to `layout.align()`, and must not hand out the same block twice
/// while it is live.
pub unsafe trait RawAllocator: Send + Sync {
    /// Returns `None` when no memory is available.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize a block, preserving its contents up to the smaller size. On
    /// `None` the original block is untouched and still owned by the caller.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with layout `old`, and `new_size`
    /// must be non-zero.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, old: Layout, new_size: usize)
        -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` must come from this allocator with layout `layout`, and must not
    /// be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

// SAFETY: forwards to `System`, which upholds the `GlobalAlloc` contract.
unsafe impl RawAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        // SAFETY: callers never request zero-sized layouts.
        NonNull::new(unsafe { System.alloc(layout) })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: contract passed through to the caller.
        NonNull::new(unsafe { System.realloc(ptr.as_ptr(), old, new_size) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: contract passed through to the caller.
        unsafe { System.dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: forwards to the shared allocator.
unsafe impl<A: RawAllocator> RawAllocator for Arc<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        unsafe { (**self).reallocate(ptr, old, new_size) }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).release(ptr, layout) }
    }
}
