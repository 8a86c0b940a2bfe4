//! Upstream memory source
//!
//! An arena is carved out of exactly one allocation made by an
//! [`UpstreamAllocator`] at construction time, and handed back to it when
//! the owning allocator is dropped.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::{AllocError, AllocResult};

/// Source of the byte region an arena manages.
pub trait UpstreamAllocator: Send + Sync {
    /// Allocate a region described by `layout`.
    fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Release a region previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this upstream with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Upstream backed by the `alloc` crate's global allocator.
///
/// This is the default source when a builder is not given one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUpstream;

impl UpstreamAllocator for SystemUpstream {
    fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(AllocError::InvalidParam);
        }
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::NoMemory)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::alloc::dealloc(ptr.as_ptr(), layout);
    }
}
