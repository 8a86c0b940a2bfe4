//! Owned byte region backing one allocator instance.
//!
//! The arena only knows about raw bytes and machine words at byte offsets
//! from its base; the block layouts on top of it belong to each variant.

use alloc::sync::Arc;
use core::alloc::Layout;
use core::ptr::{self, NonNull};

use crate::upstream::UpstreamAllocator;
use crate::{AllocError, AllocResult, ARENA_ALIGN, WORD_SIZE};

pub(crate) struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    upstream: Arc<dyn UpstreamAllocator>,
}

// SAFETY: the region is exclusively owned by this value and every access
// goes through `&self`/`&mut self`, serialized by the owning allocator's lock.
unsafe impl Send for Arena {}

impl Arena {
    /// Reserve `size` bytes from `upstream`.
    pub fn new(upstream: Arc<dyn UpstreamAllocator>, size: usize) -> AllocResult<Self> {
        if size == 0 {
            return Err(AllocError::InvalidParam);
        }
        let layout =
            Layout::from_size_align(size, ARENA_ALIGN).map_err(|_| AllocError::InvalidParam)?;
        let base = upstream.allocate(layout)?;
        Ok(Self {
            base,
            layout,
            upstream,
        })
    }

    /// Reserve a region of the same size from the same upstream and copy
    /// the whole byte image into it.
    pub fn duplicate(&self) -> AllocResult<Self> {
        let base = self.upstream.allocate(self.layout)?;
        // SAFETY: both regions are `layout.size()` bytes long and distinct.
        unsafe {
            ptr::copy_nonoverlapping(self.base.as_ptr(), base.as_ptr(), self.layout.size());
        }
        Ok(Self {
            base,
            layout: self.layout,
            upstream: self.upstream.clone(),
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Offset of `ptr` from the arena base, if `ptr` lies inside the arena.
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base_addr();
        if addr >= base && addr < base + self.size() {
            Some(addr - base)
        } else {
            None
        }
    }

    /// Pointer to the byte at `offset`.
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.size());
        // SAFETY: offset is within the allocation, so the result is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    pub fn read_word(&self, offset: usize) -> usize {
        self.check_word(offset);
        // SAFETY: bounds and alignment checked above; the base is ARENA_ALIGN aligned.
        unsafe { ptr::read(self.base.as_ptr().add(offset) as *const usize) }
    }

    pub fn write_word(&mut self, offset: usize, value: usize) {
        self.check_word(offset);
        // SAFETY: see `read_word`.
        unsafe { ptr::write(self.base.as_ptr().add(offset) as *mut usize, value) }
    }

    #[inline]
    fn check_word(&self, offset: usize) {
        debug_assert!(
            offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.size(),
            "word access at {:#x} outside arena of {:#x} bytes",
            offset,
            self.size()
        );
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was obtained from `upstream` with `layout`.
        unsafe { self.upstream.deallocate(self.base, self.layout) };
    }
}
