//! Public boundary-tag allocator.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

use kspin::SpinNoIrq;
use log::Log;

use crate::arena::Arena;
use crate::fit::FitMode;
use crate::logging::ArenaLogger;
use crate::stats::ArenaStats;
#[cfg(feature = "tracking")]
use crate::stats::MemoryStatsReporter;
use crate::upstream::{SystemUpstream, UpstreamAllocator};
use crate::{checked_align_up, AllocError, AllocResult, ArenaAllocator, BlockInfo, WORD_SIZE};

use super::heap::BoundaryTagHeap;
use super::iter::BoundaryBlocks;

const LOG_TARGET: &str = "arena_allocator::boundary_tag";

/// Boundary-tag allocator over one fixed arena.
///
/// Occupied blocks carry a header linking them into an address-ordered
/// list; free space is the complement of that list. Releasing a block
/// only unlinks it, which widens the surrounding gap.
///
/// An allocator emptied with [`take`](Self::take) owns no arena: allocation
/// fails with [`AllocError::NoMemory`], deallocation with
/// [`AllocError::InvalidAddress`], and introspection reports nothing.
pub struct BoundaryTagAllocator {
    heap: Option<SpinNoIrq<BoundaryTagHeap>>,
    logger: ArenaLogger,
}

/// Configuration for a [`BoundaryTagAllocator`].
pub struct BoundaryTagBuilder {
    size: usize,
    fit_mode: FitMode,
    logger: Option<Arc<dyn Log>>,
    upstream: Option<Arc<dyn UpstreamAllocator>>,
}

impl BoundaryTagBuilder {
    pub fn fit_mode(mut self, mode: FitMode) -> Self {
        self.fit_mode = mode;
        self
    }

    /// Sink for debug and error records.
    pub fn logger(mut self, logger: Arc<dyn Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Memory source for the arena; defaults to [`SystemUpstream`].
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamAllocator>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Reserve the arena.
    ///
    /// The heap capacity is the requested size rounded up to whole words.
    pub fn build(self) -> AllocResult<BoundaryTagAllocator> {
        let logger = ArenaLogger::new(self.logger, LOG_TARGET);
        if self.size == 0 {
            error!(logger, "boundary-tag: arena size cannot be zero");
            return Err(AllocError::InvalidParam);
        }
        let capacity =
            checked_align_up(self.size, WORD_SIZE).ok_or(AllocError::InvalidParam)?;
        let upstream = self
            .upstream
            .unwrap_or_else(|| Arc::new(SystemUpstream));
        let arena = Arena::new(upstream, capacity).inspect_err(|err| {
            error!(
                logger,
                "boundary-tag: cannot reserve {} bytes from upstream: {}", capacity, err
            );
        })?;
        debug!(
            logger,
            "boundary-tag: arena [{:#x}, {:#x}) ready, {}",
            arena.base_addr(),
            arena.base_addr() + capacity,
            self.fit_mode
        );
        Ok(BoundaryTagAllocator {
            heap: Some(SpinNoIrq::new(BoundaryTagHeap::new(arena, self.fit_mode))),
            logger,
        })
    }
}

impl BoundaryTagAllocator {
    /// Allocator over `size` bytes from the system upstream, without logging.
    pub fn new(size: usize, fit_mode: FitMode) -> AllocResult<Self> {
        Self::builder(size).fit_mode(fit_mode).build()
    }

    pub fn builder(size: usize) -> BoundaryTagBuilder {
        BoundaryTagBuilder {
            size,
            fit_mode: FitMode::default(),
            logger: None,
            upstream: None,
        }
    }

    /// Move the arena out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        Self {
            heap: self.heap.take(),
            logger: self.logger.clone(),
        }
    }

    /// Whether this allocator still owns an arena.
    pub fn has_arena(&self) -> bool {
        self.heap.is_some()
    }

    /// Deep copy into a freshly reserved arena from the same upstream.
    pub fn try_clone(&self) -> AllocResult<Self> {
        let heap = match &self.heap {
            Some(heap) => Some(SpinNoIrq::new(heap.lock().duplicate()?)),
            None => None,
        };
        Ok(Self {
            heap,
            logger: self.logger.clone(),
        })
    }

    /// Iterate over all blocks, occupied and free, in address order.
    ///
    /// Holds the arena lock until the iterator is dropped.
    pub fn blocks(&self) -> BoundaryBlocks<'_> {
        BoundaryBlocks::new(self.heap.as_ref().map(|heap| heap.lock()))
    }

    pub fn stats(&self) -> ArenaStats {
        self.blocks_info().into_iter().collect()
    }

    #[cfg(feature = "tracking")]
    fn report_failure(&self, heap: &BoundaryTagHeap, size: usize) {
        let blocks = heap.blocks_info();
        let stats: ArenaStats = blocks.iter().copied().collect();
        MemoryStatsReporter::print_alloc_failure_stats(&self.logger, &stats, &blocks, size);
    }

    #[cfg(not(feature = "tracking"))]
    fn report_failure(&self, _heap: &BoundaryTagHeap, _size: usize) {
        // No-op when tracking is disabled
    }
}

impl ArenaAllocator for BoundaryTagAllocator {
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let Some(heap) = &self.heap else {
            warn!(
                self.logger,
                "boundary-tag: allocating {} bytes from an empty allocator", size
            );
            return Err(AllocError::NoMemory);
        };
        debug!(self.logger, "boundary-tag: allocating {} bytes", size);

        let mut heap = heap.lock();
        match heap.allocate(size) {
            Ok((offset, granted)) => {
                let ptr = heap.arena().ptr_at(offset);
                debug!(
                    self.logger,
                    "boundary-tag: allocated {} bytes at {:#x}",
                    granted,
                    ptr.as_ptr() as usize
                );
                Ok(ptr)
            }
            Err(err) => {
                error!(
                    self.logger,
                    "boundary-tag: cannot allocate {} bytes ({} of {} available): {}",
                    size,
                    heap.capacity() - heap.used_bytes(),
                    heap.capacity(),
                    err
                );
                self.report_failure(&heap, size);
                Err(err)
            }
        }
    }

    fn dealloc(&self, ptr: NonNull<u8>) -> AllocResult {
        let addr = ptr.as_ptr() as usize;
        let Some(heap) = &self.heap else {
            warn!(
                self.logger,
                "boundary-tag: deallocating {:#x} on an empty allocator", addr
            );
            return Err(AllocError::InvalidAddress);
        };
        debug!(self.logger, "boundary-tag: deallocating block at {:#x}", addr);

        let mut heap = heap.lock();
        let located = heap
            .arena()
            .offset_of(ptr)
            .ok_or(AllocError::InvalidAddress)
            .and_then(|offset| heap.locate(offset));
        match located {
            Ok(offset) => {
                let freed = heap.release(offset);
                debug!(
                    self.logger,
                    "boundary-tag: released {} bytes at {:#x}", freed, addr
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    self.logger,
                    "boundary-tag: cannot deallocate {:#x}: {}", addr, err
                );
                Err(err)
            }
        }
    }

    fn fit_mode(&self) -> FitMode {
        self.heap
            .as_ref()
            .map(|heap| heap.lock().fit_mode())
            .unwrap_or_default()
    }

    fn set_fit_mode(&self, mode: FitMode) {
        if let Some(heap) = &self.heap {
            heap.lock().set_fit_mode(mode);
            debug!(self.logger, "boundary-tag: fit mode set to {}", mode);
        }
    }

    fn blocks_info(&self) -> Vec<BlockInfo> {
        self.heap
            .as_ref()
            .map(|heap| heap.lock().blocks_info())
            .unwrap_or_default()
    }

    fn total_bytes(&self) -> usize {
        self.heap
            .as_ref()
            .map_or(0, |heap| heap.lock().capacity())
    }

    fn used_bytes(&self) -> usize {
        self.heap
            .as_ref()
            .map_or(0, |heap| heap.lock().used_bytes())
    }
}

impl Default for BoundaryTagAllocator {
    /// An empty allocator owning no arena.
    fn default() -> Self {
        Self {
            heap: None,
            logger: ArenaLogger::disabled(LOG_TARGET),
        }
    }
}

impl Clone for BoundaryTagAllocator {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(err) => panic!("boundary-tag: failed to clone arena: {}", err),
        }
    }
}

/// Allocators compare equal only to themselves.
impl PartialEq for BoundaryTagAllocator {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl Eq for BoundaryTagAllocator {}

impl fmt::Debug for BoundaryTagAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryTagAllocator")
            .field("has_arena", &self.has_arena())
            .field("logger", &self.logger)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_tag::HEADER_SIZE;

    const PAYLOAD: usize = 8 * WORD_SIZE;
    const BLOCK: usize = HEADER_SIZE + PAYLOAD;

    #[test]
    fn test_zero_size_rejected() {
        assert_eq!(
            BoundaryTagAllocator::new(0, FitMode::FirstFit).err(),
            Some(AllocError::InvalidParam)
        );
    }

    #[test]
    fn test_capacity_rounded_to_words() {
        let allocator = BoundaryTagAllocator::new(3 * WORD_SIZE + 1, FitMode::FirstFit).unwrap();
        assert_eq!(allocator.total_bytes(), 4 * WORD_SIZE);
    }

    #[test]
    fn test_alloc_dealloc_restores_single_free_block() {
        let allocator = BoundaryTagAllocator::new(4 * BLOCK, FitMode::FirstFit).unwrap();
        let ptr = allocator.alloc(PAYLOAD).unwrap();
        assert_eq!(allocator.used_bytes(), BLOCK);
        allocator.dealloc(ptr).unwrap();
        assert_eq!(
            allocator.blocks_info(),
            [BlockInfo {
                size: 4 * BLOCK,
                occupied: false
            }]
        );
        assert_eq!(allocator.available_bytes(), 4 * BLOCK);
    }

    #[test]
    fn test_dealloc_foreign_pointer() {
        let allocator = BoundaryTagAllocator::new(4 * BLOCK, FitMode::FirstFit).unwrap();
        let other = BoundaryTagAllocator::new(4 * BLOCK, FitMode::FirstFit).unwrap();
        let ptr = other.alloc(PAYLOAD).unwrap();
        assert_eq!(allocator.dealloc(ptr), Err(AllocError::InvalidAddress));
        assert_eq!(other.dealloc(ptr), Ok(()));
        assert_eq!(other.dealloc(ptr), Err(AllocError::InvalidAddress));
    }

    #[test]
    fn test_take_leaves_empty_allocator() {
        let mut allocator = BoundaryTagAllocator::new(4 * BLOCK, FitMode::BestFit).unwrap();
        let ptr = allocator.alloc(PAYLOAD).unwrap();
        let moved = allocator.take();

        assert!(!allocator.has_arena());
        assert_eq!(allocator.alloc(PAYLOAD), Err(AllocError::NoMemory));
        assert_eq!(allocator.dealloc(ptr), Err(AllocError::InvalidAddress));
        assert!(allocator.blocks_info().is_empty());
        assert_eq!(allocator.blocks().count(), 0);
        assert_eq!(allocator.total_bytes(), 0);
        assert_eq!(allocator.fit_mode(), FitMode::FirstFit);
        allocator.set_fit_mode(FitMode::WorstFit);

        assert_eq!(moved.fit_mode(), FitMode::BestFit);
        assert_eq!(moved.dealloc(ptr), Ok(()));
    }

    #[test]
    fn test_equality_is_identity() {
        let a = BoundaryTagAllocator::new(4 * BLOCK, FitMode::FirstFit).unwrap();
        let b = a.clone();
        assert_eq!(a, a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_set_fit_mode() {
        let allocator = BoundaryTagAllocator::new(4 * BLOCK, FitMode::FirstFit).unwrap();
        allocator.set_fit_mode(FitMode::WorstFit);
        assert_eq!(allocator.fit_mode(), FitMode::WorstFit);
    }
}
