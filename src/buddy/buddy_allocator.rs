//! Buddy-system allocator over one power-of-two arena
//!
//! Provides the locked, logged public face of a [`BuddySet`].

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
use crate::{AllocError, AllocResult, ArenaAllocator, BlockInfo};

use super::buddy_block::{order_for, HEADER_SIZE, MAX_ORDER, MIN_ORDER};
use super::buddy_set::BuddySet;
use super::iter::BuddyBlocks;

const LOG_TARGET: &str = "arena_allocator::buddy";

/// Buddy allocator with a single arena of `2^max_order` bytes
///
/// Allocation splits the chosen free block in halves down to the smallest
/// order that fits the request plus its header; deallocation merges the
/// block with its buddy for as long as the buddy is free and of the same
/// order.
///
/// An allocator emptied with [`take`](Self::take) owns no arena: allocation
/// fails with [`AllocError::NoMemory`], deallocation with
/// [`AllocError::InvalidAddress`], and introspection reports nothing.
pub struct BuddyAllocator {
    set: Option<SpinNoIrq<BuddySet>>,
    logger: ArenaLogger,
}

/// Configuration for a [`BuddyAllocator`].
pub struct BuddyBuilder {
    size: usize,
    fit_mode: FitMode,
    logger: Option<Arc<dyn Log>>,
    upstream: Option<Arc<dyn UpstreamAllocator>>,
}

impl BuddyBuilder {
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

    /// Reserve the arena, rounding its size up to a power of two.
    pub fn build(self) -> AllocResult<BuddyAllocator> {
        let logger = ArenaLogger::new(self.logger, LOG_TARGET);
        let min_size = 1usize << MIN_ORDER;
        if self.size < min_size {
            error!(
                logger,
                "buddy: arena size {} below minimum block size {}", self.size, min_size
            );
            return Err(AllocError::InvalidParam);
        }
        let Some(order) = order_for(self.size).filter(|&order| order <= MAX_ORDER) else {
            error!(logger, "buddy: arena size {} is too large", self.size);
            return Err(AllocError::InvalidParam);
        };

        let upstream = self
            .upstream
            .unwrap_or_else(|| Arc::new(SystemUpstream));
        let arena = Arena::new(upstream, 1 << order).inspect_err(|err| {
            error!(
                logger,
                "buddy: cannot reserve 2^{} bytes from upstream: {}", order, err
            );
        })?;
        debug!(
            logger,
            "buddy: arena [{:#x}, {:#x}) ready, order {}, {}",
            arena.base_addr(),
            arena.base_addr() + arena.size(),
            order,
            self.fit_mode
        );
        Ok(BuddyAllocator {
            set: Some(SpinNoIrq::new(BuddySet::new(arena, self.fit_mode))),
            logger,
        })
    }
}

impl BuddyAllocator {
    /// Allocator over at least `size` bytes from the system upstream, without logging.
    pub fn new(size: usize, fit_mode: FitMode) -> AllocResult<Self> {
        Self::builder(size).fit_mode(fit_mode).build()
    }

    pub fn builder(size: usize) -> BuddyBuilder {
        BuddyBuilder {
            size,
            fit_mode: FitMode::default(),
            logger: None,
            upstream: None,
        }
    }

    /// Move the arena out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        Self {
            set: self.set.take(),
            logger: self.logger.clone(),
        }
    }

    /// Whether this allocator still owns an arena.
    pub fn has_arena(&self) -> bool {
        self.set.is_some()
    }

    /// Deep copy into a freshly reserved arena from the same upstream.
    pub fn try_clone(&self) -> AllocResult<Self> {
        let set = match &self.set {
            Some(set) => Some(SpinNoIrq::new(set.lock().duplicate()?)),
            None => None,
        };
        Ok(Self {
            set,
            logger: self.logger.clone(),
        })
    }

    /// Order of the whole arena, or `None` for an empty allocator.
    pub fn max_order(&self) -> Option<u8> {
        self.set.as_ref().map(|set| set.lock().max_order())
    }

    /// Iterate over all blocks in address order.
    ///
    /// Holds the arena lock until the iterator is dropped.
    pub fn blocks(&self) -> BuddyBlocks<'_> {
        BuddyBlocks::new(self.set.as_ref().map(|set| set.lock()))
    }

    /// Number of free blocks of each order, indexed by order.
    pub fn free_blocks_by_order(&self) -> Vec<usize> {
        self.set
            .as_ref()
            .map(|set| set.lock().free_blocks_by_order())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> ArenaStats {
        self.blocks_info().into_iter().collect()
    }

    #[cfg(feature = "tracking")]
    fn report_failure(&self, set: &BuddySet, size: usize) {
        let blocks = set.blocks_info();
        let stats: ArenaStats = blocks.iter().copied().collect();
        MemoryStatsReporter::print_alloc_failure_stats(&self.logger, &stats, &blocks, size);
        for (order, count) in set.free_blocks_by_order().into_iter().enumerate() {
            if count > 0 {
                error!(
                    self.logger,
                    "    Order {}: {} free blocks ({} bytes each)",
                    order,
                    count,
                    1usize << order
                );
            }
        }
    }

    #[cfg(not(feature = "tracking"))]
    fn report_failure(&self, _set: &BuddySet, _size: usize) {
        // No-op when tracking is disabled
    }
}

impl ArenaAllocator for BuddyAllocator {
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let Some(set) = &self.set else {
            warn!(
                self.logger,
                "buddy: allocating {} bytes from an empty allocator", size
            );
            return Err(AllocError::NoMemory);
        };
        debug!(self.logger, "buddy: allocating {} bytes", size);

        let mut set = set.lock();
        match set.alloc_block(size) {
            Ok(block) => {
                let ptr = set.arena().ptr_at(block.offset + HEADER_SIZE);
                debug!(
                    self.logger,
                    "buddy: allocated order {} block at {:#x}",
                    block.order,
                    ptr.as_ptr() as usize
                );
                Ok(ptr)
            }
            Err(err) => {
                error!(
                    self.logger,
                    "buddy: cannot allocate {} bytes ({} of {} available): {}",
                    size,
                    set.capacity() - set.used_bytes(),
                    set.capacity(),
                    err
                );
                self.report_failure(&set, size);
                Err(err)
            }
        }
    }

    fn dealloc(&self, ptr: NonNull<u8>) -> AllocResult {
        let addr = ptr.as_ptr() as usize;
        let Some(set) = &self.set else {
            warn!(self.logger, "buddy: deallocating {:#x} on an empty allocator", addr);
            return Err(AllocError::InvalidAddress);
        };
        debug!(self.logger, "buddy: deallocating block at {:#x}", addr);

        let mut set = set.lock();
        let located = set
            .arena()
            .offset_of(ptr)
            .ok_or(AllocError::InvalidAddress)
            .and_then(|offset| set.locate(offset));
        match located {
            Ok(block) => {
                let merged = set.free_block(block);
                debug!(
                    self.logger,
                    "buddy: released order {} block at {:#x}, free block now order {}",
                    block.order,
                    addr,
                    merged.order
                );
                Ok(())
            }
            Err(err) => {
                error!(self.logger, "buddy: cannot deallocate {:#x}: {}", addr, err);
                Err(err)
            }
        }
    }

    fn fit_mode(&self) -> FitMode {
        self.set
            .as_ref()
            .map(|set| set.lock().fit_mode())
            .unwrap_or_default()
    }

    fn set_fit_mode(&self, mode: FitMode) {
        if let Some(set) = &self.set {
            set.lock().set_fit_mode(mode);
            debug!(self.logger, "buddy: fit mode set to {}", mode);
        }
    }

    fn blocks_info(&self) -> Vec<BlockInfo> {
        self.set
            .as_ref()
            .map(|set| set.lock().blocks_info())
            .unwrap_or_default()
    }

    fn total_bytes(&self) -> usize {
        self.set.as_ref().map_or(0, |set| set.lock().capacity())
    }

    fn used_bytes(&self) -> usize {
        self.set.as_ref().map_or(0, |set| set.lock().used_bytes())
    }
}

impl Default for BuddyAllocator {
    /// An empty allocator owning no arena.
    fn default() -> Self {
        Self {
            set: None,
            logger: ArenaLogger::disabled(LOG_TARGET),
        }
    }
}

impl Clone for BuddyAllocator {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(err) => panic!("buddy: failed to clone arena: {}", err),
        }
    }
}

/// Allocators compare equal only to themselves.
impl PartialEq for BuddyAllocator {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl Eq for BuddyAllocator {}

impl fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("has_arena", &self.has_arena())
            .field("logger", &self.logger)
            .finish()
    }
}
