//! Statistics and failure reporting for arena allocators
//!
//! Usage figures are derived from the block snapshot of an arena, so they
//! describe exactly what [`ArenaAllocator::blocks_info`](crate::ArenaAllocator::blocks_info)
//! reports.

use crate::logging::ArenaLogger;
use crate::BlockInfo;

/// Arena usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub occupied_blocks: usize,
    pub free_blocks: usize,
    pub largest_free_block: usize,
}

impl ArenaStats {
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            occupied_blocks: 0,
            free_blocks: 0,
            largest_free_block: 0,
        }
    }

    /// Accumulate one block into the statistics
    pub fn add_block(&mut self, block: BlockInfo) {
        self.total_bytes += block.size;
        if block.occupied {
            self.used_bytes += block.size;
            self.occupied_blocks += 1;
        } else {
            self.free_bytes += block.size;
            self.free_blocks += 1;
            self.largest_free_block = self.largest_free_block.max(block.size);
        }
    }

    /// Free bytes that cannot serve a request as large as the largest
    /// free block, as a percentage of all free bytes.
    pub fn fragmentation_percent(&self) -> usize {
        if self.free_bytes == 0 {
            return 0;
        }
        (self.free_bytes - self.largest_free_block) * 100 / self.free_bytes
    }
}

impl FromIterator<BlockInfo> for ArenaStats {
    fn from_iter<I: IntoIterator<Item = BlockInfo>>(iter: I) -> Self {
        let mut stats = ArenaStats::new();
        for block in iter {
            stats.add_block(block);
        }
        stats
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print arena state after a failed allocation
    pub fn print_alloc_failure_stats(
        logger: &ArenaLogger,
        stats: &ArenaStats,
        blocks: &[BlockInfo],
        request_size: usize,
    ) {
        error!(logger, "========================================");
        error!(logger, "Request: {} bytes", request_size);
        error!(logger, "Arena state:");
        error!(logger, "  Total bytes: {}", stats.total_bytes);
        error!(
            logger,
            "  Used bytes: {} in {} blocks", stats.used_bytes, stats.occupied_blocks
        );
        error!(
            logger,
            "  Free bytes: {} in {} blocks (largest {})",
            stats.free_bytes,
            stats.free_blocks,
            stats.largest_free_block
        );
        error!(
            logger,
            "  Fragmentation: {}%",
            stats.fragmentation_percent()
        );
        error!(logger, "Blocks:");
        let mut offset = 0;
        for block in blocks {
            error!(
                logger,
                "  [{:#x}, {:#x}) {}",
                offset,
                offset + block.size,
                if block.occupied { "occupied" } else { "free" }
            );
            offset += block.size;
        }
        error!(logger, "========================================");
    }
}
