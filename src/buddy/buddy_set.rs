//! Single-arena buddy set
//!
//! Implements the core buddy system over one power-of-two arena. Block
//! headers live in the arena itself; there are no free lists, so every
//! search is an address-ascending walk from offset 0 that hops from one
//! block to the next by its size.

use alloc::vec::Vec;

use crate::arena::Arena;
use crate::fit::FitMode;
use crate::{is_aligned, AllocError, AllocResult, BlockInfo};

use super::buddy_block::{order_for, BuddyBlock, HEADER_SIZE, MIN_ORDER};

/// A buddy set - the unlocked state of one buddy arena
pub(crate) struct BuddySet {
    arena: Arena,
    max_order: u8,
    fit_mode: FitMode,
}

impl BuddySet {
    /// Initialize the set with one free block spanning the whole arena
    pub fn new(arena: Arena, fit_mode: FitMode) -> Self {
        debug_assert!(arena.size().is_power_of_two());
        let max_order = arena.size().trailing_zeros() as u8;
        debug_assert!(max_order >= MIN_ORDER);
        let mut set = Self {
            arena,
            max_order,
            fit_mode,
        };
        set.write_block(BuddyBlock::new(0, max_order, false));
        set
    }

    pub fn duplicate(&self) -> AllocResult<Self> {
        Ok(Self {
            arena: self.arena.duplicate()?,
            max_order: self.max_order,
            fit_mode: self.fit_mode,
        })
    }

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub const fn max_order(&self) -> u8 {
        self.max_order
    }

    pub fn capacity(&self) -> usize {
        self.arena.size()
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn set_fit_mode(&mut self, mode: FitMode) {
        self.fit_mode = mode;
    }

    pub fn block_at(&self, offset: usize) -> BuddyBlock {
        BuddyBlock::decode(offset, self.arena.read_word(offset))
    }

    fn write_block(&mut self, block: BuddyBlock) {
        self.arena.write_word(block.offset, block.encode());
    }

    /// Blocks in ascending address order
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            set: self,
            offset: 0,
        }
    }

    /// Allocate a block for `size` payload bytes, splitting as needed.
    ///
    /// Returns the allocated block; its payload starts `HEADER_SIZE` bytes in.
    pub fn alloc_block(&mut self, size: usize) -> AllocResult<BuddyBlock> {
        let needed = size
            .max(1)
            .checked_add(HEADER_SIZE)
            .ok_or(AllocError::NoMemory)?;
        let required_order = order_for(needed)
            .ok_or(AllocError::NoMemory)?
            .max(MIN_ORDER);
        if required_order > self.max_order {
            return Err(AllocError::NoMemory);
        }

        let free_blocks = self.walk().filter(|block| !block.occupied);
        let mut block = self
            .fit_mode
            .select(free_blocks, 1 << required_order)
            .ok_or(AllocError::NoMemory)?;

        // Split down to required order, upper halves stay free
        while block.order > required_order {
            block.order -= 1;
            self.write_block(BuddyBlock::new(
                block.offset + block.size(),
                block.order,
                false,
            ));
        }

        block.occupied = true;
        self.write_block(block);
        Ok(block)
    }

    /// Find the occupied block whose payload starts at `payload_offset`.
    ///
    /// The header is only trusted once a walk confirms it sits on a block
    /// boundary; a stale pointer into a free block is a double free.
    pub fn locate(&self, payload_offset: usize) -> AllocResult<BuddyBlock> {
        let target = payload_offset
            .checked_sub(HEADER_SIZE)
            .ok_or(AllocError::InvalidAddress)?;
        if !is_aligned(target, 1 << MIN_ORDER) {
            return Err(AllocError::InvalidAddress);
        }

        let block = self
            .walk()
            .find(|block| block.contains(target))
            .ok_or(AllocError::InvalidAddress)?;
        match (block.occupied, block.offset == target) {
            (true, true) => Ok(block),
            (true, false) => Err(AllocError::InvalidAddress),
            (false, _) => Err(AllocError::DoubleFree),
        }
    }

    /// Mark `block` free and merge it with free buddies of equal order.
    ///
    /// Returns the resulting free block.
    pub fn free_block(&mut self, block: BuddyBlock) -> BuddyBlock {
        let mut block = BuddyBlock::new(block.offset, block.order, false);

        // Merge with buddy while possible, never past the arena order
        while block.order < self.max_order {
            let buddy_offset = block.buddy_offset();
            if buddy_offset >= self.capacity() {
                break;
            }
            let buddy = self.block_at(buddy_offset);
            if buddy.occupied || buddy.order != block.order {
                break;
            }
            block = BuddyBlock::new(block.offset.min(buddy_offset), block.order + 1, false);
        }

        self.write_block(block);
        block
    }

    pub fn blocks_info(&self) -> Vec<BlockInfo> {
        self.walk().map(BlockInfo::from).collect()
    }

    pub fn used_bytes(&self) -> usize {
        self.walk()
            .filter(|block| block.occupied)
            .map(|block| block.size())
            .sum()
    }

    /// Number of free blocks of each order, indexed by order
    pub fn free_blocks_by_order(&self) -> Vec<usize> {
        let mut counts = alloc::vec![0; self.max_order as usize + 1];
        for block in self.walk().filter(|block| !block.occupied) {
            counts[block.order as usize] += 1;
        }
        counts
    }
}

/// Address-ascending walk over the blocks of a [`BuddySet`]
pub(crate) struct Walk<'a> {
    set: &'a BuddySet,
    offset: usize,
}

impl Iterator for Walk<'_> {
    type Item = BuddyBlock;

    fn next(&mut self) -> Option<BuddyBlock> {
        if self.offset >= self.set.capacity() {
            return None;
        }
        let block = self.set.block_at(self.offset);
        self.offset += block.size();
        Some(block)
    }
}
