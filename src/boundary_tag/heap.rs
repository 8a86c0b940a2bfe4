//! Boundary-tag heap state and algorithms.
//!
//! The heap is the arena plus the head of the occupied list. It is never
//! locked itself: [`BoundaryTagAllocator`](super::BoundaryTagAllocator)
//! wraps it in a spin lock and every method here runs under that lock.

use crate::arena::Arena;
use crate::fit::FitMode;
use crate::{checked_align_up, is_aligned, AllocError, AllocResult, BlockInfo, WORD_SIZE};
use alloc::vec::Vec;

use super::block::{
    decode_link, decode_size_word, encode_link, BlockHeader, BoundaryBlock, Gap, HEADER_SIZE,
    NEXT_WORD, OWNER_WORD, PREV_WORD, SIZE_WORD,
};

pub(crate) struct BoundaryTagHeap {
    arena: Arena,
    /// Lowest-addressed occupied block.
    head: Option<usize>,
    fit_mode: FitMode,
}

impl BoundaryTagHeap {
    pub fn new(arena: Arena, fit_mode: FitMode) -> Self {
        debug_assert!(is_aligned(arena.size(), WORD_SIZE));
        Self {
            arena,
            head: None,
            fit_mode,
        }
    }

    /// Deep copy into a fresh arena from the same upstream.
    pub fn duplicate(&self) -> AllocResult<Self> {
        let mut copy = Self {
            arena: self.arena.duplicate()?,
            head: self.head,
            fit_mode: self.fit_mode,
        };
        copy.rebind_owner();
        Ok(copy)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.size()
    }

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn set_fit_mode(&mut self, mode: FitMode) {
        self.fit_mode = mode;
    }

    pub fn header(&self, offset: usize) -> BlockHeader {
        let (payload_size, occupied) = decode_size_word(self.arena.read_word(offset + SIZE_WORD));
        BlockHeader {
            payload_size,
            occupied,
            next: decode_link(self.arena.read_word(offset + NEXT_WORD)),
            prev: decode_link(self.arena.read_word(offset + PREV_WORD)),
            owner: self.arena.read_word(offset + OWNER_WORD),
        }
    }

    fn write_header(&mut self, offset: usize, header: &BlockHeader) {
        self.arena.write_word(offset + SIZE_WORD, header.size_word());
        self.arena.write_word(offset + NEXT_WORD, encode_link(header.next));
        self.arena.write_word(offset + PREV_WORD, encode_link(header.prev));
        self.arena.write_word(offset + OWNER_WORD, header.owner);
    }

    fn next_of(&self, offset: usize) -> Option<usize> {
        decode_link(self.arena.read_word(offset + NEXT_WORD))
    }

    /// Free gaps in list order, empty ones included.
    pub fn gaps(&self) -> Gaps<'_> {
        Gaps {
            heap: self,
            start: 0,
            prev: None,
            next: self.head,
            done: false,
        }
    }

    /// Carve a block for `size` payload bytes.
    ///
    /// Returns the payload offset and the payload size actually granted,
    /// which is larger than requested when the leftover of the chosen gap
    /// could not hold a header.
    pub fn allocate(&mut self, size: usize) -> AllocResult<(usize, usize)> {
        let payload = checked_align_up(size.max(1), WORD_SIZE).ok_or(AllocError::NoMemory)?;
        let required = payload
            .checked_add(HEADER_SIZE)
            .ok_or(AllocError::NoMemory)?;
        if required > self.capacity() {
            return Err(AllocError::NoMemory);
        }

        let gap = self
            .fit_mode
            .select(self.gaps(), required)
            .ok_or(AllocError::NoMemory)?;

        let payload = if gap.size - required < HEADER_SIZE {
            gap.size - HEADER_SIZE
        } else {
            payload
        };

        let owner = self.arena.base_addr();
        self.write_header(
            gap.start,
            &BlockHeader {
                payload_size: payload,
                occupied: true,
                next: gap.next,
                prev: gap.prev,
                owner,
            },
        );
        match gap.prev {
            Some(prev) => self.arena.write_word(prev + NEXT_WORD, gap.start),
            None => self.head = Some(gap.start),
        }
        if let Some(next) = gap.next {
            self.arena.write_word(next + PREV_WORD, gap.start);
        }

        Ok((gap.start + HEADER_SIZE, payload))
    }

    /// Find the header of the live block whose payload starts at `payload_offset`.
    pub fn locate(&self, payload_offset: usize) -> AllocResult<usize> {
        let target = payload_offset
            .checked_sub(HEADER_SIZE)
            .ok_or(AllocError::InvalidAddress)?;
        if !is_aligned(target, WORD_SIZE) {
            return Err(AllocError::InvalidAddress);
        }

        let mut current = self.head;
        while let Some(offset) = current {
            if offset == target {
                let header = self.header(offset);
                if !header.occupied || header.owner != self.arena.base_addr() {
                    return Err(AllocError::InvalidAddress);
                }
                return Ok(offset);
            }
            if offset > target {
                break;
            }
            current = self.next_of(offset);
        }
        Err(AllocError::InvalidAddress)
    }

    /// Unlink the block at `offset`; returns its size, header included.
    ///
    /// `offset` must come from [`locate`](Self::locate).
    pub fn release(&mut self, offset: usize) -> usize {
        let mut header = self.header(offset);
        match header.prev {
            Some(prev) => self
                .arena
                .write_word(prev + NEXT_WORD, encode_link(header.next)),
            None => self.head = header.next,
        }
        if let Some(next) = header.next {
            self.arena
                .write_word(next + PREV_WORD, encode_link(header.prev));
        }
        header.occupied = false;
        self.arena.write_word(offset + SIZE_WORD, header.size_word());
        header.block_size()
    }

    pub fn cursor_front(&self) -> BlockCursor {
        BlockCursor {
            offset: 0,
            next_occupied: self.head,
        }
    }

    /// Block at `cursor` and the cursor positioned just past it.
    ///
    /// The occupied list decides where blocks start: when the cursor reaches
    /// the next listed block, its size word is decoded for the payload size
    /// and occupancy tag, and the walk skips past it. Anything before the
    /// next listed block is one free gap whose bytes are never interpreted,
    /// so stale headers left behind by released blocks cannot show up as
    /// blocks. The tag only confirms what the list says.
    pub fn step(&self, cursor: BlockCursor) -> Option<(BoundaryBlock, BlockCursor)> {
        if cursor.offset >= self.capacity() {
            return None;
        }
        match cursor.next_occupied {
            Some(offset) if offset == cursor.offset => {
                let (payload, occupied) =
                    decode_size_word(self.arena.read_word(offset + SIZE_WORD));
                debug_assert!(occupied, "linked block at {:#x} is not tagged", offset);
                let block = BoundaryBlock {
                    offset,
                    size: HEADER_SIZE + payload,
                    occupied,
                };
                let next = BlockCursor {
                    offset: block.end(),
                    next_occupied: self.next_of(offset),
                };
                Some((block, next))
            }
            next_occupied => {
                let end = next_occupied.unwrap_or(self.capacity());
                let block = BoundaryBlock {
                    offset: cursor.offset,
                    size: end - cursor.offset,
                    occupied: false,
                };
                Some((
                    block,
                    BlockCursor {
                        offset: end,
                        next_occupied,
                    },
                ))
            }
        }
    }

    /// The block ending exactly at `end`.
    ///
    /// Blocks carry no footer, so this walks forward from the heap start:
    /// O(n) in the number of blocks.
    pub fn block_before(&self, end: usize) -> Option<BoundaryBlock> {
        let mut cursor = self.cursor_front();
        while let Some((block, next)) = self.step(cursor) {
            if block.end() >= end {
                return (block.end() == end).then_some(block);
            }
            cursor = next;
        }
        None
    }

    pub fn blocks_info(&self) -> Vec<BlockInfo> {
        let mut blocks = Vec::new();
        let mut cursor = self.cursor_front();
        while let Some((block, next)) = self.step(cursor) {
            blocks.push(block.into());
            cursor = next;
        }
        blocks
    }

    pub fn used_bytes(&self) -> usize {
        let mut used = 0;
        let mut current = self.head;
        while let Some(offset) = current {
            let header = self.header(offset);
            used += header.block_size();
            current = header.next;
        }
        used
    }

    /// Point every occupied header at this arena after a byte-for-byte copy.
    fn rebind_owner(&mut self) {
        let owner = self.arena.base_addr();
        let mut current = self.head;
        while let Some(offset) = current {
            self.arena.write_word(offset + OWNER_WORD, owner);
            current = self.next_of(offset);
        }
    }
}

/// Walk position: the next offset to visit and the first occupied block
/// at or after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockCursor {
    pub offset: usize,
    pub next_occupied: Option<usize>,
}

/// Free gaps of a heap: before the first occupied block, between
/// consecutive ones, and after the last one up to the heap end.
pub(crate) struct Gaps<'a> {
    heap: &'a BoundaryTagHeap,
    start: usize,
    prev: Option<usize>,
    next: Option<usize>,
    done: bool,
}

impl Iterator for Gaps<'_> {
    type Item = Gap;

    fn next(&mut self) -> Option<Gap> {
        if self.done {
            return None;
        }
        let end = match self.next {
            Some(next) => next,
            None => {
                self.done = true;
                self.heap.capacity()
            }
        };
        let gap = Gap {
            start: self.start,
            size: end - self.start,
            prev: self.prev,
            next: self.next,
        };
        if let Some(next) = self.next {
            let header = self.heap.header(next);
            self.prev = Some(next);
            self.start = next + header.block_size();
            self.next = header.next;
        }
        Some(gap)
    }
}
