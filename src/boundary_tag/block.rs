//! In-band metadata of the boundary-tag allocator.
//!
//! Every occupied block starts with a header of four machine words:
//!
//! ```text
//! +0 * WORD  size word: payload size | OCCUPIED_TAG
//! +1 * WORD  next: offset of the following occupied block, or NIL
//! +2 * WORD  prev: offset of the preceding occupied block, or NIL
//! +3 * WORD  owner: base address of the arena the block belongs to
//! ```
//!
//! Offsets are relative to the heap start. Payload sizes are kept at word
//! granularity, so bit 0 of the size word is free to carry the occupancy
//! tag. Free space has no header at all.

use crate::fit::Extent;
use crate::{BlockInfo, WORD_SIZE};

/// Size of the occupied-block header in bytes.
pub const HEADER_SIZE: usize = 4 * WORD_SIZE;

pub(crate) const NIL: usize = usize::MAX;
pub(crate) const OCCUPIED_TAG: usize = 1;

pub(crate) const SIZE_WORD: usize = 0;
pub(crate) const NEXT_WORD: usize = WORD_SIZE;
pub(crate) const PREV_WORD: usize = 2 * WORD_SIZE;
pub(crate) const OWNER_WORD: usize = 3 * WORD_SIZE;

#[inline]
pub(crate) fn encode_link(link: Option<usize>) -> usize {
    link.unwrap_or(NIL)
}

#[inline]
pub(crate) fn decode_link(word: usize) -> Option<usize> {
    (word != NIL).then_some(word)
}

/// Decoded occupied-block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub payload_size: usize,
    pub occupied: bool,
    pub next: Option<usize>,
    pub prev: Option<usize>,
    pub owner: usize,
}

impl BlockHeader {
    pub fn size_word(&self) -> usize {
        debug_assert_eq!(self.payload_size % WORD_SIZE, 0);
        self.payload_size | if self.occupied { OCCUPIED_TAG } else { 0 }
    }

    /// Block extent, header included.
    pub fn block_size(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }
}

/// Split a size word into payload size and occupancy tag.
#[inline]
pub(crate) fn decode_size_word(word: usize) -> (usize, bool) {
    (word & !OCCUPIED_TAG, word & OCCUPIED_TAG != 0)
}

/// A free gap between occupied blocks, together with the blocks that
/// bound it in the occupied list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gap {
    pub start: usize,
    pub size: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Extent for Gap {
    fn size(&self) -> usize {
        self.size
    }
}

/// One block of a boundary-tag arena, as seen while iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryBlock {
    /// Offset of the block from the heap start.
    pub offset: usize,
    /// Block size in bytes, header included for occupied blocks.
    pub size: usize,
    pub occupied: bool,
}

impl BoundaryBlock {
    /// Offset one past the last byte of the block.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

impl From<BoundaryBlock> for BlockInfo {
    fn from(block: BoundaryBlock) -> Self {
        BlockInfo {
            size: block.size,
            occupied: block.occupied,
        }
    }
}
