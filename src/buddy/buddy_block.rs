//! Buddy block metadata
//!
//! Represents a block of the arena with its order, offset and occupancy,
//! and the one-word in-band header that stores them.

use crate::fit::Extent;
use crate::{BlockInfo, WORD_SIZE};

/// Size of the in-band block header in bytes.
///
/// One word keeps payloads word-aligned; only its low byte is meaningful.
pub const HEADER_SIZE: usize = WORD_SIZE;

/// Smallest block order: a header plus one word of payload.
pub const MIN_ORDER: u8 = (2 * WORD_SIZE).trailing_zeros() as u8;

/// Largest arena order representable on this target.
pub const MAX_ORDER: u8 = (usize::BITS - 1) as u8;

const OCCUPIED_BIT: usize = 1 << 7;
const ORDER_MASK: usize = OCCUPIED_BIT - 1;

/// Buddy block metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyBlock {
    /// Offset of the block from the arena start.
    pub offset: usize,
    /// The block spans `2^order` bytes.
    pub order: u8,
    pub occupied: bool,
}

impl BuddyBlock {
    /// Create a new buddy block
    pub const fn new(offset: usize, order: u8, occupied: bool) -> Self {
        Self {
            offset,
            order,
            occupied,
        }
    }

    /// Block size in bytes, header included
    pub const fn size(&self) -> usize {
        1 << self.order
    }

    /// Calculate the buddy offset for this block
    /// The buddy is the other half of the parent block at the next higher order
    /// For a block at order k with offset A, its buddy is at A ^ 2^k
    pub const fn buddy_offset(&self) -> usize {
        self.offset ^ self.size()
    }

    /// Whether `offset` falls inside this block
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset - self.offset < self.size()
    }

    pub(crate) fn encode(&self) -> usize {
        debug_assert!(self.order as usize <= ORDER_MASK);
        self.order as usize | if self.occupied { OCCUPIED_BIT } else { 0 }
    }

    pub(crate) fn decode(offset: usize, word: usize) -> Self {
        Self {
            offset,
            order: (word & ORDER_MASK) as u8,
            occupied: word & OCCUPIED_BIT != 0,
        }
    }
}

impl Extent for BuddyBlock {
    fn size(&self) -> usize {
        BuddyBlock::size(self)
    }
}

impl From<BuddyBlock> for BlockInfo {
    fn from(block: BuddyBlock) -> Self {
        BlockInfo {
            size: block.size(),
            occupied: block.occupied,
        }
    }
}

/// Smallest order whose block holds `bytes`, if representable.
pub(crate) fn order_for(bytes: usize) -> Option<u8> {
    bytes
        .checked_next_power_of_two()
        .map(|size| size.trailing_zeros() as u8)
}
