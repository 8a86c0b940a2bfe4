//! Forward block iteration over a buddy arena.

use core::iter::FusedIterator;

use kspin::SpinNoIrqGuard;

use super::buddy_block::BuddyBlock;
use super::buddy_set::BuddySet;

/// Iterator over every block of a buddy arena, in address order.
///
/// Each step advances by `2^order` of the current block. The arena lock is
/// held until the iterator is dropped.
pub struct BuddyBlocks<'a> {
    set: Option<SpinNoIrqGuard<'a, BuddySet>>,
    offset: usize,
}

impl<'a> BuddyBlocks<'a> {
    pub(crate) fn new(set: Option<SpinNoIrqGuard<'a, BuddySet>>) -> Self {
        Self { set, offset: 0 }
    }
}

impl Iterator for BuddyBlocks<'_> {
    type Item = BuddyBlock;

    fn next(&mut self) -> Option<BuddyBlock> {
        let set = self.set.as_ref()?;
        if self.offset >= set.capacity() {
            return None;
        }
        let block = set.block_at(self.offset);
        self.offset += block.size();
        Some(block)
    }
}

impl FusedIterator for BuddyBlocks<'_> {}
