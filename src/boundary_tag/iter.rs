//! Block iteration over a boundary-tag arena.

use core::iter::FusedIterator;

use kspin::SpinNoIrqGuard;

use super::block::BoundaryBlock;
use super::heap::{BlockCursor, BoundaryTagHeap};

/// Iterator over every block of a boundary-tag arena, in address order.
///
/// The arena lock is held until the iterator is dropped, so the owning
/// allocator must not be used from the same thread meanwhile.
///
/// Walking backwards is supported but each step re-scans the arena from
/// its start, since blocks carry no footer: use it for diagnostics only.
pub struct BoundaryBlocks<'a> {
    heap: Option<SpinNoIrqGuard<'a, BoundaryTagHeap>>,
    front: BlockCursor,
    /// Offset one past the last block not yet yielded from the back.
    back: usize,
}

impl<'a> BoundaryBlocks<'a> {
    pub(crate) fn new(heap: Option<SpinNoIrqGuard<'a, BoundaryTagHeap>>) -> Self {
        let (front, back) = match &heap {
            Some(heap) => (heap.cursor_front(), heap.capacity()),
            None => (
                BlockCursor {
                    offset: 0,
                    next_occupied: None,
                },
                0,
            ),
        };
        Self { heap, front, back }
    }
}

impl Iterator for BoundaryBlocks<'_> {
    type Item = BoundaryBlock;

    fn next(&mut self) -> Option<BoundaryBlock> {
        let heap = self.heap.as_ref()?;
        if self.front.offset >= self.back {
            return None;
        }
        let (block, next) = heap.step(self.front)?;
        self.front = next;
        Some(block)
    }
}

impl DoubleEndedIterator for BoundaryBlocks<'_> {
    fn next_back(&mut self) -> Option<BoundaryBlock> {
        let heap = self.heap.as_ref()?;
        if self.front.offset >= self.back {
            return None;
        }
        let block = heap.block_before(self.back)?;
        self.back = block.offset;
        Some(block)
    }
}

impl FusedIterator for BoundaryBlocks<'_> {}
