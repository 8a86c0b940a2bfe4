//! Boundary-tag allocator module
//!
//! This module provides an allocator whose occupied blocks form an
//! explicit doubly linked list inside the arena:
//! - In-band four-word headers with offset links
//! - Implicit free gaps between listed blocks
//! - First/best/worst-fit placement over those gaps
//! - Bidirectional block iteration for diagnostics

mod allocator;
mod block;
mod heap;
mod iter;

pub use allocator::{BoundaryTagAllocator, BoundaryTagBuilder};
pub use block::{BoundaryBlock, HEADER_SIZE};
pub use iter::BoundaryBlocks;
