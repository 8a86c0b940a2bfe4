//! Buddy allocator module
//!
//! This module provides a buddy system over a single power-of-two arena:
//! - One-word in-band headers packing occupancy and order
//! - Split on allocation, buddy merging on release
//! - First/best/worst-fit placement over an address-ordered walk
//! - Double-free detection

pub mod buddy_allocator;
pub mod buddy_block;
mod buddy_set;
mod iter;

pub use buddy_allocator::{BuddyAllocator, BuddyBuilder};
pub use buddy_block::{BuddyBlock, HEADER_SIZE, MAX_ORDER, MIN_ORDER};
pub use iter::BuddyBlocks;
