//! Fixed-arena memory allocators
//!
//! This crate implements two allocators that each manage a single byte
//! region reserved once, at construction, from an upstream allocator:
//! - Boundary-tag allocator: an address-ordered, doubly linked list of
//!   occupied blocks; free space is whatever the list does not cover
//! - Buddy-system allocator: power-of-two blocks that split on allocation
//!   and merge with their buddy on release
//!
//! Both variants select among eligible free extents with a configurable
//! [`FitMode`], serialize every mutation behind a per-arena spin lock and
//! report through an optional [`log::Log`] sink.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

// Logging goes through the arena's own sink rather than the global logger.
// The format arguments are only built when a sink is attached.
macro_rules! debug {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.is_enabled() {
            $logger.debug(format_args!($($arg)*));
        }
    };
}
macro_rules! warn {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.is_enabled() {
            $logger.warn(format_args!($($arg)*));
        }
    };
}
macro_rules! error {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.is_enabled() {
            $logger.error(format_args!($($arg)*));
        }
    };
}

/// Machine word size; every in-band header is made of whole words.
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

/// Alignment requested from the upstream allocator for every arena.
pub(crate) const ARENA_ALIGN: usize = 16;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid construction size or unrecognized fit mode.
    InvalidParam,
    /// No free extent is large enough for the request.
    NoMemory,
    /// The pointer does not belong to a live block of this arena.
    InvalidAddress,
    /// Deallocate a block that is already free.
    DoubleFree,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::InvalidParam => "invalid parameter",
            AllocError::NoMemory => "out of memory",
            AllocError::InvalidAddress => "address is not a live block of this arena",
            AllocError::DoubleFree => "block is already free",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for AllocError {}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Snapshot of one block of an arena, as reported by
/// [`ArenaAllocator::blocks_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block size in bytes, metadata included.
    pub size: usize,
    pub occupied: bool,
}

/// Byte-granularity allocator over a single fixed arena.
///
/// Every method takes `&self`: implementors guard their arena with an
/// internal lock so one instance can be shared between threads.
pub trait ArenaAllocator {
    /// Allocate at least `size` bytes from the arena.
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Return a block previously handed out by [`alloc`](Self::alloc).
    fn dealloc(&self, ptr: NonNull<u8>) -> AllocResult;

    /// Current placement policy.
    fn fit_mode(&self) -> FitMode;

    /// Change the placement policy used by subsequent allocations.
    fn set_fit_mode(&self, mode: FitMode);

    /// Ordered description of the whole arena, first byte to last.
    fn blocks_info(&self) -> Vec<BlockInfo>;

    /// Returns the arena capacity in bytes.
    fn total_bytes(&self) -> usize;

    /// Returns the bytes covered by occupied blocks, metadata included.
    fn used_bytes(&self) -> usize;

    /// Returns the bytes not covered by occupied blocks.
    fn available_bytes(&self) -> usize {
        self.total_bytes() - self.used_bytes()
    }
}

/// Rounds `pos` up to `align`, or `None` on overflow.
#[inline]
const fn checked_align_up(pos: usize, align: usize) -> Option<usize> {
    match pos.checked_add(align - 1) {
        Some(end) => Some(end & !(align - 1)),
        None => None,
    }
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

mod arena;

pub mod fit;
pub use fit::{Extent, FitMode};

pub mod logging;
pub use logging::ArenaLogger;

pub mod upstream;
pub use upstream::{SystemUpstream, UpstreamAllocator};

pub mod stats;
pub use stats::{ArenaStats, MemoryStatsReporter};

pub mod boundary_tag;
pub use boundary_tag::{BoundaryBlock, BoundaryTagAllocator, BoundaryTagBuilder};

pub mod buddy;
pub use buddy::{BuddyAllocator, BuddyBlock, BuddyBuilder};
