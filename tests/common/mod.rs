//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use arena_allocator::{AllocResult, ArenaAllocator, BlockInfo, SystemUpstream, UpstreamAllocator};
use log::{Level, Log, Metadata, Record};

/// Log sink that keeps every record it receives.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(Level, String, String)>>,
}

impl RecordingLogger {
    /// `(level, target, message)` of every record so far.
    pub fn records(&self) -> Vec<(Level, String, String)> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl Log for RecordingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records.lock().unwrap().push((
            record.level(),
            record.target().to_string(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

/// Upstream that counts the regions it hands out and takes back.
#[derive(Default)]
pub struct CountingUpstream {
    pub allocations: AtomicUsize,
    pub deallocations: AtomicUsize,
}

impl CountingUpstream {
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }
}

impl UpstreamAllocator for CountingUpstream {
    fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        SystemUpstream.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        SystemUpstream.deallocate(ptr, layout)
    }
}

/// Sum of all block sizes in a snapshot.
pub fn snapshot_total(blocks: &[BlockInfo]) -> usize {
    blocks.iter().map(|block| block.size).sum()
}

/// Fill `len` bytes at `ptr` with `byte`.
pub fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), byte, len) };
}

/// Whether all `len` bytes at `ptr` still hold `byte`.
pub fn holds(ptr: NonNull<u8>, len: usize, byte: u8) -> bool {
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
        .iter()
        .all(|&b| b == byte)
}

/// Assert the snapshot of `allocator` covers exactly its capacity.
pub fn assert_covers_arena<A: ArenaAllocator + ?Sized>(allocator: &A) {
    let blocks = allocator.blocks_info();
    assert_eq!(snapshot_total(&blocks), allocator.total_bytes());
    let used: usize = blocks.iter().filter(|b| b.occupied).map(|b| b.size).sum();
    assert_eq!(used, allocator.used_bytes());
}
