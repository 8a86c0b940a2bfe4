//! Integration tests for the boundary-tag allocator

mod common;

use std::ptr::NonNull;
use std::sync::Arc;

use arena_allocator::boundary_tag::HEADER_SIZE;
use arena_allocator::{
    AllocError, ArenaAllocator, BlockInfo, BoundaryBlock, BoundaryTagAllocator, FitMode,
    WORD_SIZE,
};
use common::{assert_covers_arena, fill, holds, CountingUpstream, RecordingLogger};
use log::Level;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const P: usize = 4 * WORD_SIZE;
const H: usize = HEADER_SIZE;

fn addr(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr() as usize
}

/// Blocks must tile the arena without gaps or overlaps.
fn assert_tiles(allocator: &BoundaryTagAllocator) {
    let blocks: Vec<BoundaryBlock> = allocator.blocks().collect();
    let mut expected_offset = 0;
    for pair in blocks.windows(2) {
        assert!(
            pair[0].occupied || pair[1].occupied,
            "adjacent free gaps {:?}",
            pair
        );
    }
    for block in &blocks {
        assert_eq!(block.offset, expected_offset);
        assert!(block.size > 0);
        expected_offset = block.end();
    }
    assert_eq!(expected_offset, allocator.total_bytes());
}

#[test]
fn test_fit_modes_with_one_free_gap() {
    for mode in FitMode::ALL {
        let allocator = BoundaryTagAllocator::new(3 * (H + P), mode).unwrap();
        let a = allocator.alloc(P).unwrap();
        let b = allocator.alloc(P).unwrap();
        let c = allocator.alloc(P).unwrap();
        assert_eq!(addr(b) - addr(a), H + P);
        assert_eq!(addr(c) - addr(b), H + P);
        assert_eq!(allocator.alloc(1), Err(AllocError::NoMemory));

        allocator.dealloc(b).unwrap();
        let again = allocator.alloc(P).unwrap();
        assert_eq!(again, b, "{} must reuse the only gap", mode);
        assert_eq!(allocator.available_bytes(), 0);
    }
}

#[test]
fn test_fit_modes_choose_by_policy() {
    // [A:P][B:2P][C:P][D:P][E:P][tail: H+3P], then B and D are freed.
    let capacity = 6 * H + 9 * P;
    let place = |mode| {
        let allocator = BoundaryTagAllocator::new(capacity, mode).unwrap();
        let a = allocator.alloc(P).unwrap();
        let b = allocator.alloc(2 * P).unwrap();
        let _c = allocator.alloc(P).unwrap();
        let d = allocator.alloc(P).unwrap();
        let _e = allocator.alloc(P).unwrap();
        allocator.dealloc(b).unwrap();
        allocator.dealloc(d).unwrap();
        let base = addr(a) - H;
        let chosen = allocator.alloc(P).unwrap();
        (addr(chosen) - base - H, allocator)
    };

    let (offset, _) = place(FitMode::FirstFit);
    assert_eq!(offset, H + P);
    let (offset, _) = place(FitMode::BestFit);
    assert_eq!(offset, 3 * H + 4 * P);
    let (offset, allocator) = place(FitMode::WorstFit);
    assert_eq!(offset, 5 * H + 6 * P);
    assert_tiles(&allocator);
}

#[test]
fn test_capacity_exceeded() {
    let size = 64 * WORD_SIZE;
    let allocator = BoundaryTagAllocator::new(size, FitMode::FirstFit).unwrap();
    assert_eq!(allocator.alloc(size + 1), Err(AllocError::NoMemory));
    assert_eq!(allocator.alloc(size - H + 1), Err(AllocError::NoMemory));
    assert_eq!(allocator.alloc(usize::MAX), Err(AllocError::NoMemory));

    let whole = allocator.alloc(size - H).unwrap();
    assert_eq!(allocator.used_bytes(), size);
    allocator.dealloc(whole).unwrap();
}

#[test]
fn test_slack_smaller_than_header_is_granted() {
    let allocator = BoundaryTagAllocator::new(2 * (H + P) + H - WORD_SIZE, FitMode::FirstFit)
        .unwrap();
    allocator.alloc(P).unwrap();
    allocator.alloc(P).unwrap();
    assert_eq!(
        allocator.blocks_info(),
        [
            BlockInfo {
                size: H + P,
                occupied: true
            },
            BlockInfo {
                size: 2 * H + P - WORD_SIZE,
                occupied: true
            },
        ]
    );
}

#[test]
fn test_alloc_then_dealloc_restores_fresh_state() {
    let allocator = BoundaryTagAllocator::new(1024, FitMode::BestFit).unwrap();
    let fresh = allocator.blocks_info();
    assert_eq!(
        fresh,
        [BlockInfo {
            size: 1024,
            occupied: false
        }]
    );
    for size in [0, 1, 7, 100, 1024 - H] {
        let ptr = allocator.alloc(size).unwrap();
        allocator.dealloc(ptr).unwrap();
        assert_eq!(allocator.blocks_info(), fresh);
    }
}

#[test]
fn test_dealloc_invalid_addresses() {
    let allocator = BoundaryTagAllocator::new(16 * (H + P), FitMode::FirstFit).unwrap();
    let ptr = allocator.alloc(P).unwrap();
    let before = allocator.blocks_info();

    let inside = NonNull::new(unsafe { ptr.as_ptr().add(WORD_SIZE) }).unwrap();
    assert_eq!(allocator.dealloc(inside), Err(AllocError::InvalidAddress));
    let header = NonNull::new(unsafe { ptr.as_ptr().sub(H) }).unwrap();
    assert_eq!(allocator.dealloc(header), Err(AllocError::InvalidAddress));
    let mut outside = [0u8; 8];
    let outside = NonNull::new(outside.as_mut_ptr()).unwrap();
    assert_eq!(allocator.dealloc(outside), Err(AllocError::InvalidAddress));
    assert_eq!(allocator.blocks_info(), before);

    allocator.dealloc(ptr).unwrap();
    assert_eq!(allocator.dealloc(ptr), Err(AllocError::InvalidAddress));
}

#[test]
fn test_blocks_iterate_both_ways() {
    let allocator = BoundaryTagAllocator::new(5 * (H + P), FitMode::FirstFit).unwrap();
    let ptrs: Vec<_> = (0..4).map(|_| allocator.alloc(P).unwrap()).collect();
    allocator.dealloc(ptrs[1]).unwrap();
    allocator.dealloc(ptrs[2]).unwrap();

    let forward: Vec<_> = allocator.blocks().map(|b| (b.size, b.occupied)).collect();
    assert_eq!(
        forward,
        [
            (H + P, true),
            (2 * (H + P), false),
            (H + P, true),
            (H + P, false)
        ]
    );

    let mut backward: Vec<_> = allocator
        .blocks()
        .rev()
        .map(|b| (b.size, b.occupied))
        .collect();
    backward.reverse();
    assert_eq!(backward, forward);

    let mut blocks = allocator.blocks();
    assert_eq!(blocks.next().map(|b| b.offset), Some(0));
    assert_eq!(blocks.next_back().map(|b| b.offset), Some(4 * (H + P)));
    assert_eq!(blocks.next_back().map(|b| b.offset), Some(3 * (H + P)));
    assert_eq!(blocks.next().map(|b| b.offset), Some(H + P));
    assert_eq!(blocks.next(), None);
    assert_eq!(blocks.next_back(), None);
}

#[test]
fn test_clone_is_independent() {
    let upstream = Arc::new(CountingUpstream::default());
    let original = BoundaryTagAllocator::builder(8 * (H + P))
        .fit_mode(FitMode::WorstFit)
        .upstream(upstream.clone())
        .build()
        .unwrap();
    let kept = original.alloc(P).unwrap();
    fill(kept, P, 0xab);

    let copy = original.clone();
    assert_eq!(upstream.allocations(), 2);
    assert_eq!(copy.blocks_info(), original.blocks_info());
    assert_eq!(copy.fit_mode(), FitMode::WorstFit);

    // The copy owns its own bytes.
    let base = addr(kept) - H;
    let copied = copy.alloc(P).unwrap();
    assert!(addr(copied) < base || addr(copied) >= base + original.total_bytes());

    copy.set_fit_mode(FitMode::FirstFit);
    assert_eq!(original.fit_mode(), FitMode::WorstFit);
    assert_eq!(original.dealloc(copied), Err(AllocError::InvalidAddress));
    assert!(holds(kept, P, 0xab));

    drop(copy);
    assert_eq!(upstream.deallocations(), 1);
    original.dealloc(kept).unwrap();
    drop(original);
    assert_eq!(upstream.deallocations(), 2);
}

#[test]
fn test_logger_receives_records() {
    let logger = Arc::new(RecordingLogger::default());
    let allocator = BoundaryTagAllocator::builder(4 * (H + P))
        .logger(logger.clone())
        .build()
        .unwrap();
    logger.clear();

    let ptr = allocator.alloc(P).unwrap();
    allocator.dealloc(ptr).unwrap();
    assert_eq!(logger.count(Level::Error), 0);
    assert!(logger.count(Level::Debug) >= 4);
    assert!(logger
        .records()
        .iter()
        .all(|(_, target, _)| target == "arena_allocator::boundary_tag"));

    assert_eq!(allocator.alloc(8 * P), Err(AllocError::NoMemory));
    assert_eq!(allocator.dealloc(ptr), Err(AllocError::InvalidAddress));
    assert!(logger.count(Level::Error) >= 2);
}

/// Run a seeded alloc/dealloc sequence, checking invariants after every
/// step, and return the snapshot taken after each one.
fn random_sequence(mode: FitMode, seed: u64) -> Vec<Vec<BlockInfo>> {
    let capacity = 8192;
    let allocator = BoundaryTagAllocator::new(capacity, mode).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
    let mut history = Vec::new();

    for step in 0..2000 {
        if live.is_empty() || rng.gen_bool(0.55) {
            let size = rng.gen_range(1..=256);
            match allocator.alloc(size) {
                Ok(ptr) => {
                    let byte = (step % 251) as u8;
                    fill(ptr, size, byte);
                    assert!(live.iter().all(|&(other, _, _)| other != ptr));
                    live.push((ptr, size, byte));
                }
                Err(err) => assert_eq!(err, AllocError::NoMemory),
            }
        } else {
            let (ptr, size, byte) = live.swap_remove(rng.gen_range(0..live.len()));
            assert!(
                holds(ptr, size, byte),
                "payload at {:#x} was overwritten",
                addr(ptr)
            );
            allocator.dealloc(ptr).unwrap();
        }
        assert_covers_arena(&allocator);
        assert_tiles(&allocator);
        history.push(allocator.blocks_info());
    }

    for (ptr, size, byte) in live {
        assert!(holds(ptr, size, byte));
        allocator.dealloc(ptr).unwrap();
    }
    assert_eq!(
        allocator.blocks_info(),
        [BlockInfo {
            size: capacity,
            occupied: false
        }]
    );
    history
}

#[test]
fn test_random_sequence_keeps_invariants() {
    for mode in FitMode::ALL {
        random_sequence(mode, 0x5eed + mode as u64);
    }
}

#[test]
fn test_random_sequence_is_reproducible() {
    for mode in FitMode::ALL {
        assert_eq!(
            random_sequence(mode, 0x5eed),
            random_sequence(mode, 0x5eed),
            "{}",
            mode
        );
    }
}

#[cfg(feature = "tracking")]
#[test]
fn test_failure_dump_reports_arena_state() {
    let logger = Arc::new(RecordingLogger::default());
    let allocator = BoundaryTagAllocator::builder(4 * (H + P))
        .logger(logger.clone())
        .build()
        .unwrap();
    let ptr = allocator.alloc(P).unwrap();
    logger.clear();

    assert_eq!(allocator.alloc(8 * P), Err(AllocError::NoMemory));
    let errors: Vec<String> = logger
        .records()
        .into_iter()
        .filter(|(level, _, _)| *level == Level::Error)
        .map(|(_, _, message)| message)
        .collect();
    let expected = [
        format!("Request: {} bytes", 8 * P),
        format!("  Total bytes: {}", 4 * (H + P)),
        format!("  Used bytes: {} in 1 blocks", H + P),
        format!("  [{:#x}, {:#x}) occupied", 0, H + P),
        format!("  [{:#x}, {:#x}) free", H + P, 4 * (H + P)),
    ];
    for line in &expected {
        assert!(errors.contains(line), "missing {:?} in {:#?}", line, errors);
    }

    allocator.dealloc(ptr).unwrap();
}
