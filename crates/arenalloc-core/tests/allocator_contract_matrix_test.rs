use std::cell::Cell;
use std::rc::Rc;

use arenalloc_core::free_list::BLOCK_HEADER_SIZE as LIST_HEADER;
use arenalloc_core::slab::{BLOCK_HEADER_SIZE as SLAB_HEADER, PAGE_DESC_SIZE, PAGE_SIZE};
use arenalloc_core::{
    ARENA_HEADER_SIZE, AllocError, ArenaAllocator, ArenaPtr, Engine, EngineKind, Region,
};

/// Region that records how it was released.
struct TrackedRegion {
    bytes: Vec<u8>,
    releases: Rc<Cell<usize>>,
    released_len: Rc<Cell<usize>>,
    fail: bool,
}

impl TrackedRegion {
    fn new(len: usize, fail: bool) -> (Self, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let releases = Rc::new(Cell::new(0));
        let released_len = Rc::new(Cell::new(0));
        (
            Self {
                bytes: vec![0xCC; len],
                releases: Rc::clone(&releases),
                released_len: Rc::clone(&released_len),
                fail,
            },
            releases,
            released_len,
        )
    }
}

impl Region for TrackedRegion {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn release(self) -> Result<(), AllocError> {
        self.releases.set(self.releases.get() + 1);
        self.released_len.set(self.bytes.len());
        if self.fail {
            Err(AllocError::ReleaseFailure {
                reason: "provider refused".into(),
            })
        } else {
            Ok(())
        }
    }
}

const REGION: usize = ARENA_HEADER_SIZE + 8 * (PAGE_SIZE + PAGE_DESC_SIZE);

#[derive(Clone, Copy)]
struct Case {
    engine: EngineKind,
    /// Request size used for the pattern round-trip.
    size: usize,
    live: usize,
}

fn matrix_cases() -> Vec<Case> {
    let mut cases = Vec::new();
    for engine in EngineKind::ALL {
        for (size, live) in [(1, 64), (10, 40), (40, 64), (100, 30), (1000, 6), (4000, 3)] {
            cases.push(Case { engine, size, live });
        }
    }
    cases
}

fn pattern(i: usize, j: usize) -> u8 {
    (i.wrapping_mul(31) ^ j.wrapping_mul(7)) as u8
}

#[test]
fn pattern_round_trip_never_corrupts_neighbours() {
    for case in matrix_cases() {
        let mut a = Engine::create(case.engine, vec![0u8; REGION]).unwrap();
        let ptrs: Vec<ArenaPtr> = (0..case.live)
            .map(|_| a.alloc(case.size).unwrap())
            .collect();
        for (i, &p) in ptrs.iter().enumerate() {
            for (j, byte) in a.payload_mut(p, case.size).unwrap().iter_mut().enumerate() {
                *byte = pattern(i, j);
            }
        }
        // Free every other block, then write over a fresh allocation.
        for &p in ptrs.iter().step_by(2) {
            a.free(Some(p));
        }
        let fresh = a.alloc(case.size).unwrap();
        a.payload_mut(fresh, case.size).unwrap().fill(0xEE);

        for (i, &p) in ptrs.iter().enumerate().skip(1).step_by(2) {
            let got = a.payload(p, case.size).unwrap();
            assert!(
                got.iter().enumerate().all(|(j, &b)| b == pattern(i, j)),
                "engine={} size={} block {i} corrupted",
                case.engine,
                case.size
            );
        }
        a.destroy().unwrap();
    }
}

#[test]
fn requests_above_capacity_always_fail_with_oom() {
    for engine in EngineKind::ALL {
        let mut a = Engine::create(engine, vec![0u8; REGION]).unwrap();
        let cap = a.capacity();
        assert_eq!(cap, REGION - ARENA_HEADER_SIZE);
        for over in [cap + 1, cap + 4096, usize::MAX] {
            assert_eq!(
                a.alloc(over),
                Err(AllocError::OutOfMemory { requested: over }),
                "engine={engine}"
            );
        }
    }
}

#[test]
fn allocator_reports_engine_and_region() {
    for engine in EngineKind::ALL {
        let a = Engine::create(engine, vec![0u8; REGION]).unwrap();
        assert_eq!(a.engine(), engine);
        assert_eq!(a.region_size(), REGION);
    }
}

#[test]
fn free_list_reuse_and_coalescing_matrix() {
    let mut a = Engine::create(EngineKind::FreeList, vec![0u8; REGION]).unwrap();
    let p = a.alloc(100).unwrap();
    a.free(Some(p));
    assert_eq!(a.alloc(100).unwrap(), p);
    a.free(Some(p));

    for order in [[0, 2, 1], [2, 0, 1], [1, 0, 2], [0, 1, 2], [2, 1, 0], [1, 2, 0]] {
        let blocks: Vec<_> = (0..3).map(|_| a.alloc(50).unwrap()).collect();
        let fence = a.alloc(8).unwrap();
        assert_eq!(blocks[1].offset() - blocks[0].offset(), 50 + LIST_HEADER);
        for i in order {
            a.free(Some(blocks[i]));
        }
        let merged = a.alloc(150).unwrap();
        assert_eq!(merged, blocks[0], "free order {order:?}");
        a.free(Some(merged));
        a.free(Some(fence));
    }
}

#[test]
fn slab_stride_and_page_exhaustion_matrix() {
    let mut a = Engine::create(EngineKind::Slab, vec![0u8; REGION]).unwrap();
    let class = (10 + SLAB_HEADER).next_power_of_two();
    let per_page = PAGE_SIZE / class;
    let ptrs: Vec<_> = (0..=per_page).map(|_| a.alloc(10).unwrap()).collect();
    for pair in ptrs[..per_page].windows(2) {
        assert_eq!(pair[1].offset() - pair[0].offset(), class);
    }
    let first_page = ptrs[0].offset() - SLAB_HEADER;
    let last = ptrs[per_page].offset();
    assert!(ptrs[..per_page]
        .iter()
        .all(|p| (first_page..first_page + PAGE_SIZE).contains(&p.offset())));
    assert!(last >= first_page + PAGE_SIZE);
}

#[test]
fn slab_empty_pages_are_not_returned() {
    // Two pages: the first is carved small and emptied, the second taken
    // by a large class; a further large request has nowhere to go.
    let size = ARENA_HEADER_SIZE + 2 * (PAGE_SIZE + PAGE_DESC_SIZE);
    let mut a = Engine::create(EngineKind::Slab, vec![0u8; size]).unwrap();
    let small: Vec<_> = (0..10).map(|_| a.alloc(16).unwrap()).collect();
    for p in small {
        a.free(Some(p));
    }
    let big = a.alloc(3000).unwrap();
    assert!(a.block_capacity(big).unwrap() >= 3000);
    assert_eq!(a.alloc(3000), Err(AllocError::OutOfMemory { requested: 3000 }));
    // The emptied small page still serves its own class.
    assert!(a.alloc(16).is_ok());
}

#[test]
fn destroy_releases_the_whole_region_once() {
    for engine in EngineKind::ALL {
        let (region, releases, released_len) = TrackedRegion::new(REGION, false);
        let mut a = Engine::create(engine, region).unwrap();
        let p = a.alloc(64).unwrap();
        a.free(Some(p));
        assert_eq!(releases.get(), 0);
        a.destroy().unwrap();
        assert_eq!(releases.get(), 1);
        assert_eq!(released_len.get(), REGION);
    }
}

#[test]
fn release_failure_is_reported_and_allocator_is_consumed() {
    for engine in EngineKind::ALL {
        let (region, releases, _) = TrackedRegion::new(REGION, true);
        let a = Engine::create(engine, region).unwrap();
        let err = a.destroy().unwrap_err();
        assert_eq!(err.kind(), "release_failure");
        assert_eq!(releases.get(), 1);
    }
}

#[test]
fn create_accepts_arbitrary_initial_contents() {
    for engine in EngineKind::ALL {
        let (region, _, _) = TrackedRegion::new(REGION, false);
        let mut a = Engine::create(engine, region).unwrap();
        assert!(a.alloc(32).is_ok());
    }
}

#[test]
fn undersized_regions_are_invalid() {
    assert!(matches!(
        Engine::create(EngineKind::FreeList, vec![0u8; ARENA_HEADER_SIZE + LIST_HEADER - 1]),
        Err(AllocError::InvalidArgument { .. })
    ));
    assert!(matches!(
        Engine::create(EngineKind::Slab, vec![0u8; PAGE_SIZE - 1]),
        Err(AllocError::InvalidArgument { .. })
    ));
    assert!(Engine::create(EngineKind::FreeList, Vec::new()).is_err());
}
