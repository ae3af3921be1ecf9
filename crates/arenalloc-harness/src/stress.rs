//! Multi-threaded stress driver.
//!
//! The engines are single-threaded; here one allocator is shared behind a
//! `parking_lot::Mutex` and every thread takes the lock for each call.
//! Each thread keeps a small window of live blocks filled with its own tag
//! byte and checks the tag before freeing.

use std::collections::VecDeque;

use arenalloc_core::{AllocError, ArenaAllocator, ArenaPtr, Engine, EngineKind};
use parking_lot::Mutex;

use crate::error::HarnessError;

/// Live blocks each worker holds at once.
const WINDOW: usize = 8;
/// Largest request a worker makes.
const MAX_REQUEST: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    pub engine: EngineKind,
    pub threads: usize,
    pub iterations: usize,
    pub region_size: usize,
}

/// Totals across all workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StressReport {
    pub allocations: usize,
    /// Requests refused with out-of-memory.
    pub exhausted: usize,
    pub frees: usize,
    /// Blocks whose tag bytes changed while live.
    pub corrupted: usize,
}

impl StressReport {
    fn merge(&mut self, other: Self) {
        self.allocations += other.allocations;
        self.exhausted += other.exhausted;
        self.frees += other.frees;
        self.corrupted += other.corrupted;
    }
}

struct Live {
    ptr: ArenaPtr,
    len: usize,
    tag: u8,
}

/// Run the stress workload. Corruption is reported in the returned totals.
pub fn run_stress(config: StressConfig) -> Result<StressReport, HarnessError> {
    if config.threads == 0 || config.iterations == 0 {
        return Err(HarnessError::InvalidArgument(
            "threads and iterations must be non-zero".into(),
        ));
    }
    let arena = Mutex::new(Engine::create(config.engine, vec![0u8; config.region_size])?);

    let tallies = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|worker| {
                let arena = &arena;
                scope.spawn(move || work(arena, worker, config.iterations))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle
                    .join()
                    .map_err(|_| HarnessError::WorkerPanicked(worker))?
            })
            .collect::<Result<Vec<_>, HarnessError>>()
    })?;

    let mut report = StressReport::default();
    for tally in tallies {
        report.merge(tally);
    }
    arena.into_inner().destroy()?;
    Ok(report)
}

fn work(
    arena: &Mutex<Engine<Vec<u8>>>,
    worker: usize,
    iterations: usize,
) -> Result<StressReport, HarnessError> {
    let mut tally = StressReport::default();
    let mut live = VecDeque::with_capacity(WINDOW);
    for i in 0..iterations {
        let len = 1 + (worker * 131 + i * 17) % MAX_REQUEST;
        let tag = (worker as u8).wrapping_mul(37) ^ (i as u8);

        let allocated = {
            let mut guard = arena.lock();
            match guard.alloc(len) {
                Ok(ptr) => {
                    guard.payload_mut(ptr, len)?.fill(tag);
                    Some(ptr)
                }
                Err(AllocError::OutOfMemory { .. }) => None,
                Err(err) => return Err(err.into()),
            }
        };
        match allocated {
            Some(ptr) => {
                tally.allocations += 1;
                live.push_back(Live { ptr, len, tag });
            }
            None => tally.exhausted += 1,
        }

        if (live.len() >= WINDOW || allocated.is_none())
            && let Some(block) = live.pop_front()
        {
            release(arena, block, &mut tally)?;
        }
    }
    while let Some(block) = live.pop_front() {
        release(arena, block, &mut tally)?;
    }
    Ok(tally)
}

fn release(
    arena: &Mutex<Engine<Vec<u8>>>,
    block: Live,
    tally: &mut StressReport,
) -> Result<(), HarnessError> {
    let mut guard = arena.lock();
    if guard.payload(block.ptr, block.len)?.iter().any(|&b| b != block.tag) {
        tally.corrupted += 1;
    }
    guard.free(Some(block.ptr));
    tally.frees += 1;
    Ok(())
}
