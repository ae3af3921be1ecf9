//! Scripted allocator scenarios.
//!
//! The first five replay the classic demonstration sequence (small block,
//! large block, reuse, oversize rejection, several live blocks). The rest
//! check engine-specific placement properties.

use arenalloc_core::slab::{BLOCK_HEADER_SIZE as SLAB_HEADER, PAGE_DESC_SIZE, PAGE_SIZE};
use arenalloc_core::{
    ARENA_HEADER_SIZE, AllocError, ArenaAllocator, ArenaPtr, CreateArena, Engine, EngineKind,
    FreeListAllocator, SlabAllocator,
};

use crate::error::HarnessError;
use crate::structured_log::{LogEntry, LogLevel, Outcome};

/// Region size used when none is given: one mebibyte.
pub const DEFAULT_REGION_SIZE: usize = 1024 * 1024;

type Heap = Vec<u8>;
type ScenarioFn = fn(&mut ScenarioContext) -> Result<(), HarnessError>;

const BOTH: &[EngineKind] = &EngineKind::ALL;
const FREE_LIST: &[EngineKind] = &[EngineKind::FreeList];
const SLAB: &[EngineKind] = &[EngineKind::Slab];

/// A named check run against one engine.
pub struct Scenario {
    pub name: &'static str,
    /// Engines the scenario applies to.
    pub engines: &'static [EngineKind],
    run: ScenarioFn,
}

impl Scenario {
    pub fn run(&self, ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
        (self.run)(ctx)
    }

    #[must_use]
    pub fn applies_to(&self, engine: EngineKind) -> bool {
        self.engines.contains(&engine)
    }
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario { name: "basic_alloc_free", engines: BOTH, run: basic_alloc_free },
    Scenario { name: "large_block", engines: BOTH, run: large_block },
    Scenario { name: "reuse_after_free", engines: BOTH, run: reuse_after_free },
    Scenario { name: "oversize_rejected", engines: BOTH, run: oversize_rejected },
    Scenario { name: "multiple_blocks", engines: BOTH, run: multiple_blocks },
    Scenario { name: "pattern_round_trip", engines: BOTH, run: pattern_round_trip },
    Scenario { name: "reuse_address", engines: FREE_LIST, run: reuse_address },
    Scenario { name: "coalescing_sweep", engines: FREE_LIST, run: coalescing_sweep },
    Scenario { name: "power_of_two_stride", engines: SLAB, run: power_of_two_stride },
    Scenario { name: "page_exhaustion", engines: SLAB, run: page_exhaustion },
    Scenario { name: "empty_pages_not_returned", engines: SLAB, run: empty_pages_not_returned },
];

/// Scenarios that apply to `engine`, in run order.
pub fn scenarios_for(engine: EngineKind) -> impl Iterator<Item = &'static Scenario> {
    SCENARIOS.iter().filter(move |s| s.applies_to(engine))
}

/// Per-scenario state: which engine to build and the events recorded so far.
pub struct ScenarioContext {
    engine: EngineKind,
    region_size: usize,
    scenario: &'static str,
    events: Vec<LogEntry>,
}

impl ScenarioContext {
    #[must_use]
    pub fn new(engine: EngineKind, region_size: usize, scenario: &'static str) -> Self {
        Self {
            engine,
            region_size,
            scenario,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_events(self) -> Vec<LogEntry> {
        self.events
    }

    fn entry(&self, level: LogLevel, event: &str) -> LogEntry {
        LogEntry::new("", level, event)
            .with_engine(self.engine.name())
            .with_scenario(self.scenario)
    }

    fn record(&mut self, entry: LogEntry) {
        self.events.push(entry);
    }

    /// Arena of the configured engine over a zeroed heap region.
    fn create(&mut self) -> Result<Engine<Heap>, HarnessError> {
        let size = self.region_size;
        let engine = self.engine;
        self.created(size, Engine::create(engine, vec![0u8; size]))
    }

    /// Arena of a concrete engine type, for scenarios that inspect its layout.
    fn create_as<A: CreateArena<Heap>>(&mut self, size: usize) -> Result<A, HarnessError> {
        self.created(size, A::create(vec![0u8; size]))
    }

    fn created<A>(
        &mut self,
        size: usize,
        result: Result<A, AllocError>,
    ) -> Result<A, HarnessError> {
        let entry = self.entry(LogLevel::Debug, "arena_create").with_symbol("create").with_size(size);
        match result {
            Ok(arena) => {
                self.record(entry.with_outcome(Outcome::Pass));
                Ok(arena)
            }
            Err(err) => {
                self.record(failure(entry, &err));
                Err(err.into())
            }
        }
    }

    /// Allocation whose failure is an expected result, not an error.
    fn try_alloc<A: ArenaAllocator<Heap>>(
        &mut self,
        arena: &mut A,
        size: usize,
    ) -> Result<ArenaPtr, AllocError> {
        let result = arena.alloc(size);
        let entry = self.entry(LogLevel::Debug, "alloc").with_symbol("alloc").with_size(size);
        let entry = match &result {
            Ok(ptr) => entry.with_offset(ptr.offset()).with_outcome(Outcome::Pass),
            Err(err) => failure(entry, err),
        };
        self.record(entry);
        result
    }

    fn alloc<A: ArenaAllocator<Heap>>(
        &mut self,
        arena: &mut A,
        size: usize,
    ) -> Result<ArenaPtr, HarnessError> {
        Ok(self.try_alloc(arena, size)?)
    }

    fn free<A: ArenaAllocator<Heap>>(&mut self, arena: &mut A, ptr: ArenaPtr) {
        arena.free(Some(ptr));
        let entry = self
            .entry(LogLevel::Debug, "free")
            .with_symbol("free")
            .with_offset(ptr.offset())
            .with_outcome(Outcome::Pass);
        self.record(entry);
    }

    fn destroy<A: ArenaAllocator<Heap>>(&mut self, arena: A) -> Result<(), HarnessError> {
        let result = arena.destroy();
        let entry = self.entry(LogLevel::Debug, "arena_destroy").with_symbol("destroy");
        let entry = match &result {
            Ok(()) => entry.with_outcome(Outcome::Pass),
            Err(err) => failure(entry, err),
        };
        self.record(entry);
        Ok(result?)
    }

    fn check(&self, cond: bool, reason: impl FnOnce() -> String) -> Result<(), HarnessError> {
        if cond {
            Ok(())
        } else {
            Err(HarnessError::CheckFailed {
                scenario: self.scenario,
                reason: reason(),
            })
        }
    }
}

fn failure(entry: LogEntry, err: &AllocError) -> LogEntry {
    entry
        .with_outcome(Outcome::Fail)
        .with_details(serde_json::json!({ "error": err.kind(), "message": err.to_string() }))
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

const INT: usize = size_of::<i32>();

fn write_int<A: ArenaAllocator<Heap>>(
    arena: &mut A,
    ptr: ArenaPtr,
    index: usize,
    value: i32,
) -> Result<(), HarnessError> {
    let bytes = arena.payload_mut(ptr, (index + 1) * INT)?;
    bytes[index * INT..].copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

fn read_int<A: ArenaAllocator<Heap>>(
    arena: &A,
    ptr: ArenaPtr,
    index: usize,
) -> Result<i32, HarnessError> {
    let bytes = arena.payload(ptr, (index + 1) * INT)?;
    let mut word = [0u8; INT];
    word.copy_from_slice(&bytes[index * INT..]);
    Ok(i32::from_ne_bytes(word))
}

/// Allocates `count` ints, stores `first` and `last` at both ends and
/// reads them back.
fn int_block<A: ArenaAllocator<Heap>>(
    ctx: &mut ScenarioContext,
    arena: &mut A,
    count: usize,
    first: i32,
    last: i32,
) -> Result<ArenaPtr, HarnessError> {
    let ptr = ctx.alloc(arena, count * INT)?;
    write_int(arena, ptr, 0, first)?;
    write_int(arena, ptr, count - 1, last)?;
    let got = (read_int(arena, ptr, 0)?, read_int(arena, ptr, count - 1)?);
    ctx.check(got == (first, last), || {
        format!("expected ({first}, {last}) at both ends, read {got:?}")
    })?;
    Ok(ptr)
}

fn pattern(i: usize, j: usize) -> u8 {
    (i.wrapping_mul(31) ^ j.wrapping_mul(7)) as u8
}

// ---------------------------------------------------------------------------
// Demonstration sequence
// ---------------------------------------------------------------------------

fn basic_alloc_free(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena = ctx.create()?;
    let a = int_block(ctx, &mut arena, 10, 13, 19)?;
    ctx.free(&mut arena, a);
    ctx.destroy(arena)
}

fn large_block(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena = ctx.create()?;
    let b = int_block(ctx, &mut arena, 1000, 42, 24)?;
    ctx.free(&mut arena, b);
    ctx.destroy(arena)
}

fn reuse_after_free(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena = ctx.create()?;
    let a = int_block(ctx, &mut arena, 10, 13, 19)?;
    ctx.free(&mut arena, a);
    let c = int_block(ctx, &mut arena, 5, 7, 14)?;
    ctx.free(&mut arena, c);
    ctx.destroy(arena)
}

fn oversize_rejected(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena = ctx.create()?;
    for size in [arena.region_size() + 1, arena.capacity() + 1] {
        let result = ctx.try_alloc(&mut arena, size);
        ctx.check(
            result == Err(AllocError::OutOfMemory { requested: size }),
            || format!("alloc({size}) returned {result:?}, expected out of memory"),
        )?;
    }
    // The arena stays usable after a rejected request.
    let p = ctx.alloc(&mut arena, 16)?;
    ctx.free(&mut arena, p);
    ctx.destroy(arena)
}

fn multiple_blocks(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena = ctx.create()?;
    let e = int_block(ctx, &mut arena, 10, 1, 11)?;
    let f = int_block(ctx, &mut arena, 20, 2, 22)?;
    let (lo, hi, lo_len) = if e < f { (e, f, 10 * INT) } else { (f, e, 20 * INT) };
    ctx.check(lo.offset() + lo_len <= hi.offset(), || {
        format!("blocks at {} and {} overlap", lo.offset(), hi.offset())
    })?;
    let got = (read_int(&arena, e, 0)?, read_int(&arena, f, 0)?);
    ctx.check(got == (1, 2), || format!("neighbour write leaked: {got:?}"))?;
    ctx.free(&mut arena, e);
    ctx.free(&mut arena, f);
    ctx.destroy(arena)
}

// ---------------------------------------------------------------------------
// Properties shared by both engines
// ---------------------------------------------------------------------------

fn pattern_round_trip(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    const LIVE: usize = 16;
    const SIZE: usize = 48;
    let mut arena = ctx.create()?;
    let mut ptrs = Vec::with_capacity(LIVE);
    for i in 0..LIVE {
        let p = ctx.alloc(&mut arena, SIZE)?;
        for (j, byte) in arena.payload_mut(p, SIZE)?.iter_mut().enumerate() {
            *byte = pattern(i, j);
        }
        ptrs.push(p);
    }
    for &p in ptrs.iter().step_by(2) {
        ctx.free(&mut arena, p);
    }
    let fresh = ctx.alloc(&mut arena, SIZE)?;
    arena.payload_mut(fresh, SIZE)?.fill(0xEE);

    for (i, &p) in ptrs.iter().enumerate().skip(1).step_by(2) {
        let intact = arena
            .payload(p, SIZE)?
            .iter()
            .enumerate()
            .all(|(j, &b)| b == pattern(i, j));
        ctx.check(intact, || format!("block {i} at {} corrupted", p.offset()))?;
    }
    ctx.destroy(arena)
}

// ---------------------------------------------------------------------------
// Free-list placement
// ---------------------------------------------------------------------------

fn reuse_address(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena: FreeListAllocator<Heap> = ctx.create_as(ctx.region_size)?;
    let first = ctx.alloc(&mut arena, 100)?;
    ctx.free(&mut arena, first);
    let second = ctx.alloc(&mut arena, 100)?;
    ctx.check(first == second, || {
        format!("reallocated at {}, first was {}", second.offset(), first.offset())
    })?;
    ctx.destroy(arena)
}

fn coalescing_sweep(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena: FreeListAllocator<Heap> = ctx.create_as(ctx.region_size)?;
    let blocks = [
        ctx.alloc(&mut arena, 50)?,
        ctx.alloc(&mut arena, 50)?,
        ctx.alloc(&mut arena, 50)?,
    ];
    let fence = ctx.alloc(&mut arena, 8)?;
    for i in [0, 2, 1] {
        ctx.free(&mut arena, blocks[i]);
    }
    let merged = ctx.alloc(&mut arena, 150)?;
    ctx.check(merged == blocks[0], || {
        format!("alloc(150) landed at {}, expected {}", merged.offset(), blocks[0].offset())
    })?;
    ctx.free(&mut arena, merged);
    ctx.free(&mut arena, fence);
    let remaining = arena.blocks()?;
    ctx.check(remaining.len() == 1 && remaining[0].is_free, || {
        format!("expected one free block after freeing everything, got {remaining:?}")
    })?;
    ctx.destroy(arena)
}

// ---------------------------------------------------------------------------
// Slab placement
// ---------------------------------------------------------------------------

fn power_of_two_stride(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena: SlabAllocator<Heap> = ctx.create_as(ctx.region_size)?;
    let class = (10 + SLAB_HEADER).next_power_of_two();
    let per_page = PAGE_SIZE / class;
    let mut prev = ctx.alloc(&mut arena, 10)?;
    for _ in 1..per_page {
        let next = ctx.alloc(&mut arena, 10)?;
        ctx.check(next.offset() == prev.offset() + class, || {
            format!("stride {} != block size {class}", next.offset().wrapping_sub(prev.offset()))
        })?;
        prev = next;
    }
    ctx.destroy(arena)
}

fn page_exhaustion(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let mut arena: SlabAllocator<Heap> = ctx.create_as(ctx.region_size)?;
    // 40 bytes plus the header rounds to 64, so 64 blocks per page.
    let mut pages = Vec::with_capacity(65);
    for _ in 0..65 {
        let p = ctx.alloc(&mut arena, 40)?;
        pages.push(arena.page_of(p));
    }
    let first = pages[0];
    ctx.check(first.is_some() && pages[..64].iter().all(|&p| p == first), || {
        format!("first 64 blocks spread over pages {pages:?}")
    })?;
    ctx.check(pages[64].is_some() && pages[64] != first, || {
        format!("65th block stayed on page {:?}", pages[64])
    })?;
    ctx.destroy(arena)
}

fn empty_pages_not_returned(ctx: &mut ScenarioContext) -> Result<(), HarnessError> {
    let size = ARENA_HEADER_SIZE + 2 * (PAGE_SIZE + PAGE_DESC_SIZE);
    let mut arena: SlabAllocator<Heap> = ctx.create_as(size)?;
    let small: Vec<_> = (0..10)
        .map(|_| ctx.alloc(&mut arena, 16))
        .collect::<Result<_, _>>()?;
    for p in small {
        ctx.free(&mut arena, p);
    }
    let carved = arena.carved_pages()?;
    ctx.check(carved.len() == 1, || format!("expected one carved page, got {carved:?}"))?;

    // The last pristine page takes the large class; nothing is left for a second one.
    let big = ctx.alloc(&mut arena, 3000)?;
    let second = ctx.try_alloc(&mut arena, 3000);
    ctx.check(second == Err(AllocError::OutOfMemory { requested: 3000 }), || {
        format!("emptied small page was reused: {second:?}")
    })?;
    ctx.free(&mut arena, big);
    ctx.destroy(arena)
}
