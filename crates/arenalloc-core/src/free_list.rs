//! First-fit free-list engine.
//!
//! The usable arena is one singly linked list of blocks in increasing
//! address order with no gaps. Each block starts with a
//! [`BLOCK_HEADER_SIZE`]-byte header `{ size, next, is_free }`; `size`
//! counts payload bytes only.
//!
//! `alloc` takes the first free block large enough and splits off the
//! tail when it can host another header plus at least one byte. `free`
//! marks the block free and then sweeps the *whole* list, merging every
//! run of adjacent free blocks. The sweep is O(n) in the number of blocks
//! for each call.

use crate::config::EngineKind;
use crate::contract::{ArenaAllocator, ArenaPtr, CreateArena};
use crate::error::AllocError;
use crate::region::Region;
use crate::view::{
    ARENA_HEADER_SIZE, ArenaHeader, ROOT_FIELD, WORD, read_flag, read_link, read_usize,
    write_flag, write_link, write_usize,
};

/// Bytes of metadata in front of every payload.
pub const BLOCK_HEADER_SIZE: usize = 3 * WORD;

const SIZE_FIELD: usize = 0;
const NEXT_FIELD: usize = WORD;
const IS_FREE_FIELD: usize = 2 * WORD;

/// Decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    /// Offset of the header itself.
    at: usize,
    size: usize,
    next: Option<usize>,
    is_free: bool,
}

/// One entry of [`FreeListAllocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub ptr: ArenaPtr,
    pub size: usize,
    pub is_free: bool,
}

/// Free-list allocator owning its region.
#[derive(Debug)]
pub struct FreeListAllocator<R: Region> {
    region: R,
    usable_size: usize,
}

impl<R: Region> FreeListAllocator<R> {
    fn head(&self) -> Result<Option<usize>, AllocError> {
        read_link(self.region.bytes(), ROOT_FIELD)
    }

    fn read_block(&self, at: usize) -> Result<Block, AllocError> {
        let bytes = self.region.bytes();
        Ok(Block {
            at,
            size: read_usize(bytes, at.saturating_add(SIZE_FIELD))?,
            next: read_link(bytes, at.saturating_add(NEXT_FIELD))?,
            is_free: read_flag(bytes, at.saturating_add(IS_FREE_FIELD))?,
        })
    }

    fn write_block(&mut self, block: &Block) -> Result<(), AllocError> {
        let bytes = self.region.bytes_mut();
        write_usize(bytes, block.at.saturating_add(SIZE_FIELD), block.size)?;
        write_link(bytes, block.at.saturating_add(NEXT_FIELD), block.next)?;
        write_flag(bytes, block.at.saturating_add(IS_FREE_FIELD), block.is_free)
    }

    fn header_of(&self, ptr: ArenaPtr) -> Result<usize, AllocError> {
        match ptr.header(BLOCK_HEADER_SIZE) {
            Some(at) if at >= ARENA_HEADER_SIZE => Ok(at),
            _ => Err(AllocError::invalid("pointer precedes the first block")),
        }
    }

    fn try_alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        if size > self.usable_size {
            return Err(AllocError::oom(size));
        }
        let mut cursor = self.head()?;
        while let Some(at) = cursor {
            let mut block = self.read_block(at)?;
            if block.is_free && block.size >= size {
                // Split only when the tail can hold a header and at least one byte.
                if block.size > size + BLOCK_HEADER_SIZE {
                    let tail = Block {
                        at: at + BLOCK_HEADER_SIZE + size,
                        size: block.size - size - BLOCK_HEADER_SIZE,
                        next: block.next,
                        is_free: true,
                    };
                    self.write_block(&tail)?;
                    block.size = size;
                    block.next = Some(tail.at);
                }
                block.is_free = false;
                self.write_block(&block)?;
                return Ok(ArenaPtr::from_offset(at + BLOCK_HEADER_SIZE));
            }
            cursor = block.next;
        }
        Err(AllocError::oom(size))
    }

    /// Merges every pair of adjacent free blocks, starting at the list head.
    ///
    /// The cursor does not advance after a merge, so a run of any length
    /// collapses into its first block. Returns the number of merges.
    pub fn coalesce(&mut self) -> Result<usize, AllocError> {
        let mut merges = 0;
        let mut cursor = self.head()?;
        while let Some(at) = cursor {
            let mut block = self.read_block(at)?;
            let Some(next_at) = block.next else { break };
            let next = self.read_block(next_at)?;
            if block.is_free && next.is_free {
                block.size = block
                    .size
                    .checked_add(BLOCK_HEADER_SIZE + next.size)
                    .ok_or(AllocError::invalid("block size overflow while coalescing"))?;
                block.next = next.next;
                self.write_block(&block)?;
                merges += 1;
            } else {
                cursor = Some(next_at);
            }
        }
        Ok(merges)
    }

    /// Snapshot of the block list in address order.
    pub fn blocks(&self) -> Result<Vec<BlockInfo>, AllocError> {
        let mut out = Vec::new();
        let mut cursor = self.head()?;
        while let Some(at) = cursor {
            let block = self.read_block(at)?;
            out.push(BlockInfo {
                ptr: ArenaPtr::from_offset(at + BLOCK_HEADER_SIZE),
                size: block.size,
                is_free: block.is_free,
            });
            cursor = block.next;
        }
        Ok(out)
    }

    /// Payload bytes currently on free blocks.
    pub fn free_bytes(&self) -> Result<usize, AllocError> {
        Ok(self
            .blocks()?
            .iter()
            .filter(|b| b.is_free)
            .map(|b| b.size)
            .sum())
    }
}

impl<R: Region> ArenaAllocator<R> for FreeListAllocator<R> {
    fn engine(&self) -> EngineKind {
        EngineKind::FreeList
    }

    fn alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        self.try_alloc(size)
    }

    fn free(&mut self, ptr: Option<ArenaPtr>) {
        let Some(ptr) = ptr else { return };
        let Ok(at) = self.header_of(ptr) else { return };
        if write_flag(self.region.bytes_mut(), at.saturating_add(IS_FREE_FIELD), true).is_err() {
            return;
        }
        // Corrupt metadata ends the sweep early.
        self.coalesce().ok();
    }

    fn capacity(&self) -> usize {
        self.usable_size
    }

    fn block_capacity(&self, ptr: ArenaPtr) -> Result<usize, AllocError> {
        let at = self.header_of(ptr)?;
        read_usize(self.region.bytes(), at.saturating_add(SIZE_FIELD))
    }

    fn region(&self) -> &R {
        &self.region
    }

    fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    fn into_region(self) -> R {
        self.region
    }
}

impl<R: Region> CreateArena<R> for FreeListAllocator<R> {
    const ENGINE: EngineKind = EngineKind::FreeList;

    fn create(mut region: R) -> Result<Self, AllocError> {
        let region_size = region.len();
        if region_size < ARENA_HEADER_SIZE + BLOCK_HEADER_SIZE {
            return Err(AllocError::invalid(
                "region cannot hold the arena header and one block",
            ));
        }
        let usable_size = region_size - ARENA_HEADER_SIZE;
        let header = ArenaHeader {
            engine: Self::ENGINE,
            region_size,
            usable_size,
            root: Some(ARENA_HEADER_SIZE),
            aux: None,
        };
        header.write(region.bytes_mut())?;
        let mut allocator = Self {
            region,
            usable_size,
        };
        allocator.write_block(&Block {
            at: ARENA_HEADER_SIZE,
            size: usable_size - BLOCK_HEADER_SIZE,
            next: None,
            is_free: true,
        })?;
        Ok(allocator)
    }

    fn attach(region: R) -> Result<Self, AllocError> {
        let header = ArenaHeader::expect(region.bytes(), Self::ENGINE)?;
        if header.root.is_none() {
            return Err(AllocError::invalid("free list has no head block"));
        }
        Ok(Self {
            region,
            usable_size: header.usable_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA: usize = 64 * 1024;

    fn fresh() -> FreeListAllocator<Vec<u8>> {
        FreeListAllocator::create(vec![0u8; ARENA]).unwrap()
    }

    #[test]
    fn create_spans_usable_space_with_one_free_block() {
        let a = fresh();
        assert_eq!(a.capacity(), ARENA - ARENA_HEADER_SIZE);
        let blocks = a.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_free);
        assert_eq!(blocks[0].size, ARENA - ARENA_HEADER_SIZE - BLOCK_HEADER_SIZE);
        assert_eq!(
            blocks[0].ptr.offset(),
            ARENA_HEADER_SIZE + BLOCK_HEADER_SIZE
        );
    }

    #[test]
    fn create_rejects_tiny_region() {
        let err = FreeListAllocator::create(vec![0u8; ARENA_HEADER_SIZE]).unwrap_err();
        assert!(matches!(err, AllocError::InvalidArgument { .. }));
        assert!(FreeListAllocator::create(Vec::<u8>::new()).is_err());
    }

    #[test]
    fn alloc_splits_and_returns_first_fit() {
        let mut a = fresh();
        let p1 = a.alloc(100).unwrap();
        let p2 = a.alloc(200).unwrap();
        assert_eq!(p1.offset(), ARENA_HEADER_SIZE + BLOCK_HEADER_SIZE);
        assert_eq!(p2.offset(), p1.offset() + 100 + BLOCK_HEADER_SIZE);
        let blocks = a.blocks().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!((blocks[0].size, blocks[0].is_free), (100, false));
        assert_eq!((blocks[1].size, blocks[1].is_free), (200, false));
        assert!(blocks[2].is_free);
    }

    #[test]
    fn no_split_when_tail_cannot_hold_header_plus_one_byte() {
        let mut a = fresh();
        let p1 = a.alloc(100).unwrap();
        let p2 = a.alloc(100).unwrap();
        let _guard = a.alloc(8).unwrap();
        a.free(Some(p1));
        a.free(Some(p2));
        // p1 absorbed p2: 100 + 24 + 100 payload bytes.
        let merged = 200 + BLOCK_HEADER_SIZE;
        assert_eq!(a.block_capacity(p1).unwrap(), merged);
        assert_eq!(a.blocks().unwrap().len(), 3);

        // Slack of exactly one header is not worth a split.
        let q = a.alloc(merged - BLOCK_HEADER_SIZE).unwrap();
        assert_eq!(q, p1);
        assert_eq!(a.block_capacity(q).unwrap(), merged);
        assert_eq!(a.blocks().unwrap().len(), 3);
        a.free(Some(q));

        // One more byte of slack is.
        let r = a.alloc(merged - BLOCK_HEADER_SIZE - 1).unwrap();
        assert_eq!(r, p1);
        assert_eq!(a.block_capacity(r).unwrap(), merged - BLOCK_HEADER_SIZE - 1);
        let blocks = a.blocks().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!((blocks[1].size, blocks[1].is_free), (1, true));
    }

    #[test]
    fn reuse_after_free_returns_same_offset() {
        let mut a = fresh();
        let p = a.alloc(100).unwrap();
        a.free(Some(p));
        assert_eq!(a.alloc(100).unwrap(), p);
    }

    #[test]
    fn coalescing_sweep_is_order_independent() {
        let mut a = fresh();
        let first = a.alloc(50).unwrap();
        let second = a.alloc(50).unwrap();
        let third = a.alloc(50).unwrap();
        let _fence = a.alloc(50).unwrap();

        a.free(Some(first));
        a.free(Some(third));
        a.free(Some(second));

        let merged = a.alloc(150).unwrap();
        assert_eq!(merged, first);
    }

    #[test]
    fn free_collapses_runs_anywhere_in_the_list() {
        let mut a = fresh();
        let ptrs: Vec<_> = (0..6).map(|_| a.alloc(32).unwrap()).collect();
        // Make two separate free runs whose blocks are marked free directly,
        // then free an unrelated block: one sweep merges both runs.
        for &p in &[ptrs[0], ptrs[1], ptrs[3], ptrs[4]] {
            let at = p.offset() - BLOCK_HEADER_SIZE;
            write_flag(a.region.bytes_mut(), at.saturating_add(IS_FREE_FIELD), true).unwrap();
        }
        a.free(Some(ptrs[5]));
        let blocks = a.blocks().unwrap();
        let shape: Vec<_> = blocks.iter().map(|b| b.is_free).collect();
        assert_eq!(shape, vec![true, false, true]);
        assert_eq!(blocks[0].size, 32 + BLOCK_HEADER_SIZE + 32);
    }

    #[test]
    fn freeing_everything_restores_one_block() {
        let mut a = fresh();
        let ptrs: Vec<_> = (1..=10).map(|n| a.alloc(n * 17).unwrap()).collect();
        for p in ptrs.into_iter().rev() {
            a.free(Some(p));
        }
        let blocks = a.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(a.free_bytes().unwrap(), a.capacity() - BLOCK_HEADER_SIZE);
    }

    #[test]
    fn oversized_request_is_out_of_memory() {
        let mut a = fresh();
        let cap = a.capacity();
        assert_eq!(a.alloc(cap + 1), Err(AllocError::oom(cap + 1)));
        // The largest single payload is capacity minus one block header.
        assert!(a.alloc(cap).is_err());
        assert!(a.alloc(cap - BLOCK_HEADER_SIZE).is_ok());
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut a = FreeListAllocator::create(vec![0u8; 1024]).unwrap();
        let mut count = 0;
        while a.alloc(64).is_ok() {
            count += 1;
        }
        assert!(count > 0);
        assert_eq!(a.alloc(64), Err(AllocError::oom(64)));
    }

    #[test]
    fn free_none_and_wild_offsets_are_ignored() {
        let mut a = fresh();
        let p = a.alloc(10).unwrap();
        a.free(None);
        a.free(Some(ArenaPtr::from_offset(3)));
        a.free(Some(ArenaPtr::from_offset(usize::MAX)));
        assert!(!a.blocks().unwrap()[0].is_free);
        assert_eq!(a.blocks().unwrap()[0].ptr, p);
    }

    #[test]
    fn zero_size_alloc_returns_empty_block() {
        let mut a = fresh();
        let p = a.alloc(0).unwrap();
        assert_eq!(a.block_capacity(p).unwrap(), 0);
        let q = a.alloc(1).unwrap();
        assert_eq!(q.offset(), p.offset() + BLOCK_HEADER_SIZE);
    }

    #[test]
    fn attach_sees_existing_blocks() {
        let mut a = fresh();
        let p = a.alloc(300).unwrap();
        a.payload_mut(p, 300).unwrap().fill(0x5A);
        let region = a.into_region();
        let mut b = FreeListAllocator::attach(region).unwrap();
        assert_eq!(b.block_capacity(p).unwrap(), 300);
        assert!(b.payload(p, 300).unwrap().iter().all(|&x| x == 0x5A));
        b.free(Some(p));
        assert_eq!(b.blocks().unwrap().len(), 1);
    }

    #[test]
    fn attach_rejects_slab_arena() {
        let slab = crate::slab::SlabAllocator::create(vec![0u8; 16 * 1024]).unwrap();
        let err = FreeListAllocator::attach(slab.into_region()).unwrap_err();
        assert!(matches!(err, AllocError::InvalidArgument { .. }));
    }
}
