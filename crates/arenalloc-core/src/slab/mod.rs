//! Slab/page engine.
//!
//! The arena is cut into fixed [`PAGE_SIZE`] pages. A page stays on the
//! free-page list until some request first needs it; it is then carved
//! into equal power-of-two blocks, moved to the carved-page list, and
//! never returns to the free-page list, even once all its blocks are free
//! again. A fully free page therefore keeps its size class for the rest
//! of the arena's life.
//!
//! Allocation searches carved pages first, in the order they were claimed,
//! for a free block of at least the requested class. Only when none
//! exists is a pristine page claimed and carved.

pub mod page;
pub mod size_class;

pub use page::{PAGE_DESC_SIZE, PageGeometry};
pub use size_class::{BLOCK_HEADER_SIZE, MAX_PAYLOAD, MIN_BLOCK_SIZE, PAGE_SIZE};

use crate::config::EngineKind;
use crate::contract::{ArenaAllocator, ArenaPtr, CreateArena};
use crate::error::AllocError;
use crate::region::Region;
use crate::view::{
    ARENA_HEADER_SIZE, AUX_FIELD, ArenaHeader, ROOT_FIELD, WORD, read_flag, read_link,
    read_usize, write_flag, write_link, write_usize,
};
use page::PageDesc;

const BLOCK_SIZE_FIELD: usize = 0;
const NEXT_FREE_FIELD: usize = WORD;
const IS_FREE_FIELD: usize = 2 * WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlabBlock {
    at: usize,
    block_size: usize,
    next_free: Option<usize>,
    is_free: bool,
}

/// One carved page, as reported by [`SlabAllocator::carved_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub index: usize,
    /// Offset of the page's first byte.
    pub start: usize,
    /// Size class every block in this page shares.
    pub block_size: usize,
    /// Blocks currently on the page's free list.
    pub free_blocks: usize,
}

/// Slab allocator owning its region.
#[derive(Debug)]
pub struct SlabAllocator<R: Region> {
    region: R,
    usable_size: usize,
    geometry: PageGeometry,
}

impl<R: Region> SlabAllocator<R> {
    fn free_pages_head(&self) -> Result<Option<usize>, AllocError> {
        read_link(self.region.bytes(), ROOT_FIELD)
    }

    fn carved_head(&self) -> Result<Option<usize>, AllocError> {
        read_link(self.region.bytes(), AUX_FIELD)
    }

    fn read_page(&self, at: usize) -> Result<PageDesc, AllocError> {
        self.geometry.index_of_desc(at)?;
        PageDesc::read(self.region.bytes(), at)
    }

    fn write_page(&mut self, page: &PageDesc) -> Result<(), AllocError> {
        page.write(self.region.bytes_mut())
    }

    fn page_index(&self, page: &PageDesc) -> Result<usize, AllocError> {
        self.geometry.index_of_desc(page.at)
    }

    fn read_block(&self, at: usize) -> Result<SlabBlock, AllocError> {
        let bytes = self.region.bytes();
        Ok(SlabBlock {
            at,
            block_size: read_usize(bytes, at.saturating_add(BLOCK_SIZE_FIELD))?,
            next_free: read_link(bytes, at.saturating_add(NEXT_FREE_FIELD))?,
            is_free: read_flag(bytes, at.saturating_add(IS_FREE_FIELD))?,
        })
    }

    fn write_block(&mut self, block: &SlabBlock) -> Result<(), AllocError> {
        let bytes = self.region.bytes_mut();
        write_usize(bytes, block.at.saturating_add(BLOCK_SIZE_FIELD), block.block_size)?;
        write_link(bytes, block.at.saturating_add(NEXT_FREE_FIELD), block.next_free)?;
        write_flag(bytes, block.at.saturating_add(IS_FREE_FIELD), block.is_free)
    }

    fn hand_out(&mut self, mut block: SlabBlock) -> Result<ArenaPtr, AllocError> {
        block.is_free = false;
        block.next_free = None;
        self.write_block(&block)?;
        Ok(ArenaPtr::from_offset(block.at + BLOCK_HEADER_SIZE))
    }

    /// First free block of class `>= block_size` on any carved page.
    fn take_from_carved(&mut self, block_size: usize) -> Result<Option<ArenaPtr>, AllocError> {
        let mut cursor = self.carved_head()?;
        while let Some(page_at) = cursor {
            let mut page = self.read_page(page_at)?;
            let mut prev: Option<SlabBlock> = None;
            let mut block_cursor = page.free_blocks;
            while let Some(at) = block_cursor {
                let block = self.read_block(at)?;
                if block.is_free && block.block_size >= block_size {
                    match prev {
                        None => {
                            page.free_blocks = block.next_free;
                            self.write_page(&page)?;
                        }
                        Some(mut prev) => {
                            prev.next_free = block.next_free;
                            self.write_block(&prev)?;
                        }
                    }
                    return self.hand_out(block).map(Some);
                }
                prev = Some(block);
                block_cursor = block.next_free;
            }
            cursor = page.next_page;
        }
        Ok(None)
    }

    /// Moves the head of the free-page list to the tail of the carved list.
    fn claim_page(&mut self) -> Result<Option<PageDesc>, AllocError> {
        let Some(page_at) = self.free_pages_head()? else {
            return Ok(None);
        };
        let mut page = self.read_page(page_at)?;
        write_link(self.region.bytes_mut(), ROOT_FIELD, page.next_page)?;
        page.next_page = None;
        self.write_page(&page)?;

        match self.carved_head()? {
            None => write_link(self.region.bytes_mut(), AUX_FIELD, Some(page_at))?,
            Some(mut tail_at) => {
                while let Some(next) = self.read_page(tail_at)?.next_page {
                    tail_at = next;
                }
                PageDesc::write_next_page(self.region.bytes_mut(), tail_at, Some(page_at))?;
            }
        }
        Ok(Some(page))
    }

    /// Cuts `page` into blocks of `block_size`; the lowest block ends up first on its free list.
    fn carve(&mut self, page: &mut PageDesc, block_size: usize) -> Result<(), AllocError> {
        let start = self.geometry.page_start(self.page_index(page)?);
        let mut head = None;
        for i in (0..size_class::blocks_per_page(block_size)).rev() {
            let block = SlabBlock {
                at: start + i * block_size,
                block_size,
                next_free: head,
                is_free: true,
            };
            self.write_block(&block)?;
            head = Some(block.at);
        }
        page.free_blocks = head;
        self.write_page(page)
    }

    fn try_alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        if size == 0 {
            return Err(AllocError::invalid("zero-size request"));
        }
        if size > self.usable_size {
            return Err(AllocError::oom(size));
        }
        let block_size = size_class::block_size_for(size).ok_or(AllocError::oom(size))?;

        if let Some(ptr) = self.take_from_carved(block_size)? {
            return Ok(ptr);
        }

        let mut page = self.claim_page()?.ok_or(AllocError::oom(size))?;
        self.carve(&mut page, block_size)?;
        let head = page
            .free_blocks
            .ok_or(AllocError::invalid("freshly carved page has no blocks"))?;
        let block = self.read_block(head)?;
        page.free_blocks = block.next_free;
        self.write_page(&page)?;
        self.hand_out(block)
    }

    fn release_block(&mut self, at: usize) -> Result<(), AllocError> {
        let mut cursor = self.carved_head()?;
        while let Some(page_at) = cursor {
            let mut page = self.read_page(page_at)?;
            let start = self.geometry.page_start(self.page_index(&page)?);
            if (start..start + PAGE_SIZE).contains(&at) {
                let mut block = self.read_block(at)?;
                if block.is_free {
                    return Ok(());
                }
                block.is_free = true;
                block.next_free = page.free_blocks;
                self.write_block(&block)?;
                page.free_blocks = Some(at);
                return self.write_page(&page);
            }
            cursor = page.next_page;
        }
        Ok(())
    }

    #[must_use]
    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Index of the page `ptr` points into, if any.
    #[must_use]
    pub fn page_of(&self, ptr: ArenaPtr) -> Option<usize> {
        self.geometry.page_containing(ptr.offset())
    }

    /// Pages still on the free-page list.
    pub fn pristine_pages(&self) -> Result<usize, AllocError> {
        let mut count = 0;
        let mut cursor = self.free_pages_head()?;
        while let Some(at) = cursor {
            count += 1;
            cursor = self.read_page(at)?.next_page;
        }
        Ok(count)
    }

    /// Carved pages in claim order.
    pub fn carved_pages(&self) -> Result<Vec<PageInfo>, AllocError> {
        let mut out = Vec::new();
        let mut cursor = self.carved_head()?;
        while let Some(at) = cursor {
            let page = self.read_page(at)?;
            let index = self.page_index(&page)?;
            let start = self.geometry.page_start(index);
            let mut free_blocks = 0;
            let mut block_cursor = page.free_blocks;
            while let Some(block_at) = block_cursor {
                free_blocks += 1;
                block_cursor = self.read_block(block_at)?.next_free;
            }
            out.push(PageInfo {
                index,
                start,
                block_size: self.read_block(start)?.block_size,
                free_blocks,
            });
            cursor = page.next_page;
        }
        Ok(out)
    }
}

impl<R: Region> ArenaAllocator<R> for SlabAllocator<R> {
    fn engine(&self) -> EngineKind {
        EngineKind::Slab
    }

    fn alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        self.try_alloc(size)
    }

    fn free(&mut self, ptr: Option<ArenaPtr>) {
        let Some(at) = ptr.and_then(|p| p.header(BLOCK_HEADER_SIZE)) else {
            return;
        };
        // Pointers outside every carved page are ignored.
        self.release_block(at).ok();
    }

    fn capacity(&self) -> usize {
        self.usable_size
    }

    fn block_capacity(&self, ptr: ArenaPtr) -> Result<usize, AllocError> {
        let at = ptr
            .header(BLOCK_HEADER_SIZE)
            .filter(|&at| self.geometry.page_containing(at).is_some())
            .ok_or(AllocError::invalid("pointer is outside every page"))?;
        Ok(size_class::payload_capacity(self.read_block(at)?.block_size))
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

impl<R: Region> CreateArena<R> for SlabAllocator<R> {
    const ENGINE: EngineKind = EngineKind::Slab;

    fn create(mut region: R) -> Result<Self, AllocError> {
        let region_size = region.len();
        if region_size < PAGE_SIZE {
            return Err(AllocError::invalid("region smaller than one page"));
        }
        let usable_size = region_size - ARENA_HEADER_SIZE;
        let geometry = PageGeometry::for_usable(usable_size);
        let count = geometry.count();

        let header = ArenaHeader {
            engine: Self::ENGINE,
            region_size,
            usable_size,
            root: (count > 0).then(|| geometry.desc_offset(0)),
            aux: None,
        };
        let bytes = region.bytes_mut();
        header.write(bytes)?;
        for index in 0..count {
            PageDesc {
                at: geometry.desc_offset(index),
                page_size: PAGE_SIZE,
                next_page: (index + 1 < count).then(|| geometry.desc_offset(index + 1)),
                free_blocks: None,
            }
            .write(bytes)?;
        }
        Ok(Self {
            region,
            usable_size,
            geometry,
        })
    }

    fn attach(region: R) -> Result<Self, AllocError> {
        let header = ArenaHeader::expect(region.bytes(), Self::ENGINE)?;
        Ok(Self {
            region,
            usable_size: header.usable_size,
            geometry: PageGeometry::for_usable(header.usable_size),
        })
    }
}
