//! Page descriptors and arena geometry for the slab engine.
//!
//! Layout of a slab arena:
//!
//! ```text
//! [arena header][desc 0][desc 1]..[desc n-1][page 0][page 1]..[page n-1][waste]
//! ```
//!
//! Descriptors hold `{ page_size, next_page, free_blocks }`. `next_page`
//! links a page into either the free-page list or the carved-page list,
//! never both. Links are descriptor offsets; `free_blocks` is the offset
//! of the first free block header inside the page.

use super::size_class::PAGE_SIZE;
use crate::error::AllocError;
use crate::view::{
    ARENA_HEADER_SIZE, WORD, read_link, read_usize, write_link, write_usize,
};

/// Bytes of one page descriptor.
pub const PAGE_DESC_SIZE: usize = 3 * WORD;

const PAGE_SIZE_FIELD: usize = 0;
const NEXT_PAGE_FIELD: usize = WORD;
const FREE_BLOCKS_FIELD: usize = 2 * WORD;

/// Decoded descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageDesc {
    /// Offset of the descriptor itself.
    pub at: usize,
    pub page_size: usize,
    pub next_page: Option<usize>,
    pub free_blocks: Option<usize>,
}

impl PageDesc {
    pub(crate) fn read(bytes: &[u8], at: usize) -> Result<Self, AllocError> {
        Ok(Self {
            at,
            page_size: read_usize(bytes, at.saturating_add(PAGE_SIZE_FIELD))?,
            next_page: read_link(bytes, at.saturating_add(NEXT_PAGE_FIELD))?,
            free_blocks: read_link(bytes, at.saturating_add(FREE_BLOCKS_FIELD))?,
        })
    }

    pub(crate) fn write(&self, bytes: &mut [u8]) -> Result<(), AllocError> {
        write_usize(bytes, self.at.saturating_add(PAGE_SIZE_FIELD), self.page_size)?;
        write_link(bytes, self.at.saturating_add(NEXT_PAGE_FIELD), self.next_page)?;
        write_link(bytes, self.at.saturating_add(FREE_BLOCKS_FIELD), self.free_blocks)
    }

    pub(crate) fn write_next_page(
        bytes: &mut [u8],
        at: usize,
        next: Option<usize>,
    ) -> Result<(), AllocError> {
        write_link(bytes, at.saturating_add(NEXT_PAGE_FIELD), next)
    }
}

/// Where descriptors and pages sit for an arena of a given usable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    count: usize,
}

impl PageGeometry {
    /// Whole pages (each with its descriptor) that fit in `usable_size` bytes.
    #[must_use]
    pub const fn for_usable(usable_size: usize) -> Self {
        Self {
            count: usable_size / (PAGE_SIZE + PAGE_DESC_SIZE),
        }
    }

    #[must_use]
    pub const fn count(self) -> usize {
        self.count
    }

    /// Offset of descriptor `index`.
    #[must_use]
    pub const fn desc_offset(self, index: usize) -> usize {
        ARENA_HEADER_SIZE + index * PAGE_DESC_SIZE
    }

    /// Page index a descriptor offset refers to.
    pub(crate) fn index_of_desc(self, at: usize) -> Result<usize, AllocError> {
        let rel = at
            .checked_sub(ARENA_HEADER_SIZE)
            .ok_or(AllocError::invalid("page link precedes descriptor table"))?;
        let index = rel / PAGE_DESC_SIZE;
        if rel % PAGE_DESC_SIZE != 0 || index >= self.count {
            return Err(AllocError::invalid("page link is not a descriptor"));
        }
        Ok(index)
    }

    /// Offset of the first byte of page `index`.
    #[must_use]
    pub const fn page_start(self, index: usize) -> usize {
        self.first_page() + index * PAGE_SIZE
    }

    const fn first_page(self) -> usize {
        ARENA_HEADER_SIZE + self.count * PAGE_DESC_SIZE
    }

    /// Page whose `[start, start + PAGE_SIZE)` range contains `offset`.
    #[must_use]
    pub fn page_containing(self, offset: usize) -> Option<usize> {
        let rel = offset.checked_sub(self.first_page())?;
        let index = rel / PAGE_SIZE;
        (index < self.count).then_some(index)
    }
}
