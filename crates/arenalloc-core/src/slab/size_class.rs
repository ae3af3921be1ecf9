//! Power-of-two size classes for slab pages.
//!
//! A request of `size` payload bytes needs `size + BLOCK_HEADER_SIZE`
//! bytes of block; the class is the next power of two, and no class is
//! larger than one page.

use crate::view::WORD;

/// Unit of carving.
pub const PAGE_SIZE: usize = 4096;

/// Header at the start of every slab block: `{ block_size, next_free, is_free }`.
pub const BLOCK_HEADER_SIZE: usize = 3 * WORD;

/// Smallest class that fits a header plus one payload byte.
pub const MIN_BLOCK_SIZE: usize = (BLOCK_HEADER_SIZE + 1).next_power_of_two();

/// Block size serving a request of `size` payload bytes.
///
/// Returns `None` when the block would not fit in one page.
#[must_use]
pub fn block_size_for(size: usize) -> Option<usize> {
    let needed = size.checked_add(BLOCK_HEADER_SIZE)?;
    let block_size = needed.checked_next_power_of_two()?;
    (block_size <= PAGE_SIZE).then_some(block_size)
}

/// Largest payload a block of `block_size` bytes can hold.
#[must_use]
pub const fn payload_capacity(block_size: usize) -> usize {
    block_size.saturating_sub(BLOCK_HEADER_SIZE)
}

/// How many blocks one page carves into.
#[must_use]
pub const fn blocks_per_page(block_size: usize) -> usize {
    PAGE_SIZE / block_size
}

/// Largest payload any single slab allocation can carry.
pub const MAX_PAYLOAD: usize = payload_capacity(PAGE_SIZE);
