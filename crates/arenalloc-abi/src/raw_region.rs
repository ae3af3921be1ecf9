//! Raw `(pointer, length)` regions supplied by C callers.
//!
//! The region is released with `munmap`, matching a provider that mapped
//! it anonymously.

use std::ptr::NonNull;

use arenalloc_core::{ARENA_HEADER_SIZE, AllocError, ArenaHeader, Region};

/// A caller-owned mapping viewed as a [`Region`].
///
/// Dropping a `RawRegion` does nothing; only [`Region::release`] unmaps.
#[derive(Debug)]
pub struct RawRegion {
    base: NonNull<u8>,
    len: usize,
}

impl RawRegion {
    /// Wraps `len` bytes at `base`. Returns `None` for a null base.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes and must not
    /// be accessed through other pointers while the returned value is in use.
    pub unsafe fn new(base: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base, len })
    }

    /// Re-opens a region whose arena header sits at `base`, taking the length
    /// from the header.
    ///
    /// # Safety
    ///
    /// `base` must point at memory previously passed to `allocator_create`
    /// that has not been destroyed.
    pub unsafe fn from_header(base: *mut u8) -> Option<Self> {
        let base = NonNull::new(base)?;
        // SAFETY: a live arena starts with a full header.
        let header_bytes =
            unsafe { std::slice::from_raw_parts(base.as_ptr(), ARENA_HEADER_SIZE) };
        let header = ArenaHeader::read(header_bytes).ok()?;
        Some(Self {
            base,
            len: header.region_size,
        })
    }

    #[must_use]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Converts a pointer into the region to a byte offset.
    #[must_use]
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset < self.len).then_some(offset)
    }

    /// Pointer to byte `offset` of the region.
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> *mut u8 {
        self.base.as_ptr().wrapping_add(offset)
    }
}

impl Region for RawRegion {
    fn bytes(&self) -> &[u8] {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed by the constructor contract; `&mut self` is unique.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn release(self) -> Result<(), AllocError> {
        // SAFETY: the region is owned by the allocator being destroyed; nothing
        // touches it after this call.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc == 0 {
            Ok(())
        } else {
            Err(AllocError::ReleaseFailure {
                reason: std::io::Error::last_os_error().to_string(),
            })
        }
    }
}
