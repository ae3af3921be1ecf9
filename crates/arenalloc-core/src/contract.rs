//! The four-operation allocator contract shared by both engines.
//!
//! `create` takes ownership of a [`Region`], `alloc` hands out
//! [`ArenaPtr`] payload offsets, `free` takes them back, and `destroy`
//! consumes the allocator and releases the region exactly once.
//!
//! Callers that *free a pointer they did not get from `alloc`*, or free
//! the same pointer twice, get unspecified bookkeeping. The engines stay
//! memory-safe but make no promise about later allocations.

use crate::config::EngineKind;
use crate::error::AllocError;
use crate::free_list::FreeListAllocator;
use crate::region::Region;
use crate::slab::SlabAllocator;
use crate::view::ArenaHeader;

/// Payload location handed out by `alloc`: a byte offset from the region base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaPtr(usize);

impl ArenaPtr {
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Offset of the block header that precedes this payload.
    pub(crate) const fn header(self, header_size: usize) -> Option<usize> {
        self.0.checked_sub(header_size)
    }
}

/// Operations every engine supports once it owns a region.
pub trait ArenaAllocator<R: Region> {
    /// Engine that wrote this arena.
    fn engine(&self) -> EngineKind;

    /// Allocates `size` payload bytes.
    fn alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError>;

    /// Returns a block to the allocator. `None` is a no-op.
    fn free(&mut self, ptr: Option<ArenaPtr>);

    /// Usable bytes: region size minus the arena header.
    fn capacity(&self) -> usize;

    /// Payload bytes the block behind `ptr` can hold.
    fn block_capacity(&self, ptr: ArenaPtr) -> Result<usize, AllocError>;

    fn region(&self) -> &R;

    fn region_mut(&mut self) -> &mut R;

    /// Gives the region back without releasing it. The arena header stays
    /// in place, so the region can be re-attached later.
    fn into_region(self) -> R
    where
        Self: Sized;

    /// Total region size, as handed to `create`.
    fn region_size(&self) -> usize {
        self.region().len()
    }

    /// Consumes the allocator and releases the whole region.
    fn destroy(self) -> Result<(), AllocError>
    where
        Self: Sized,
    {
        self.into_region().release()
    }

    /// `len` payload bytes starting at `ptr`.
    fn payload<'a>(&'a self, ptr: ArenaPtr, len: usize) -> Result<&'a [u8], AllocError>
    where
        R: 'a,
    {
        let range = payload_range(ptr, len, self.block_capacity(ptr)?)?;
        self.region()
            .bytes()
            .get(range)
            .ok_or(AllocError::invalid("payload outside region"))
    }

    /// Mutable `len` payload bytes starting at `ptr`.
    fn payload_mut<'a>(
        &'a mut self,
        ptr: ArenaPtr,
        len: usize,
    ) -> Result<&'a mut [u8], AllocError>
    where
        R: 'a,
    {
        let range = payload_range(ptr, len, self.block_capacity(ptr)?)?;
        self.region_mut()
            .bytes_mut()
            .get_mut(range)
            .ok_or(AllocError::invalid("payload outside region"))
    }
}

fn payload_range(
    ptr: ArenaPtr,
    len: usize,
    capacity: usize,
) -> Result<std::ops::Range<usize>, AllocError> {
    if len > capacity {
        return Err(AllocError::invalid("payload view exceeds block capacity"));
    }
    let end = ptr
        .offset()
        .checked_add(len)
        .ok_or(AllocError::invalid("payload offset overflow"))?;
    Ok(ptr.offset()..end)
}

/// Engines that can lay out a fresh arena or re-open an existing one.
pub trait CreateArena<R: Region>: ArenaAllocator<R> + Sized {
    const ENGINE: EngineKind;

    /// Writes a fresh arena into `region`.
    fn create(region: R) -> Result<Self, AllocError>;

    /// Re-opens a region whose header was written by `create` of this engine.
    fn attach(region: R) -> Result<Self, AllocError>;
}

/// Either engine behind one type, so callers need not know which one runs.
#[derive(Debug)]
pub enum Engine<R: Region> {
    FreeList(FreeListAllocator<R>),
    Slab(SlabAllocator<R>),
}

impl<R: Region> Engine<R> {
    /// Creates an arena managed by `kind`.
    pub fn create(kind: EngineKind, region: R) -> Result<Self, AllocError> {
        match kind {
            EngineKind::FreeList => FreeListAllocator::create(region).map(Self::FreeList),
            EngineKind::Slab => SlabAllocator::create(region).map(Self::Slab),
        }
    }

    /// Re-opens an arena, picking the engine recorded in its header.
    pub fn attach(region: R) -> Result<Self, AllocError> {
        match ArenaHeader::read(region.bytes())?.engine {
            EngineKind::FreeList => FreeListAllocator::attach(region).map(Self::FreeList),
            EngineKind::Slab => SlabAllocator::attach(region).map(Self::Slab),
        }
    }
}

macro_rules! delegate {
    ($self:expr, $engine:ident => $body:expr) => {
        match $self {
            Engine::FreeList($engine) => $body,
            Engine::Slab($engine) => $body,
        }
    };
}

impl<R: Region> ArenaAllocator<R> for Engine<R> {
    fn engine(&self) -> EngineKind {
        delegate!(self, e => e.engine())
    }

    fn alloc(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        delegate!(self, e => e.alloc(size))
    }

    fn free(&mut self, ptr: Option<ArenaPtr>) {
        delegate!(self, e => e.free(ptr))
    }

    fn capacity(&self) -> usize {
        delegate!(self, e => e.capacity())
    }

    fn block_capacity(&self, ptr: ArenaPtr) -> Result<usize, AllocError> {
        delegate!(self, e => e.block_capacity(ptr))
    }

    fn region(&self) -> &R {
        delegate!(self, e => e.region())
    }

    fn region_mut(&mut self) -> &mut R {
        delegate!(self, e => e.region_mut())
    }

    fn into_region(self) -> R {
        delegate!(self, e => e.into_region())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ptr_header_recovery_is_checked() {
        assert_eq!(ArenaPtr::from_offset(64).header(24), Some(40));
        assert_eq!(ArenaPtr::from_offset(8).header(24), None);
    }

    #[test]
    fn engine_create_then_attach_preserves_kind() {
        for kind in EngineKind::ALL {
            let engine = Engine::create(kind, vec![0u8; 16 * 1024]).unwrap();
            assert_eq!(engine.engine(), kind);
            let region = engine.into_region();
            let reopened = Engine::attach(region).unwrap();
            assert_eq!(reopened.engine(), kind);
            assert!(reopened.destroy().is_ok());
        }
    }

    #[test]
    fn attach_rejects_blank_region() {
        assert!(matches!(
            Engine::attach(vec![0u8; 8192]),
            Err(AllocError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn payload_views_are_bounded_by_block_capacity() {
        for kind in EngineKind::ALL {
            let mut engine = Engine::create(kind, vec![0u8; 16 * 1024]).unwrap();
            let ptr = engine.alloc(40).unwrap();
            let cap = engine.block_capacity(ptr).unwrap();
            assert!(cap >= 40);
            engine.payload_mut(ptr, 40).unwrap().fill(0xA5);
            assert!(engine.payload(ptr, 40).unwrap().iter().all(|&b| b == 0xA5));
            assert!(engine.payload(ptr, cap + 1).is_err());
        }
    }

    #[test]
    fn payload_views_work_over_a_borrowed_region() {
        for kind in EngineKind::ALL {
            let mut backing = vec![0u8; 16 * 1024];
            let mut engine = Engine::create(kind, backing.as_mut_slice()).unwrap();
            let a = engine.alloc(32).unwrap();
            let b = engine.alloc(32).unwrap();
            engine.payload_mut(a, 32).unwrap().fill(1);
            engine.payload_mut(b, 32).unwrap().fill(2);
            let view: &[u8] = engine.payload(a, 32).unwrap();
            assert!(view.iter().all(|&x| x == 1), "{kind}");
            assert!(engine.payload(b, 32).unwrap().iter().all(|&x| x == 2), "{kind}");
            engine.destroy().unwrap();
            // The borrowed bytes outlive the allocator.
            assert!(backing[b.offset()..b.offset() + 32].iter().all(|&x| x == 2));
        }
    }
}
