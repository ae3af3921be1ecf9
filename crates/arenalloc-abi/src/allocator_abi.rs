//! ABI layer for the arena allocator entry points.
//!
//! ```c
//! Allocator *allocator_create(void *memory, size_t size);
//! void *allocator_alloc(Allocator *allocator, size_t size);
//! void allocator_free(Allocator *allocator, void *memory);
//! void allocator_destroy(Allocator *allocator);
//! ```
//!
//! The handle returned by `allocator_create` is the region base itself: the
//! arena header at that address records the engine and the region size, so
//! every later call re-attaches the right engine without any state outside
//! the region. `allocator_create` picks the engine from `ARENALLOC_ENGINE`;
//! the `freelist_allocator_*` and `slab_allocator_*` aliases pin one.
//!
//! Failures surface as null returns with `errno` set (`EINVAL` or `ENOMEM`).
//! A failed `munmap` in `allocator_destroy` is written to stderr and
//! otherwise ignored.

use std::ffi::{c_int, c_void};

use arenalloc_core::{AllocError, ArenaAllocator, ArenaPtr, Engine, EngineKind};

use crate::macros::{abi_fn, engine_entry_points};
use crate::raw_region::RawRegion;

/// Opaque allocator handle. Points at the start of the managed region.
#[repr(C)]
pub struct Allocator {
    _private: [u8; 0],
}

#[cfg(target_os = "linux")]
#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() = val };
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn set_abi_errno(_val: c_int) {}

fn errno_for(err: &AllocError) -> c_int {
    match err {
        AllocError::OutOfMemory { .. } => libc::ENOMEM,
        AllocError::InvalidArgument { .. } | AllocError::ReleaseFailure { .. } => libc::EINVAL,
    }
}

/// Re-opens the arena behind `allocator`, optionally requiring one engine.
unsafe fn attach(
    allocator: *mut Allocator,
    expect: Option<EngineKind>,
) -> Option<Engine<RawRegion>> {
    // SAFETY: the caller passes a handle from `allocator_create`.
    let region = unsafe { RawRegion::from_header(allocator.cast()) }?;
    let engine = Engine::attach(region).ok()?;
    match expect {
        Some(kind) if kind != engine.engine() => None,
        _ => Some(engine),
    }
}

pub(crate) unsafe fn create_arena(
    kind: EngineKind,
    memory: *mut c_void,
    size: usize,
) -> *mut Allocator {
    // SAFETY: the caller hands over `size` bytes at `memory`.
    let Some(region) = (unsafe { RawRegion::new(memory.cast(), size) }) else {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    match Engine::create(kind, region) {
        Ok(engine) => engine.into_region().base().cast(),
        Err(err) => {
            set_abi_errno(errno_for(&err));
            std::ptr::null_mut()
        }
    }
}

pub(crate) unsafe fn alloc_from(
    allocator: *mut Allocator,
    expect: Option<EngineKind>,
    size: usize,
) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    let Some(mut engine) = (unsafe { attach(allocator, expect) }) else {
        set_abi_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    match engine.alloc(size) {
        Ok(ptr) => engine.region().ptr_at(ptr.offset()).cast(),
        Err(err) => {
            set_abi_errno(errno_for(&err));
            std::ptr::null_mut()
        }
    }
}

pub(crate) unsafe fn free_into(
    allocator: *mut Allocator,
    expect: Option<EngineKind>,
    memory: *mut c_void,
) {
    if memory.is_null() {
        return;
    }
    // SAFETY: forwarded caller contract.
    let Some(mut engine) = (unsafe { attach(allocator, expect) }) else {
        return;
    };
    // Pointers outside the region cannot belong to it.
    if let Some(offset) = engine.region().offset_of(memory.cast()) {
        engine.free(Some(ArenaPtr::from_offset(offset)));
    }
}

pub(crate) unsafe fn destroy_arena(allocator: *mut Allocator, expect: Option<EngineKind>) {
    // SAFETY: forwarded caller contract.
    let Some(engine) = (unsafe { attach(allocator, expect) }) else {
        return;
    };
    if let Err(err) = engine.destroy() {
        eprintln!("allocator_destroy: {err}");
    }
}

abi_fn! {
    /// Lays out a fresh arena over `size` bytes at `memory`.
    ///
    /// Returns null if `memory` is null or the region is too small for the
    /// selected engine.
    fn allocator_create(memory: *mut c_void, size: usize) -> *mut Allocator {
        create_arena(EngineKind::from_env(), memory, size)
    }
}

abi_fn! {
    /// Allocates `size` bytes from the arena, or returns null.
    fn allocator_alloc(allocator: *mut Allocator, size: usize) -> *mut c_void {
        alloc_from(allocator, None, size)
    }
}

abi_fn! {
    /// Returns `memory` to the arena. Null `memory` is a no-op.
    ///
    /// Passing a pointer not obtained from `allocator_alloc` on the same
    /// arena, or freeing twice, is undefined behavior.
    fn allocator_free(allocator: *mut Allocator, memory: *mut c_void) {
        free_into(allocator, None, memory)
    }
}

abi_fn! {
    /// Unmaps the whole region. The handle is dead afterwards, even if
    /// unmapping failed.
    fn allocator_destroy(allocator: *mut Allocator) {
        destroy_arena(allocator, None)
    }
}

engine_entry_points!(EngineKind::FreeList =>
    freelist_allocator_create, freelist_allocator_alloc,
    freelist_allocator_free, freelist_allocator_destroy);

engine_entry_points!(EngineKind::Slab =>
    slab_allocator_create, slab_allocator_alloc,
    slab_allocator_free, slab_allocator_destroy);
