//! # arenalloc-core
//!
//! Safe Rust allocator engines that manage one caller-supplied region.
//!
//! Two engines implement the same create/alloc/free/destroy contract:
//!
//! - [`FreeListAllocator`]: first-fit over an address-ordered block list,
//!   splitting on allocation and coalescing the whole list on every free.
//! - [`SlabAllocator`]: 4096-byte pages lazily carved into power-of-two
//!   size classes.
//!
//! All metadata lives inside the region as bounds-checked words, and
//! every pointer the engines hand out is an [`ArenaPtr`] byte offset.
//! The engines are single-threaded; wrap an allocator in a mutex to share
//! it. They never log: diagnostics belong to the caller.

#![deny(unsafe_code)]

pub mod config;
pub mod contract;
pub mod error;
pub mod free_list;
pub mod region;
pub mod slab;
pub mod view;

pub use config::{ENGINE_ENV, EngineKind};
pub use contract::{ArenaAllocator, ArenaPtr, CreateArena, Engine};
pub use error::AllocError;
pub use free_list::FreeListAllocator;
pub use region::Region;
pub use slab::SlabAllocator;
pub use view::{ARENA_HEADER_SIZE, ArenaHeader};
