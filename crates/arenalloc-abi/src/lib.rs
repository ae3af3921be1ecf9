// Exported entry points take raw pointers from C callers; their contract is
// documented once at module level.
#![allow(clippy::missing_safety_doc)]
//! # arenalloc-abi
//!
//! `extern "C"` boundary for the arenalloc engines. Builds `libarenalloc.so`
//! exporting the four allocator entry points a `dlsym`-based dispatcher
//! resolves by name.
//!
//! # Architecture
//!
//! ```text
//! C caller -> ABI entry (this crate) -> RawRegion + Engine::attach -> core engine -> return
//! ```

mod macros;

pub mod allocator_abi;
pub mod raw_region;

pub use allocator_abi::Allocator;
pub use raw_region::RawRegion;
