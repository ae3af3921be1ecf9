//! Allocator error taxonomy.

use thiserror::Error;

/// Every detectable failure of the four-operation contract.
///
/// Misuse the engines cannot observe (freeing a foreign pointer, double
/// free) is not represented here; it is a caller obligation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Missing or undersized region, zero-size request where the engine
    /// rejects it, or arena metadata that points outside the region.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },
    /// No block or page can satisfy the request.
    #[error("out of memory: no space for {requested} bytes")]
    OutOfMemory { requested: usize },
    /// The external region-release operation failed during destroy.
    #[error("region release failed: {reason}")]
    ReleaseFailure { reason: String },
}

impl AllocError {
    pub(crate) const fn invalid(reason: &'static str) -> Self {
        Self::InvalidArgument { reason }
    }

    pub(crate) const fn oom(requested: usize) -> Self {
        Self::OutOfMemory { requested }
    }

    /// Short machine-readable label, used by the ABI diagnostics and harness logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::OutOfMemory { .. } => "out_of_memory",
            Self::ReleaseFailure { .. } => "release_failure",
        }
    }
}
