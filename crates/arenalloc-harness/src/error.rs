//! Harness error type.

use arenalloc_core::AllocError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("allocator error: {0}")]
    Alloc(#[from] AllocError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{scenario}: check failed: {reason}")]
    CheckFailed {
        scenario: &'static str,
        reason: String,
    },
    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },
    #[error("stress run saw {corrupted} corrupted blocks")]
    Corruption { corrupted: usize },
    #[error("stress worker {0} panicked")]
    WorkerPanicked(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
