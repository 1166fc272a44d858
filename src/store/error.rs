//! Store error types

use thiserror::Error;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The arena cannot satisfy the requested allocation
    #[error("shared memory arena exhausted: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    /// No buffer under the given key
    #[error("buffer not found: {0}")]
    NotFound(String),

    /// A buffer with this key already exists
    #[error("buffer already exists: {0}")]
    AlreadyExists(String),

    /// Failure creating, opening, or mapping the named segment
    #[error("segment error: {0}")]
    Segment(#[from] std::io::Error),
}
