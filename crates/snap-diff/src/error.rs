//! Error types for the diff crate.

use snap_chain::ChainError;

/// Errors that abort a diff run before or outside per-block work.
///
/// Failures to read a single block are not errors at this level; they are
/// recorded in [`DiffReport::failures`](crate::DiffReport::failures).
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The requested range is not block-aligned or exceeds the address space.
    #[error("invalid range [{start}, {end}): {reason}")]
    InvalidRange { start: u64, end: u64, reason: String },

    /// The chain failed validation or ownership verification.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// A block worker panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
