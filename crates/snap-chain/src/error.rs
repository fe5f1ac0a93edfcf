//! Error types for chain validation and resolution.

use snap_header::HeaderError;
use snap_store::StoreError;
use snap_types::BuildId;

/// The structural rule a chain broke.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChainViolation {
    #[error("build appears more than once")]
    DuplicateBuild,

    #[error("parent {parent} is not part of the chain")]
    BrokenParentLink { parent: BuildId },

    #[error("parent links form a cycle")]
    Cycle,

    #[error("chain forks into {count} leaves")]
    MultipleLeaves { count: usize },

    #[error("layer is not reachable from the leaf")]
    Disconnected,

    #[error("root layer has generation {generation}, expected 0")]
    RootGeneration { generation: u64 },

    #[error("generation {generation} does not exceed parent generation {parent_generation}")]
    NonMonotonicGeneration {
        parent_generation: u64,
        generation: u64,
    },

    #[error("block size {actual} differs from chain block size {expected}")]
    BlockSizeMismatch { expected: u32, actual: u32 },

    #[error("base build {actual} differs from chain root {expected}")]
    BaseMismatch { expected: BuildId, actual: BuildId },

    #[error("chain exceeds {limit} layers")]
    TooLong { limit: usize },
}

/// Errors that can occur while building or querying a chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// No headers were supplied.
    #[error("chain is empty")]
    EmptyChain,

    /// A structural chain invariant does not hold.
    #[error("invalid chain at build {build_id}: {violation}")]
    InvalidChain {
        build_id: BuildId,
        violation: ChainViolation,
    },

    /// A mapping owner is not present in the supplied chain.
    #[error("build {layer} maps offset {offset} to {owner}, which is not in the chain")]
    AncestorNotFound {
        layer: BuildId,
        owner: BuildId,
        offset: u64,
    },

    /// Ownership points forward or never settles.
    #[error("corrupted chain at build {build_id}, offset {offset}: {reason}")]
    CorruptedChain {
        build_id: BuildId,
        offset: u64,
        reason: String,
    },

    /// The queried layer is not part of the chain.
    #[error("build {0} is not part of the chain")]
    UnknownLayer(BuildId),

    /// Header lookup failed.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// Loading headers from storage failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ChainError {
    pub(crate) fn invalid(build_id: BuildId, violation: ChainViolation) -> Self {
        Self::InvalidChain {
            build_id,
            violation,
        }
    }
}

/// Convenience alias for chain results.
pub type ChainResult<T> = Result<T, ChainError>;
