use snap_header::HeaderError;
use snap_types::BuildId;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend returned fewer bytes than a block requires.
    #[error("short read of build {build_id} at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        build_id: BuildId,
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// A stored header could not be decoded.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// The header stored under one build id describes another build.
    #[error("header stored for build {requested} describes build {found}")]
    HeaderMismatch { requested: BuildId, found: BuildId },

    /// The configured provider has no backend in this build.
    #[error("unsupported storage provider: {0}")]
    UnsupportedProvider(String),

    /// The backend does not implement this operation.
    #[error("operation not supported by {backend}: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Terminal failure to fetch one block from one build.
///
/// The diff core records these per block instead of aborting the run.
#[derive(Debug, thiserror::Error)]
#[error("failed to read block at offset {offset} of build {build_id}: {cause}")]
pub struct BlockReadError {
    pub build_id: BuildId,
    pub offset: u64,
    #[source]
    pub cause: StoreError,
}

impl BlockReadError {
    pub fn new(build_id: BuildId, offset: u64, cause: StoreError) -> Self {
        Self {
            build_id,
            offset,
            cause,
        }
    }
}
