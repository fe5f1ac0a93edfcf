use thiserror::Error;

use snap_types::BuildId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported header version: {0}")]
    UnsupportedVersion(u32),

    #[error("header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error(
        "corrupted header{}: {reason}",
        .build_id.map(|id| format!(" for build {id}")).unwrap_or_default()
    )]
    CorruptedHeader {
        build_id: Option<BuildId>,
        reason: String,
    },

    #[error("offset {offset} out of range for build {build_id} (total size {total_size})")]
    OutOfRange {
        build_id: BuildId,
        offset: u64,
        total_size: u64,
    },
}

impl HeaderError {
    pub(crate) fn corrupted(build_id: Option<BuildId>, reason: impl Into<String>) -> Self {
        Self::CorruptedHeader {
            build_id,
            reason: reason.into(),
        }
    }
}

pub type HeaderResult<T> = Result<T, HeaderError>;
