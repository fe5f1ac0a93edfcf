use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use snap_header::Header;
use snap_types::BuildId;

use crate::error::{BlockReadError, StoreError, StoreResult};

/// Path-addressed object storage backend.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; readers may cache freely.
/// - `read_at` returns at most `length` bytes and fewer only at end of object.
/// - A missing object is reported as [`StoreError::NotFound`].
/// - Concurrent reads are always safe.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Read a byte range of an object.
    async fn read_at(&self, path: &str, offset: u64, length: u64) -> StoreResult<Bytes>;

    /// Read a whole object.
    async fn read_all(&self, path: &str) -> StoreResult<Bytes>;

    /// Object size in bytes.
    async fn size(&self, path: &str) -> StoreResult<u64>;

    /// Write a whole object, replacing any previous content.
    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()>;

    /// Delete every object under `prefix`. Missing prefixes are not an error.
    async fn delete_with_prefix(&self, prefix: &str) -> StoreResult<()>;

    /// Issue a time-limited upload URL for `path`.
    async fn upload_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String>;

    /// Human-readable description of the backend, for logs.
    fn details(&self) -> String;
}

/// Block-granular reads of a build's data object.
///
/// This is the only way the diff core touches layer bytes. It never reads
/// speculatively: callers fetch a block only from the build that owns it.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Read a byte range of a build's data object.
    async fn read_at(&self, build_id: BuildId, offset: u64, length: u64) -> StoreResult<Bytes>;

    /// Size of a build's data object.
    async fn size(&self, build_id: BuildId) -> StoreResult<u64>;

    /// Delete every object of a build.
    async fn delete(&self, build_id: BuildId) -> StoreResult<()>;

    /// Read exactly one block.
    ///
    /// Any storage error, or a read shorter than `block_size`, is returned as
    /// a [`BlockReadError`]. Callers treat it as terminal for that block.
    async fn read_block(
        &self,
        build_id: BuildId,
        local_offset: u64,
        block_size: u64,
    ) -> Result<Bytes, BlockReadError> {
        let data = self
            .read_at(build_id, local_offset, block_size)
            .await
            .map_err(|e| BlockReadError::new(build_id, local_offset, e))?;
        if data.len() as u64 != block_size {
            return Err(BlockReadError::new(
                build_id,
                local_offset,
                StoreError::ShortRead {
                    build_id,
                    offset: local_offset,
                    expected: block_size,
                    actual: data.len() as u64,
                },
            ));
        }
        Ok(data)
    }
}

/// Decoded layer headers by build id.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    async fn read_header(&self, build_id: BuildId) -> StoreResult<Header>;
}
