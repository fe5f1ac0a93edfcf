use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use snap_header::{decode, encode, Header};
use snap_types::BuildId;

use crate::error::{StoreError, StoreResult};
use crate::paths::{Artifact, TemplateFiles};
use crate::traits::{BlockSource, HeaderSource, ObjectStorage};

/// Build-addressed view of an [`ObjectStorage`] for one snapshot artifact.
///
/// Maps build ids to the `{build_id}/memfile` (or `rootfs.ext4`) data object
/// and its `.header` companion.
#[derive(Clone)]
pub struct TemplateStorage {
    storage: Arc<dyn ObjectStorage>,
    artifact: Artifact,
}

impl TemplateStorage {
    pub fn new(storage: Arc<dyn ObjectStorage>, artifact: Artifact) -> Self {
        Self { storage, artifact }
    }

    pub fn artifact(&self) -> Artifact {
        self.artifact
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Publish a layer's data object and header.
    ///
    /// The data object must span the header's whole address space.
    pub async fn put_layer(&self, header: &Header, data: Bytes) -> StoreResult<()> {
        let files = TemplateFiles::new(header.build_id());
        self.storage
            .write(&files.data_path(self.artifact), data)
            .await?;
        self.storage
            .write(&files.header_path(self.artifact), Bytes::from(encode(header)))
            .await?;
        info!(
            build = %header.build_id(),
            generation = header.generation(),
            artifact = %self.artifact,
            "published layer"
        );
        Ok(())
    }
}

impl std::fmt::Debug for TemplateStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStorage")
            .field("storage", &self.storage.details())
            .field("artifact", &self.artifact)
            .finish()
    }
}

#[async_trait]
impl BlockSource for TemplateStorage {
    async fn read_at(&self, build_id: BuildId, offset: u64, length: u64) -> StoreResult<Bytes> {
        let path = TemplateFiles::new(build_id).data_path(self.artifact);
        self.storage.read_at(&path, offset, length).await
    }

    async fn size(&self, build_id: BuildId) -> StoreResult<u64> {
        let path = TemplateFiles::new(build_id).data_path(self.artifact);
        self.storage.size(&path).await
    }

    async fn delete(&self, build_id: BuildId) -> StoreResult<()> {
        let prefix = TemplateFiles::new(build_id).storage_dir();
        self.storage.delete_with_prefix(&prefix).await
    }
}

#[async_trait]
impl HeaderSource for TemplateStorage {
    async fn read_header(&self, build_id: BuildId) -> StoreResult<Header> {
        let path = TemplateFiles::new(build_id).header_path(self.artifact);
        let data = self.storage.read_all(&path).await?;
        let header = decode(&data)?;
        if header.build_id() != build_id {
            return Err(StoreError::HeaderMismatch {
                requested: build_id,
                found: header.build_id(),
            });
        }
        debug!(
            build = %build_id.short_id(),
            generation = header.generation(),
            entries = header.mappings().len(),
            "loaded header"
        );
        Ok(header)
    }
}
