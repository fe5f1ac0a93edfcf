use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStorage;

/// Object storage backed by plain files under a base directory.
///
/// Object paths map directly to relative file paths, so a build's objects
/// share the directory named after its id.
#[derive(Clone, Debug)]
pub struct FileSystemStorage {
    base_path: PathBuf,
}

impl FileSystemStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

fn map_not_found(err: std::io::Error, path: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl ObjectStorage for FileSystemStorage {
    async fn read_at(&self, path: &str, offset: u64, length: u64) -> StoreResult<Bytes> {
        let mut file = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|e| map_not_found(e, path))?;
        let available = file.metadata().await?.len().saturating_sub(offset);
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(length.min(available) as usize);
        file.take(length).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn read_all(&self, path: &str) -> StoreResult<Bytes> {
        tokio::fs::read(self.resolve(path))
            .await
            .map(Bytes::from)
            .map_err(|e| map_not_found(e, path))
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.len())
            .map_err(|e| map_not_found(e, path))
    }

    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &data).await?;
        debug!(path, bytes = data.len(), "wrote object");
        Ok(())
    }

    async fn delete_with_prefix(&self, prefix: &str) -> StoreResult<()> {
        let target = self.resolve(prefix);
        let result = match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                debug!(prefix, "deleted objects");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn upload_signed_url(&self, _path: &str, _ttl: Duration) -> StoreResult<String> {
        Err(StoreError::Unsupported {
            backend: "filesystem",
            operation: "signed upload URLs",
        })
    }

    fn details(&self) -> String {
        format!("[Local file storage, base path set to {}]", self.base_path.display())
    }
}
