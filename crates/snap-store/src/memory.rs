use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStorage;

/// In-memory, HashMap-based object storage.
///
/// Intended for tests and embedding. Objects are held as [`Bytes`] behind a
/// `RwLock`, so reads hand out cheap slices instead of copies.
pub struct InMemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all object paths.
    pub fn paths(&self) -> Vec<String> {
        let map = self.objects.read().expect("lock poisoned");
        let mut paths: Vec<String> = map.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn get(&self, path: &str) -> StoreResult<Bytes> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn read_at(&self, path: &str, offset: u64, length: u64) -> StoreResult<Bytes> {
        let data = self.get(path)?;
        let len = data.len() as u64;
        let start = offset.min(len);
        let end = offset.saturating_add(length).min(len);
        Ok(data.slice(start as usize..end as usize))
    }

    async fn read_all(&self, path: &str) -> StoreResult<Bytes> {
        self.get(path)
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        self.get(path).map(|data| data.len() as u64)
    }

    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()> {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(path.to_string(), data);
        Ok(())
    }

    async fn delete_with_prefix(&self, prefix: &str) -> StoreResult<()> {
        self.objects
            .write()
            .expect("lock poisoned")
            .retain(|path, _| !path.starts_with(prefix));
        Ok(())
    }

    async fn upload_signed_url(&self, _path: &str, _ttl: Duration) -> StoreResult<String> {
        Err(StoreError::Unsupported {
            backend: "memory",
            operation: "signed upload URLs",
        })
    }

    fn details(&self) -> String {
        format!("[In-memory storage, {} objects]", self.len())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("object_count", &self.len())
            .finish()
    }
}
