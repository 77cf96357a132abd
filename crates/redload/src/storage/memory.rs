//! In-process object store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ObjectStorage, S3Path, StorageError, StorageResult};

/// Keeps objects in a map keyed by their `s3://` form
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &S3Path) -> bool {
        self.objects.read().await.contains_key(&path.to_string())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Stored object paths, sorted
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, path: &S3Path, data: Vec<u8>) -> StorageResult<()> {
        self.objects.write().await.insert(path.to_string(), data);
        Ok(())
    }

    async fn get(&self, path: &S3Path) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&path.to_string())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn content_length(&self, path: &S3Path) -> StorageResult<Option<i64>> {
        Ok(self
            .objects
            .read()
            .await
            .get(&path.to_string())
            .map(|data| data.len() as i64))
    }
}
