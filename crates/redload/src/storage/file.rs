//! Handle on a single stored object

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ObjectStorage, S3Path};
use crate::error::{EtlError, EtlResult};

/// Prefix for files materialized by [`S3File::download_to_temp`].
pub const DOWNLOAD_PREFIX: &str = "s3_download_";

const EMPTY_UPLOAD_MESSAGE: &str = "The file you've uploaded to S3 has a size of 0 KB";

#[derive(Clone)]
pub struct S3File {
    path: S3Path,
    storage: Arc<dyn ObjectStorage>,
}

impl fmt::Debug for S3File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3File").field("path", &self.path).finish()
    }
}

impl S3File {
    /// Wrap an object that already exists
    pub fn new(path: S3Path, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { path, storage }
    }

    pub async fn from_in_memory_data(
        storage: Arc<dyn ObjectStorage>,
        data: Vec<u8>,
        destination: S3Path,
    ) -> EtlResult<Self> {
        let file = Self::new(destination, storage);
        file.upload(data).await?;
        Ok(file)
    }

    pub async fn from_local_file(
        storage: Arc<dyn ObjectStorage>,
        local_path: &Path,
        destination: S3Path,
    ) -> EtlResult<Self> {
        let data = tokio::fs::read(local_path).await?;
        debug!(local = %local_path.display(), bytes = data.len(), "Read local file");
        Self::from_in_memory_data(storage, data, destination).await
    }

    pub async fn from_json_serializable<T: Serialize + ?Sized>(
        storage: Arc<dyn ObjectStorage>,
        value: &T,
        destination: S3Path,
    ) -> EtlResult<Self> {
        let data = serde_json::to_vec(value)?;
        Self::from_in_memory_data(storage, data, destination).await
    }

    pub fn path(&self) -> &S3Path {
        &self.path
    }

    /// Object size in bytes; a missing object reports 0
    pub async fn file_size(&self) -> EtlResult<i64> {
        Ok(self.storage.content_length(&self.path).await?.unwrap_or(0))
    }

    pub async fn read(&self) -> EtlResult<Vec<u8>> {
        Ok(self.storage.get(&self.path).await?)
    }

    pub async fn download(&self, local_path: &Path) -> EtlResult<PathBuf> {
        let data = self.read().await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;

        info!(local = %local_path.display(), bytes = data.len(), "Downloaded {}", self.path);
        Ok(local_path.to_path_buf())
    }

    /// Download into `dir` as `s3_download_<file name>`
    pub async fn download_to_temp(&self, dir: &Path) -> EtlResult<PathBuf> {
        let local_path = dir.join(format!("{}{}", DOWNLOAD_PREFIX, self.path.file_name()));
        self.download(&local_path).await
    }

    async fn upload(&self, data: Vec<u8>) -> EtlResult<()> {
        self.storage.put(&self.path, data).await?;

        if self.file_size().await? == 0 {
            return Err(EtlError::no_data_found(EMPTY_UPLOAD_MESSAGE));
        }
        Ok(())
    }
}

/// Remove a local scratch file; a failure is logged, never returned
pub async fn remove_scratch_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed scratch file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove scratch file"),
    }
}
