//! Object storage
//!
//! [`ObjectStorage`] is the narrow surface ingestion needs: put, get and
//! size. [`S3Storage`] talks to S3 (or MinIO) with a resolved
//! [`Identity`]; [`MemoryStorage`] keeps objects in a map for offline runs
//! and tests.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::Region,
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::aws::Identity;

mod file;
mod memory;
mod path;

pub use file::{remove_scratch_file, S3File};
pub use memory::MemoryStorage;
pub use path::{join_path, S3Path, S3RelativeFilePath};

/// Region for S3 clients when the identity carries none.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid S3 path '{0}': expected s3://bucket/key")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("S3 request failed for {path}: {message}")]
    Request { path: String, message: String },
}

impl StorageError {
    fn request<E>(path: &S3Path, err: E) -> Self
    where
        E: std::error::Error,
    {
        Self::Request {
            path: path.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, path: &S3Path, data: Vec<u8>) -> StorageResult<()>;

    async fn get(&self, path: &S3Path) -> StorageResult<Vec<u8>>;

    /// `None` when the object does not exist
    async fn content_length(&self, path: &S3Path) -> StorageResult<Option<i64>>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(identity: &Identity, endpoint: Option<&str>) -> Self {
        let region = identity.region().unwrap_or(DEFAULT_S3_REGION).to_string();

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(identity.sdk_credentials())
            .region(Region::new(region));

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        debug!(endpoint = ?endpoint, "S3 client initialized");

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn put(&self, path: &S3Path, data: Vec<u8>) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(path.bucket())
            .key(path.key())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::request(path, e))?;

        info!("Uploaded {}", path);
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &S3Path) -> StorageResult<Vec<u8>> {
        let response = match self
            .client
            .get_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
        {
            Ok(response) => response,
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                return Err(StorageError::NotFound(path.to_string()));
            },
            Err(e) => return Err(StorageError::request(path, e)),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::request(path, e))?
            .into_bytes()
            .to_vec();

        debug!(bytes = data.len(), "Downloaded {}", path);
        Ok(data)
    }

    async fn content_length(&self, path: &S3Path) -> StorageResult<Option<i64>> {
        match self
            .client
            .head_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0))),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(None),
            Err(e) => Err(StorageError::request(path, e)),
        }
    }
}
