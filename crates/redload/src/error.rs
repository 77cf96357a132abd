//! Error types
//!
//! Each layer keeps its own enum so a caller can tell a configuration
//! problem from a transient access problem from a data problem. Nothing
//! here is flattened into a string-only catch-all.

use thiserror::Error;

use crate::aws::CredentialError;
use crate::db::DbError;
use crate::storage::StorageError;

/// Result type alias for ingestion operations
pub type EtlResult<T> = std::result::Result<T, EtlError>;

/// Fixed message for the missing base path guard.
pub const NO_S3_BASE_PATH_MESSAGE: &str = "You must set an S3 base path to access this functionality. \
     Check the docs around configuration of environment variables.";

/// Fixed message for manifest loads against the Postgres stand-in.
pub const POSTGRES_MANIFEST_MESSAGE: &str = "Postgres cannot handle manifests like redshift. Sorry.";

#[derive(Error, Debug)]
pub enum EtlError {
    /// A guarded operation ran without `REDLOAD_S3_BASE_PATH`
    #[error("{0}")]
    NoS3BasePath(String),

    /// Configuration is present but invalid
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// An uploaded object ended up empty
    #[error("{0}")]
    NoDataFound(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The selected engine cannot perform the requested operation
    #[error("{0}")]
    Unsupported(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EtlError {
    pub fn no_s3_base_path() -> Self {
        Self::NoS3BasePath(NO_S3_BASE_PATH_MESSAGE.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn no_data_found(msg: impl Into<String>) -> Self {
        Self::NoDataFound(msg.into())
    }

    pub fn invalid_destination(msg: impl Into<String>) -> Self {
        Self::InvalidDestination(msg.into())
    }

    pub fn postgres_manifest() -> Self {
        Self::Unsupported(POSTGRES_MANIFEST_MESSAGE.to_string())
    }
}
