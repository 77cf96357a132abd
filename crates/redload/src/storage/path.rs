//! Object paths

use std::fmt;

use super::StorageError;
use crate::config::EtlConfig;
use crate::error::EtlResult;

/// A fully qualified `s3://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Path {
    bucket: String,
    key: String,
}

impl S3Path {
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        let rest = path
            .strip_prefix("s3://")
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;

        let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
        let bucket = segments
            .next()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
        let key = segments.collect::<Vec<_>>().join("/");

        if key.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key,
        })
    }

    /// Absolute `s3://` paths are taken as-is; anything else is a sub-path
    /// of the configured base path.
    pub fn resolve(path: &str, config: &EtlConfig) -> EtlResult<Self> {
        if path.starts_with("s3://") {
            Ok(Self::parse(path)?)
        } else {
            S3RelativeFilePath::new(path).resolve(config)
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last key segment
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: format!("{}{}", self.key, extension),
        }
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// A location relative to `REDLOAD_S3_BASE_PATH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3RelativeFilePath {
    sub_path: String,
}

impl S3RelativeFilePath {
    pub fn new(sub_path: impl Into<String>) -> Self {
        Self {
            sub_path: sub_path.into(),
        }
    }

    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    pub fn resolve(&self, config: &EtlConfig) -> EtlResult<S3Path> {
        let base = config.require_s3_base_path()?;
        Ok(S3Path::parse(&join_path(base, &self.sub_path))?)
    }
}

/// Join two path fragments with exactly one `/` between them
pub fn join_path(base: &str, tail: &str) -> String {
    if tail.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), tail.trim_start_matches('/'))
}
