//! Configuration management
//!
//! `EtlConfig` is read once at startup and handed to the pieces that need
//! it. Nothing caches environment state behind the caller's back; to pick
//! up changed variables, build a fresh value with [`EtlConfig::reload`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EtlError, EtlResult};

// ============================================================================
// Environment Keys
// ============================================================================

/// Base object-storage path, e.g. `s3://ye-bucket/this/isnt/optional`.
pub const S3_BASE_PATH_ENV_VAR: &str = "REDLOAD_S3_BASE_PATH";

/// Audit table override.
pub const AUDIT_TABLE_ENV_VAR: &str = "REDLOAD_INGEST_AUDIT_TABLE";

pub const ACCESS_KEY_ENV_VAR: &str = "REDLOAD_AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV_VAR: &str = "REDLOAD_AWS_SECRET_ACCESS_KEY";
pub const LOCAL_TEMP_DIR_ENV_VAR: &str = "REDLOAD_LOCAL_TEMP_DIR";
pub const S3_ENDPOINT_ENV_VAR: &str = "REDLOAD_S3_ENDPOINT";

// ============================================================================
// Defaults
// ============================================================================

/// Default audit table.
pub const DEFAULT_AUDIT_TABLE: &str = "public.v1_ingest_audit";

/// Default scratch directory name under the system temp dir.
pub const DEFAULT_LOCAL_TEMP_DIR_NAME: &str = "redload";

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Required by every operation that stages objects
    pub s3_base_path: Option<String>,
    pub audit_table: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,
    pub local_temp_dir: PathBuf,
    /// Custom endpoint for S3-compatible stores (MinIO)
    pub s3_endpoint: Option<String>,
}

impl EtlConfig {
    /// Load `.env` (if any) and then the process environment
    pub fn load() -> EtlResult<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Read the process environment without touching `.env`
    pub fn from_env() -> Self {
        Self {
            s3_base_path: non_empty_var(S3_BASE_PATH_ENV_VAR),
            audit_table: non_empty_var(AUDIT_TABLE_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_AUDIT_TABLE.to_string()),
            aws_access_key_id: non_empty_var(ACCESS_KEY_ENV_VAR)
                .or_else(|| non_empty_var("AWS_ACCESS_KEY_ID")),
            aws_secret_access_key: non_empty_var(SECRET_KEY_ENV_VAR)
                .or_else(|| non_empty_var("AWS_SECRET_ACCESS_KEY")),
            aws_region: non_empty_var("AWS_DEFAULT_REGION").or_else(|| non_empty_var("AWS_REGION")),
            local_temp_dir: non_empty_var(LOCAL_TEMP_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOCAL_TEMP_DIR_NAME)),
            s3_endpoint: non_empty_var(S3_ENDPOINT_ENV_VAR),
        }
    }

    /// Re-read the environment into a new value; `self` is untouched
    pub fn reload(&self) -> EtlResult<Self> {
        let fresh = Self::from_env();
        fresh.validate()?;
        Ok(fresh)
    }

    pub fn validate(&self) -> EtlResult<()> {
        if let Some(ref base) = self.s3_base_path {
            if !base.starts_with("s3://") {
                return Err(EtlError::config(format!(
                    "{} must start with s3:// (got '{}')",
                    S3_BASE_PATH_ENV_VAR, base
                )));
            }
        }

        if self.audit_table.split('.').count() != 2 {
            return Err(EtlError::config(format!(
                "Audit table must be schema-qualified as schema.table (got '{}')",
                self.audit_table
            )));
        }

        Ok(())
    }

    /// Guard for operations that need the base path; runs before any I/O
    pub fn require_s3_base_path(&self) -> EtlResult<&str> {
        self.s3_base_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or_else(EtlError::no_s3_base_path)
    }

    /// Bucket of the base path, if one is configured
    pub fn base_bucket(&self) -> Option<&str> {
        self.s3_base_path
            .as_deref()
            .map(|path| path.trim_start_matches("s3://"))
            .and_then(|rest| rest.split('/').next())
            .filter(|bucket| !bucket.is_empty())
    }

    pub fn local_temp_dir(&self) -> &Path {
        &self.local_temp_dir
    }

    pub fn with_s3_base_path(mut self, base: impl Into<String>) -> Self {
        self.s3_base_path = Some(base.into());
        self
    }

    pub fn without_s3_base_path(mut self) -> Self {
        self.s3_base_path = None;
        self
    }

    pub fn with_audit_table(mut self, table: impl Into<String>) -> Self {
        self.audit_table = table.into();
        self
    }

    pub fn with_local_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_temp_dir = dir.into();
        self
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            s3_base_path: None,
            audit_table: DEFAULT_AUDIT_TABLE.to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: None,
            local_temp_dir: std::env::temp_dir().join(DEFAULT_LOCAL_TEMP_DIR_NAME),
            s3_endpoint: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_guard_without_base_path() {
        let config = EtlConfig::default();
        assert!(matches!(
            config.require_s3_base_path(),
            Err(EtlError::NoS3BasePath(_))
        ));
    }

    #[test]
    fn test_guard_with_base_path() {
        let config = EtlConfig::default().with_s3_base_path("any-string-will-do");
        assert_eq!(config.require_s3_base_path().unwrap(), "any-string-will-do");
    }

    #[test]
    fn test_base_bucket() {
        let config = EtlConfig::default().with_s3_base_path("s3://useful-things/klaatu/barada");
        assert_eq!(config.base_bucket(), Some("useful-things"));
        assert_eq!(EtlConfig::default().base_bucket(), None);
    }

    #[test]
    fn test_validate_rejects_non_s3_base_path() {
        let config = EtlConfig::default().with_s3_base_path("/local/path");
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unqualified_audit_table() {
        let config = EtlConfig::default().with_audit_table("ingest_audit");
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_reload_sees_environment_changes() {
        std::env::remove_var(S3_BASE_PATH_ENV_VAR);
        let before = EtlConfig::from_env();
        assert_eq!(before.s3_base_path, None);

        std::env::set_var(S3_BASE_PATH_ENV_VAR, "s3://reloaded-bucket/prefix");
        let after = before.reload().unwrap();
        std::env::remove_var(S3_BASE_PATH_ENV_VAR);

        assert_eq!(before.s3_base_path, None);
        assert_eq!(after.s3_base_path.as_deref(), Some("s3://reloaded-bucket/prefix"));
    }

    #[test]
    #[serial]
    fn test_prefixed_keys_win_over_standard_aws_keys() {
        std::env::set_var(ACCESS_KEY_ENV_VAR, "prefixed_key");
        std::env::set_var("AWS_ACCESS_KEY_ID", "standard_key");

        let config = EtlConfig::from_env();

        std::env::remove_var(ACCESS_KEY_ENV_VAR);
        std::env::remove_var("AWS_ACCESS_KEY_ID");

        assert_eq!(config.aws_access_key_id.as_deref(), Some("prefixed_key"));
    }
}
