//! Usability checks for permanent credentials

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use tracing::debug;

use super::Identity;
use crate::storage::DEFAULT_S3_REGION;

/// Listable by anyone; used when no base bucket is configured.
pub const PUBLICLY_LISTABLE_S3_BUCKET: &str = "example-publicly-accessible";

/// Outcome of a failed probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The provider answered and refused: triggers the temporary tier
    AccessDenied(String),
    /// Transport, construction or response failure: propagates
    Other(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::AccessDenied(msg) => write!(f, "access denied: {}", msg),
            ProbeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Proves that an identity can actually be used
#[async_trait]
pub trait IdentityProbe: Send + Sync {
    async fn verify(&self, identity: &Identity, bucket: &str) -> Result<(), ProbeError>;
}

/// One S3 `HeadBucket` plus one Comprehend `DetectDominantLanguage`
#[derive(Debug, Clone, Default)]
pub struct AwsProbe {
    s3_endpoint: Option<String>,
}

impl AwsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_s3_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.s3_endpoint = endpoint;
        self
    }

    async fn head_bucket(&self, identity: &Identity, bucket: &str) -> Result<(), ProbeError> {
        let region = identity.region().unwrap_or(DEFAULT_S3_REGION).to_string();
        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(identity.sdk_credentials())
            .region(aws_sdk_s3::config::Region::new(region));

        if let Some(ref endpoint) = self.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(builder.build());
        client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("HeadBucket", e))
    }

    async fn detect_language(&self, identity: &Identity) -> Result<(), ProbeError> {
        let region = identity.region().ok_or_else(|| {
            ProbeError::Other("no region configured for the Comprehend check".to_string())
        })?;

        let config = aws_sdk_comprehend::Config::builder()
            .credentials_provider(identity.sdk_credentials())
            .region(aws_sdk_comprehend::config::Region::new(region.to_string()))
            .build();

        aws_sdk_comprehend::Client::from_conf(config)
            .detect_dominant_language()
            .text("test-string")
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("DetectDominantLanguage", e))
    }
}

#[async_trait]
impl IdentityProbe for AwsProbe {
    async fn verify(&self, identity: &Identity, bucket: &str) -> Result<(), ProbeError> {
        debug!(bucket = %bucket, "Verifying permanent credentials");
        self.head_bucket(identity, bucket).await?;
        self.detect_language(identity).await
    }
}

/// Service errors mean the provider rejected the call; anything else is
/// a transport or response problem.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> ProbeError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let detail = format!("{}: {}", operation, DisplayErrorContext(&err));
    match err {
        SdkError::ServiceError(_) => ProbeError::AccessDenied(detail),
        _ => ProbeError::Other(detail),
    }
}
