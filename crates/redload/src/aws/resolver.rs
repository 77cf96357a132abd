//! Credential resolution chain
//!
//! Tier one merges explicit overrides, configuration (environment) and the
//! shared credentials file, in that precedence, and proves the result works.
//! Only a provider rejection moves on to tier two, the instance metadata
//! service; temporary credentials are trusted without another probe.

use aws_config::meta::region::ProvideRegion;
use aws_config::profile::{ProfileFileCredentialsProvider, ProfileFileRegionProvider};
use aws_credential_types::provider::ProvideCredentials;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    AwsProbe, CredentialError, Identity, IdentityProbe, MetadataClient, ProbeError,
    PUBLICLY_LISTABLE_S3_BUCKET,
};
use crate::config::EtlConfig;

/// Explicit values that beat every other source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialOverrides {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

impl CredentialOverrides {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: Some(access_key_id.into()),
            secret_access_key: Some(secret_access_key.into()),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Values read from the shared credentials/config files
#[derive(Debug, Clone, Default)]
struct FileTier {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: Option<String>,
}

pub struct CredentialResolver {
    probe: Arc<dyn IdentityProbe>,
    metadata: MetadataClient,
    read_profile_file: bool,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: Option<String>,
    probe_bucket: String,
}

impl CredentialResolver {
    pub fn new(config: &EtlConfig) -> Self {
        Self {
            probe: Arc::new(AwsProbe::new().with_s3_endpoint(config.s3_endpoint.clone())),
            metadata: MetadataClient::new(),
            read_profile_file: true,
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            region: config.aws_region.clone(),
            probe_bucket: config
                .base_bucket()
                .unwrap_or(PUBLICLY_LISTABLE_S3_BUCKET)
                .to_string(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn IdentityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_metadata_client(mut self, metadata: MetadataClient) -> Self {
        self.metadata = metadata;
        self
    }

    /// Skip `~/.aws/credentials` and `~/.aws/config`
    pub fn without_profile_file(mut self) -> Self {
        self.read_profile_file = false;
        self
    }

    /// Bucket the permanent-credential check will hit
    pub fn probe_bucket(&self) -> &str {
        &self.probe_bucket
    }

    #[instrument(skip(self, overrides), fields(bucket = %self.probe_bucket))]
    pub async fn resolve(&self, overrides: &CredentialOverrides) -> Result<Identity, CredentialError> {
        let file = if self.read_profile_file {
            load_profile_file().await
        } else {
            FileTier::default()
        };

        let access_key = overrides
            .access_key_id
            .clone()
            .or_else(|| self.access_key_id.clone())
            .or(file.access_key_id);
        let secret_key = overrides
            .secret_access_key
            .clone()
            .or_else(|| self.secret_access_key.clone())
            .or(file.secret_access_key);
        let region = overrides
            .region
            .clone()
            .or_else(|| self.region.clone())
            .or(file.region);

        let rejection = match (access_key, secret_key) {
            (Some(key), Some(secret)) => {
                let identity = Identity::permanent(key, secret, region);
                match self.probe.verify(&identity, &self.probe_bucket).await {
                    Ok(()) => {
                        info!("Using permanent credentials");
                        return Ok(identity);
                    },
                    Err(ProbeError::AccessDenied(reason)) => {
                        warn!(reason = %reason, "Permanent credentials rejected, requesting temporary credentials");
                        reason
                    },
                    Err(ProbeError::Other(reason)) => {
                        return Err(CredentialError::Verification(reason));
                    },
                }
            },
            _ => {
                debug!("No permanent credentials found, requesting temporary credentials");
                "no permanent credentials configured".to_string()
            },
        };

        let role = self
            .metadata
            .request_temporary_credentials()
            .await
            .map_err(|e| CredentialError::Exhausted {
                permanent: rejection,
                temporary: Box::new(e),
            })?;

        Ok(Identity::temporary(
            role.access_key_id,
            role.secret_access_key,
            role.token,
            self.region.clone(),
        ))
    }
}

async fn load_profile_file() -> FileTier {
    let mut tier = FileTier::default();

    match ProfileFileCredentialsProvider::builder()
        .build()
        .provide_credentials()
        .await
    {
        Ok(credentials) => {
            tier.access_key_id = Some(credentials.access_key_id().to_string());
            tier.secret_access_key = Some(credentials.secret_access_key().to_string());
        },
        Err(e) => debug!(error = %e, "No usable shared credentials file"),
    }

    tier.region = ProfileFileRegionProvider::new()
        .region()
        .await
        .map(|region| region.to_string());

    tier
}
