//! AWS identity for bulk-load operations
//!
//! The resolved [`Identity`] is used twice: to build object-storage
//! clients, and as the credential clause of COPY/UNLOAD statements via
//! [`Identity::connection_string`].
//!
//! ```no_run
//! use redload::aws::{CredentialOverrides, CredentialResolver};
//! use redload::config::EtlConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EtlConfig::load()?;
//! let identity = CredentialResolver::new(&config)
//!     .resolve(&CredentialOverrides::default())
//!     .await?;
//! println!("{:?}", identity.provenance());
//! # Ok(())
//! # }
//! ```

mod identity;
mod metadata;
mod probe;
mod resolver;

use thiserror::Error;

pub use identity::{Identity, Provenance};
pub use metadata::{MetadataClient, RoleCredentials, DEFAULT_METADATA_CREDENTIALS_URL};
pub use probe::{AwsProbe, IdentityProbe, ProbeError, PUBLICLY_LISTABLE_S3_BUCKET};
pub use resolver::{CredentialOverrides, CredentialResolver};

#[derive(Error, Debug)]
pub enum CredentialError {
    /// Talking to the metadata service failed
    #[error("Metadata service request failed: {0}")]
    MetadataService(#[from] reqwest::Error),

    #[error("Malformed credential response: {0}")]
    MalformedDocument(String),

    /// Verification failed for a reason other than access control
    #[error("Credential verification failed: {0}")]
    Verification(String),

    /// Both tiers failed
    #[error("No usable credentials (permanent: {permanent}; temporary: {temporary})")]
    Exhausted {
        permanent: String,
        temporary: Box<CredentialError>,
    },
}
