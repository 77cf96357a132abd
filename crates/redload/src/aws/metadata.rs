//! Instance metadata service client
//!
//! Two unauthenticated GETs: the base URL answers with the attached role
//! name as plain text, `base + role` answers with the credential document.

use serde::Deserialize;
use tracing::{debug, info};

use super::CredentialError;

/// Role-scoped credentials listing on EC2.
pub const DEFAULT_METADATA_CREDENTIALS_URL: &str =
    "http://169.254.169.254/latest/meta-data/iam/security-credentials/";

/// Credential document served for a role
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_METADATA_CREDENTIALS_URL)
    }

    /// Point at another listing, e.g. a mock server in tests
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn role_name(&self) -> Result<String, CredentialError> {
        let body = self
            .http
            .get(&self.base_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let role = body.lines().next().unwrap_or_default().trim().to_string();
        if role.is_empty() {
            return Err(CredentialError::MalformedDocument(
                "metadata service returned no role name".to_string(),
            ));
        }

        debug!(role = %role, "Discovered instance role");
        Ok(role)
    }

    pub async fn role_credentials(&self, role: &str) -> Result<RoleCredentials, CredentialError> {
        let url = format!("{}{}", self.base_url, role);
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str(&body).map_err(|e| {
            CredentialError::MalformedDocument(format!("credential document for '{}': {}", role, e))
        })
    }

    /// Role lookup followed by the credential document fetch
    pub async fn request_temporary_credentials(&self) -> Result<RoleCredentials, CredentialError> {
        let role = self.role_name().await?;
        let credentials = self.role_credentials(&role).await?;
        info!(role = %role, "Obtained temporary credentials from instance metadata");
        Ok(credentials)
    }
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = MetadataClient::with_base_url("http://127.0.0.1:9/creds");
        assert_eq!(client.base_url(), "http://127.0.0.1:9/creds/");
    }

    #[test]
    fn test_credential_document_parses_pascal_case() {
        let doc = r#"{
            "Code": "Success",
            "AccessKeyId": "aws_mock_key",
            "SecretAccessKey": "aws_mock_secret",
            "Token": "aws_mock_token",
            "Expiration": "2026-10-18T12:00:00Z"
        }"#;
        let creds: RoleCredentials = serde_json::from_str(doc).unwrap();
        assert_eq!(creds.access_key_id, "aws_mock_key");
        assert_eq!(creds.secret_access_key, "aws_mock_secret");
        assert_eq!(creds.token, "aws_mock_token");
    }
}
