//! Resolved AWS identity

use aws_credential_types::Credentials;

/// Where an identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Override, environment or shared credentials file
    Permanent,
    /// Instance metadata service; always carries a session token
    Temporary,
}

/// Immutable once built. Re-resolve for fresh credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: Option<String>,
    provenance: Provenance,
}

impl Identity {
    pub fn permanent(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            region,
            provenance: Provenance::Permanent,
        }
    }

    pub fn temporary(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: impl Into<String>,
        region: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: Some(session_token.into()),
            region,
            provenance: Provenance::Temporary,
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Credential clause embedded verbatim in COPY and UNLOAD text.
    ///
    /// `aws_access_key_id=<k>;aws_secret_access_key=<s>[;token=<t>]`
    pub fn connection_string(&self) -> String {
        let mut clause = format!(
            "aws_access_key_id={};aws_secret_access_key={}",
            self.access_key, self.secret_key
        );
        if let Some(ref token) = self.session_token {
            clause.push_str(";token=");
            clause.push_str(token);
        }
        clause
    }

    /// SDK credentials for building S3 / Comprehend clients
    pub fn sdk_credentials(&self) -> Credentials {
        Credentials::new(
            &self.access_key,
            &self.secret_key,
            self.session_token.clone(),
            None,
            "redload",
        )
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("region", &self.region)
            .field("provenance", &self.provenance)
            .finish()
    }
}
