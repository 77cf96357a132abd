//! COPY manifests

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// COPY fails when a mandatory object is missing
    pub mandatory: bool,
}

/// List of objects loaded by one manifest COPY
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadManifest {
    pub entries: Vec<ManifestEntry>,
}

impl LoadManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mandatory(mut self, url: impl Into<String>) -> Self {
        self.entries.push(ManifestEntry {
            url: url.into(),
            mandatory: true,
        });
        self
    }

    pub fn optional(mut self, url: impl Into<String>) -> Self {
        self.entries.push(ManifestEntry {
            url: url.into(),
            mandatory: false,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
