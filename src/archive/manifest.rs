//! Archive manifest: provenance plus a checksum for every entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::analysis::AnalyzerKind;

/// Current manifest schema version.
///
/// Increment this when making breaking changes to the manifest layout.
pub const MANIFEST_VERSION: u32 = 1;

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub manifest_version: u32,
    pub created_utc: DateTime<Utc>,
    pub producer: ProducerInfo,
    pub dataset: String,
    pub dialect: String,
    /// Analyzers in archive order
    pub analyzers: Vec<AnalyzerKind>,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub app_name: String,
    pub app_version: String,
}

impl ProducerInfo {
    pub fn current() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    /// Lowercase hex SHA-256 of the entry's bytes
    pub sha256: String,
    pub size_bytes: u64,
}

impl ManifestEntry {
    pub fn for_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len() as u64,
        }
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.size_bytes == bytes.len() as u64 && self.sha256 == sha256_hex(bytes)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("{hash:x}")
}

/// Outcome of checking extracted entries against their manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestCheck {
    pub verified: usize,
    /// Entries whose bytes differ from the recorded checksum
    pub mismatched: Vec<String>,
    /// Entries listed in the manifest but absent from the archive
    pub missing: Vec<String>,
}

impl ManifestCheck {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_entry_matches_only_same_bytes() {
        let entry = ManifestEntry::for_bytes("clinico/tablas/top_diagnosticos.csv", b"a,b\n1,2\n");
        assert!(entry.matches(b"a,b\n1,2\n"));
        assert!(!entry.matches(b"a,b\n1,3\n"));
        assert_eq!(entry.size_bytes, 8);
    }
}
