use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::EXTENSION_CREATION;

/// Identifies what is being uploaded and where it goes.
///
/// Immutable once an upload begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Last-modified time as reported by the byte source (seconds or
    /// milliseconds, whatever the caller uses consistently).
    pub last_modified_hint: i64,
    /// Logical destination, e.g. a chat room id.
    pub container_id: String,
}

impl UploadTarget {
    /// Computes the resume-ledger key for this target.
    pub fn fingerprint(&self) -> FileFingerprint {
        FileFingerprint::of(self)
    }
}

/// Prefix of every fingerprint; bumped if the identity scheme changes.
const FINGERPRINT_PREFIX: &str = "rd1-";

/// Deterministic identity of a logical upload, used as the resume-ledger key.
///
/// Derived from `(container_id, file_name, size_bytes, last_modified_hint)`.
/// Fields are length-prefixed before hashing so that no two field splits
/// produce the same input. Two different files that agree on all four fields
/// share a fingerprint and are treated as the same upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    /// Computes the fingerprint of `target`.
    pub fn of(target: &UploadTarget) -> Self {
        let mut hasher = Sha256::new();
        for field in [target.container_id.as_bytes(), target.file_name.as_bytes()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        hasher.update(target.size_bytes.to_le_bytes());
        hasher.update(target.last_modified_hint.to_le_bytes());
        Self(format!("{FINGERPRINT_PREFIX}{}", hex::encode(hasher.finalize())))
    }

    /// Returns the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the server advertised in response to the capability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Version the server answered the probe with.
    pub protocol_version: String,
    /// All versions the server supports, in its order of preference.
    pub supported_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl ServerCapabilities {
    /// Returns `true` if the server advertises the named extension.
    pub fn supports(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    /// Returns `true` if uploads can be created with POST.
    pub fn supports_creation(&self) -> bool {
        self.supports(EXTENSION_CREATION)
    }

    /// Returns `true` if the server speaks `version`.
    pub fn supports_version(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }

    /// Returns `true` if an upload of `size` bytes is within the server limit.
    pub fn accepts_size(&self, size: u64) -> bool {
        self.max_upload_size_bytes.is_none_or(|max| size <= max)
    }
}
