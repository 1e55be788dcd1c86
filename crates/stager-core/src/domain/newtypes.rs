//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// JobId
// ============================================================================

/// Identifier of a staging job
///
/// Job ids are assigned by the queue layer and are opaque to the stager;
/// only non-emptiness and the absence of whitespace are enforced, since the
/// id ends up in file names and command lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Create a new JobId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains whitespace
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidId("Job id cannot be empty".to_string()));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidId(format!(
                "Job id must not contain whitespace: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random job id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for JobId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// Content digest in the catalog's `<algorithm>:<base64 digest>` form
///
/// The remote catalog reports digests such as `sha2:q1E...=`. Local files
/// are hashed with SHA-256 and rendered the same way, so two checksums are
/// comparable as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Algorithm prefix used for SHA-256 digests
    pub const SHA256_PREFIX: &'static str = "sha2";

    /// Create a new Checksum
    ///
    /// # Errors
    /// Returns error if the value is empty or has no `algorithm:` prefix
    pub fn new(value: String) -> Result<Self, DomainError> {
        let value = value.trim().to_string();
        match value.split_once(':') {
            Some((algo, digest)) if !algo.is_empty() && !digest.is_empty() => Ok(Self(value)),
            _ => Err(DomainError::InvalidChecksum(format!(
                "expected <algorithm>:<digest>, got {value:?}"
            ))),
        }
    }

    /// Build a checksum from a raw SHA-256 digest
    #[must_use]
    pub fn from_sha256_digest(digest: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(digest);
        Self(format!("{}:{}", Self::SHA256_PREFIX, encoded))
    }

    /// Compute the SHA-256 checksum of an in-memory buffer
    #[must_use]
    pub fn sha256_of(data: &[u8]) -> Self {
        Self::from_sha256_digest(&Sha256::digest(data))
    }

    /// The algorithm part, e.g. `sha2`
    #[must_use]
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(algo, _)| algo).unwrap_or("")
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Checksum {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.0
    }
}
