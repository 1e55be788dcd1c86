//! Remote catalog port (driven/secondary port)
//!
//! This module defines the interface to the managed-repository catalog: a
//! hierarchy of collections holding data objects. The production adapter is
//! the HTTP client in `stager-catalog`; an in-memory adapter lives next to it.
//!
//! ## Design Notes
//!
//! - Unlike the job store, errors here are classified ([`CatalogError`]) because
//!   the path resolver must tell "not found" and "access denied" apart.
//! - Uses `#[async_trait]` for async trait methods.
//! - Paths are namespace-local strings (no `i:` prefix).

use std::path::Path;

use thiserror::Error;

use crate::domain::{Checksum, Namespace, NodeKind, PathInfo};

/// A node as reported by a catalog stat or listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Absolute catalog path
    pub path: String,
    /// `RegularFile` for data objects, `Directory` for collections
    pub kind: NodeKind,
    /// Byte size (data objects only)
    pub size: u64,
    /// Digest registered in the catalog, if one was ever computed
    pub checksum: Option<Checksum>,
}

impl CatalogEntry {
    #[must_use]
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Directory,
            size: 0,
            checksum: None,
        }
    }

    #[must_use]
    pub fn data_object(path: impl Into<String>, size: u64, checksum: Option<Checksum>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::RegularFile,
            size,
            checksum,
        }
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Convert to the engine's path descriptor
    #[must_use]
    pub fn to_path_info(&self) -> PathInfo {
        match self.kind {
            NodeKind::RegularFile => {
                PathInfo::file(Namespace::RemoteCatalog, self.path.clone(), self.size)
                    .with_checksum(self.checksum.clone())
            }
            NodeKind::Directory => PathInfo::directory(Namespace::RemoteCatalog, self.path.clone()),
            NodeKind::Unknown => PathInfo::unknown(Namespace::RemoteCatalog, self.path.clone()),
        }
    }
}

/// Errors reported by catalog adapters
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Credentials were rejected
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The catalog answered with a non-zero status code
    #[error("catalog error {code}: {message}")]
    Api { code: i64, message: String },

    /// The request never produced a usable answer
    #[error("transport error: {0}")]
    Transport(String),

    /// Local side of a download/upload failed
    #[error("local I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err.to_string())
    }
}

/// Port for the remote managed-repository catalog
#[async_trait::async_trait]
pub trait ICatalog: Send + Sync {
    /// Single metadata lookup; `Ok(None)` when nothing exists at `path`
    async fn stat(&self, path: &str) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Direct children of a collection: data objects and sub-collections
    async fn list(&self, collection: &str) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Create a collection and any missing parents; succeeds if it exists
    async fn make_collection(&self, path: &str) -> Result<(), CatalogError>;

    /// Copy a data object to a local file, returning the bytes written
    ///
    /// The parent directory of `local` must already exist.
    async fn download(&self, path: &str, local: &Path) -> Result<u64, CatalogError>;

    /// Copy a local file into a data object, returning the bytes sent
    async fn upload(&self, local: &Path, path: &str) -> Result<u64, CatalogError>;

    /// Have the catalog compute (and register) the digest of a data object
    async fn compute_checksum(&self, path: &str) -> Result<Checksum, CatalogError>;

    /// Re-read a collection into the adapter's listing cache, if it has one
    async fn refresh_listing(&self, _collection: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}
