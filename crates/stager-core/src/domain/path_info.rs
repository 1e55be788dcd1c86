//! Resolved path descriptors and content identity
//!
//! A [`PathInfo`] is the result of exactly one metadata lookup against the
//! backend owning a locator. It is a transient value handed between pipeline
//! stages by value.
//!
//! ## Design Notes
//!
//! - `checksum` is only filled for local files when a caller asks for it,
//!   because hashing reads the whole file. Catalog stats may carry it for free.
//! - Content identity is governed by an explicit [`IdentityPolicy`]; the
//!   default never skips a transfer it cannot verify.

use serde::{Deserialize, Serialize};

use super::locator::Namespace;
use super::newtypes::Checksum;

/// Kind of node a locator resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    RegularFile,
    Directory,
    /// Anything else (symlink targets we do not follow, devices, absent nodes)
    Unknown,
}

/// Resolved descriptor of a namespace location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    path: String,
    namespace: Namespace,
    node_kind: NodeKind,
    size: u64,
    checksum: Option<Checksum>,
}

impl PathInfo {
    /// Descriptor for a regular file of `size` bytes
    #[must_use]
    pub fn file(namespace: Namespace, path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            namespace,
            node_kind: NodeKind::RegularFile,
            size,
            checksum: None,
        }
    }

    /// Descriptor for a directory or collection
    #[must_use]
    pub fn directory(namespace: Namespace, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace,
            node_kind: NodeKind::Directory,
            size: 0,
            checksum: None,
        }
    }

    /// Descriptor for a node of unknown kind, including a location that does
    /// not exist yet (a transfer target)
    #[must_use]
    pub fn unknown(namespace: Namespace, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace,
            node_kind: NodeKind::Unknown,
            size: 0,
            checksum: None,
        }
    }

    /// Attach a checksum
    #[must_use]
    pub fn with_checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub fn node_kind(&self) -> NodeKind {
        self.node_kind
    }

    /// Byte length; meaningful only for regular files
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.node_kind == NodeKind::RegularFile
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.node_kind == NodeKind::Directory
    }

    /// Whether `self` and `other` denote the same content under `policy`
    ///
    /// Only regular files can be identical; a directory or missing node
    /// never matches.
    #[must_use]
    pub fn same_as(&self, other: &PathInfo, policy: IdentityPolicy) -> bool {
        if !self.is_file() || !other.is_file() || self.size != other.size {
            return false;
        }
        match policy {
            IdentityPolicy::Never => false,
            IdentityPolicy::SizeOnly => true,
            IdentityPolicy::Checksum => match (&self.checksum, &other.checksum) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

// ============================================================================
// IdentityPolicy
// ============================================================================

/// Rule deciding when an existing destination file may be left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Equal size and equal checksums on both sides; unverifiable means "transfer"
    #[default]
    Checksum,
    /// Equal size alone is treated as identical
    SizeOnly,
    /// Always transfer
    Never,
}

impl IdentityPolicy {
    /// Whether the policy needs checksums on both sides to decide
    #[must_use]
    pub fn needs_checksum(self) -> bool {
        matches!(self, IdentityPolicy::Checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(data: &[u8]) -> Option<Checksum> {
        Some(Checksum::sha256_of(data))
    }

    fn local(size: u64, checksum: Option<Checksum>) -> PathInfo {
        PathInfo::file(Namespace::LocalFilesystem, "/data/f", size).with_checksum(checksum)
    }

    fn remote(size: u64, checksum: Option<Checksum>) -> PathInfo {
        PathInfo::file(Namespace::RemoteCatalog, "/zone/f", size).with_checksum(checksum)
    }

    #[test]
    fn test_checksum_policy_requires_both_checksums() {
        let policy = IdentityPolicy::Checksum;
        assert!(remote(5, sum(b"hello")).same_as(&local(5, sum(b"hello")), policy));
        assert!(!remote(5, sum(b"hello")).same_as(&local(5, None), policy));
        assert!(!remote(5, None).same_as(&local(5, sum(b"hello")), policy));
        assert!(!remote(5, None).same_as(&local(5, None), policy));
    }

    #[test]
    fn test_checksum_policy_rejects_different_content() {
        let policy = IdentityPolicy::Checksum;
        assert!(!remote(5, sum(b"hello")).same_as(&local(5, sum(b"world")), policy));
        assert!(!remote(4, sum(b"hello")).same_as(&local(5, sum(b"hello")), policy));
    }

    #[test]
    fn test_size_only_policy_ignores_checksums() {
        let policy = IdentityPolicy::SizeOnly;
        assert!(remote(5, None).same_as(&local(5, None), policy));
        assert!(remote(5, sum(b"hello")).same_as(&local(5, sum(b"world")), policy));
        assert!(!remote(6, None).same_as(&local(5, None), policy));
    }

    #[test]
    fn test_never_policy() {
        let policy = IdentityPolicy::Never;
        assert!(!remote(5, sum(b"hello")).same_as(&local(5, sum(b"hello")), policy));
    }

    #[test]
    fn test_directories_and_missing_nodes_never_match() {
        let dir = PathInfo::directory(Namespace::RemoteCatalog, "/zone/f");
        let missing = PathInfo::unknown(Namespace::RemoteCatalog, "/zone/f");
        let file = local(0, None);
        assert!(!dir.same_as(&file, IdentityPolicy::SizeOnly));
        assert!(!missing.same_as(&file, IdentityPolicy::SizeOnly));
    }

    #[test]
    fn test_local_descriptor_has_no_checksum_by_default() {
        let info = PathInfo::file(Namespace::LocalFilesystem, "/data/f", 10);
        assert!(info.checksum().is_none());
        assert!(info.is_file());
        assert!(!info.is_dir());
    }

    #[test]
    fn test_policy_serde_names() {
        let p: IdentityPolicy = serde_yaml::from_str("size_only").unwrap();
        assert_eq!(p, IdentityPolicy::SizeOnly);
        assert_eq!(IdentityPolicy::default(), IdentityPolicy::Checksum);
        assert!(IdentityPolicy::Checksum.needs_checksum());
        assert!(!IdentityPolicy::SizeOnly.needs_checksum());
    }
}
