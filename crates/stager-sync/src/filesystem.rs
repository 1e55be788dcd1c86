//! Local filesystem adapter
//!
//! Thin async layer over `tokio::fs` used by the resolver, the local scanner
//! and the local directory materializer.
//!
//! ## Design Decisions
//!
//! - **Streaming checksums**: files are hashed in fixed-size blocks so large
//!   files never have to fit in memory. The digest is rendered in the
//!   catalog's `sha2:<base64>` form so both sides compare directly.
//! - **Directory mode**: directories are created with mode `0775` (before
//!   umask), matching what a shared staging area expects.
//! - **No symlink following in listings**: [`LocalFileSystem::list_dir`]
//!   reports links as links; callers decide whether to follow them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use stager_core::domain::Checksum;

/// Block size used when hashing
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Mode for directories created on the local side
pub const DIRECTORY_MODE: u32 = 0o775;

/// Kind of a directory entry, without following links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, devices
    Other,
}

/// One entry of a local directory listing
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Turns one listed entry into a [`LocalEntry`]
///
/// An entry whose type cannot be read (typically removed since the
/// directory was read) is logged and left out; its siblings are unaffected.
fn classify_entry(
    path: PathBuf,
    file_type: std::io::Result<std::fs::FileType>,
) -> Option<LocalEntry> {
    let file_type = match file_type {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot stat entry, skipping");
            return None;
        }
    };
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    Some(LocalEntry { path, kind })
}

/// Adapter over the real filesystem
///
/// Zero-sized: every operation takes the path it works on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Metadata of `path` following links; `Ok(None)` if nothing is there
    pub async fn stat(&self, path: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
        match tokio::fs::metadata(path).await {
            Ok(m) => Ok(Some(m)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Direct children of `dir`, sorted by name
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn list_dir(&self, dir: &Path) -> std::io::Result<Vec<LocalEntry>> {
        let mut reader = tokio::fs::read_dir(dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await;
            entries.extend(classify_entry(entry.path(), file_type));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(entries = entries.len(), "directory listed");
        Ok(entries)
    }

    /// SHA-256 of the file at `path`
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn checksum(&self, path: &Path) -> std::io::Result<Checksum> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_BLOCK_SIZE];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let checksum = Checksum::from_sha256_digest(&hasher.finalize());
        debug!(checksum = %checksum, "checksum computed");
        Ok(checksum)
    }

    /// Create `path` and any missing parents; an existing directory is fine
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIRECTORY_MODE);
        builder.create(path).await
    }
}
