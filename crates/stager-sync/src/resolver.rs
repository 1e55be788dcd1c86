//! Path resolution
//!
//! Turns a locator into a [`PathInfo`] with exactly one metadata lookup
//! against the owning backend, and decides whether two resolved files hold
//! the same content.
//!
//! ## Design Notes
//!
//! - Resolution never recurses; directories resolve to a bare descriptor.
//! - Remote checksums come for free with the catalog stat. Local checksums
//!   cost a full read, so [`identical`] only computes one when the sizes
//!   already match and the other side has a digest to compare against.

use std::io::ErrorKind;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use stager_core::domain::{Locator, Namespace, PathInfo};
use stager_core::ports::CatalogError;

use crate::context::ExecutionContext;

/// Why a locator could not be resolved
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("access to {0} denied")]
    AccessDenied(String),

    #[error("cannot stat {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ResolveError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }
}

/// Resolve a locator
pub async fn resolve(ctx: &ExecutionContext, locator: &Locator) -> Result<PathInfo, ResolveError> {
    resolve_path(ctx, locator.namespace(), locator.path()).await
}

/// Resolve a namespace-local path
pub async fn resolve_path(
    ctx: &ExecutionContext,
    namespace: Namespace,
    path: &str,
) -> Result<PathInfo, ResolveError> {
    match namespace {
        Namespace::LocalFilesystem => resolve_local(ctx, path).await,
        Namespace::RemoteCatalog => resolve_remote(ctx, path).await,
    }
}

async fn resolve_local(ctx: &ExecutionContext, path: &str) -> Result<PathInfo, ResolveError> {
    let meta = match ctx.local.stat(Path::new(path)).await {
        Ok(Some(meta)) => meta,
        Ok(None) => return Err(ResolveError::NotFound(path.to_string())),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(ResolveError::AccessDenied(path.to_string()))
        }
        Err(e) => {
            return Err(ResolveError::Io {
                path: path.to_string(),
                reason: e.to_string(),
            })
        }
    };

    let ns = Namespace::LocalFilesystem;
    Ok(if meta.is_file() {
        PathInfo::file(ns, path, meta.len())
    } else if meta.is_dir() {
        PathInfo::directory(ns, path)
    } else {
        PathInfo::unknown(ns, path)
    })
}

async fn resolve_remote(ctx: &ExecutionContext, path: &str) -> Result<PathInfo, ResolveError> {
    match ctx.catalog.stat(path).await {
        Ok(Some(entry)) => Ok(entry.to_path_info()),
        Ok(None) | Err(CatalogError::NotFound(_)) => Err(ResolveError::NotFound(path.to_string())),
        Err(CatalogError::PermissionDenied(_) | CatalogError::Unauthorized(_)) => {
            Err(ResolveError::AccessDenied(path.to_string()))
        }
        Err(e) => Err(ResolveError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Attach a local checksum to `info` when it has none
///
/// Remote descriptors are returned unchanged.
pub async fn with_local_checksum(
    ctx: &ExecutionContext,
    info: PathInfo,
) -> std::io::Result<PathInfo> {
    if info.namespace() != Namespace::LocalFilesystem || !info.is_file() || info.checksum().is_some() {
        return Ok(info);
    }
    let checksum = ctx.local.checksum(Path::new(info.path())).await?;
    Ok(info.with_checksum(Some(checksum)))
}

/// Whether `dst` already holds the content of `src` under the context's policy
///
/// Never fails: a checksum that cannot be computed means "not identical".
pub async fn identical(ctx: &ExecutionContext, src: &PathInfo, dst: &PathInfo) -> bool {
    let policy = ctx.options.identity;
    if !src.is_file() || !dst.is_file() || src.size() != dst.size() {
        return false;
    }
    if !policy.needs_checksum() {
        return src.same_as(dst, policy);
    }

    // Hash the local side only when the remote side can be compared against
    let (src, dst) = match (src.checksum().is_some(), dst.checksum().is_some()) {
        (true, true) => (src.clone(), dst.clone()),
        (true, false) => match with_local_checksum(ctx, dst.clone()).await {
            Ok(dst) => (src.clone(), dst),
            Err(e) => {
                warn!(path = %dst.path(), error = %e, "cannot checksum destination");
                return false;
            }
        },
        (false, true) => match with_local_checksum(ctx, src.clone()).await {
            Ok(src) => (src, dst.clone()),
            Err(e) => {
                warn!(path = %src.path(), error = %e, "cannot checksum source");
                return false;
            }
        },
        (false, false) => {
            debug!(path = %dst.path(), "no checksum on either side, not skipping");
            return false;
        }
    };

    src.same_as(&dst, policy)
}
