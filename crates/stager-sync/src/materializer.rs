//! Destination directory materialization
//!
//! The scanner calls [`DirectoryMaterializer::ensure`] for every directory it
//! enters, before handing out any file inside it, so workers always write
//! into a destination directory that exists.
//!
//! Implementations must be idempotent and create missing intermediate
//! segments.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use stager_core::domain::locator::join_path;
use stager_core::domain::{Namespace, PathInfo};
use stager_core::ports::ICatalog;

use crate::context::ExecutionContext;
use crate::filesystem::LocalFileSystem;
use crate::SyncError;

/// Creates the destination counterpart of a source directory
#[async_trait]
pub trait DirectoryMaterializer: Send + Sync {
    /// Make sure `base/relative` exists; `relative` is empty for the root
    async fn ensure(&self, relative: &str) -> Result<(), SyncError>;
}

/// Creates local directories under a base path
#[derive(Debug)]
pub struct LocalDirMaker {
    base: PathBuf,
    fs: LocalFileSystem,
}

impl LocalDirMaker {
    pub fn new(base: impl Into<PathBuf>, fs: LocalFileSystem) -> Self {
        Self {
            base: base.into(),
            fs,
        }
    }
}

#[async_trait]
impl DirectoryMaterializer for LocalDirMaker {
    #[instrument(skip(self), fields(base = %self.base.display()))]
    async fn ensure(&self, relative: &str) -> Result<(), SyncError> {
        let target = if relative.is_empty() {
            self.base.clone()
        } else {
            self.base.join(relative)
        };
        self.fs
            .create_dir_all(&target)
            .await
            .map_err(|e| SyncError::DirectoryCreate {
                path: target.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(path = %target.display(), "directory ensured");
        Ok(())
    }
}

/// Creates catalog collections under a base collection
pub struct CollectionMaker {
    base: String,
    catalog: Arc<dyn ICatalog>,
}

impl CollectionMaker {
    pub fn new(base: impl Into<String>, catalog: Arc<dyn ICatalog>) -> Self {
        Self {
            base: base.into(),
            catalog,
        }
    }
}

#[async_trait]
impl DirectoryMaterializer for CollectionMaker {
    #[instrument(skip(self), fields(base = %self.base))]
    async fn ensure(&self, relative: &str) -> Result<(), SyncError> {
        let target = join_path(&self.base, relative);
        self.catalog
            .make_collection(&target)
            .await
            .map_err(|e| SyncError::DirectoryCreate {
                path: target.clone(),
                reason: e.to_string(),
            })?;

        // Workers stat every file they write into this collection
        if let Err(e) = self.catalog.refresh_listing(&target).await {
            warn!(collection = %target, error = %e, "cannot prime listing cache");
        }
        debug!(collection = %target, "collection ensured");
        Ok(())
    }
}

/// Materializer for the destination's namespace, rooted at the destination
pub fn materializer_for(ctx: &ExecutionContext, dst: &PathInfo) -> Arc<dyn DirectoryMaterializer> {
    match dst.namespace() {
        Namespace::LocalFilesystem => Arc::new(LocalDirMaker::new(dst.path(), ctx.local)),
        Namespace::RemoteCatalog => {
            Arc::new(CollectionMaker::new(dst.path(), Arc::clone(&ctx.catalog)))
        }
    }
}
