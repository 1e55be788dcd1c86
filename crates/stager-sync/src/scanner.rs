//! Tree scanners
//!
//! A [`Scanner`] walks a source tree depth-first and streams the paths of
//! its regular files into a bounded channel. Two strategies exist, one per
//! namespace: [`LocalScanner`] and [`CatalogScanner`].
//!
//! ## Ordering
//!
//! When a materializer is given, `ensure(relative)` is awaited for every
//! directory (the root included) before any file of that directory is
//! sent. Workers therefore never see a file whose destination directory has
//! not been created yet.
//!
//! ## Failure handling
//!
//! A directory that cannot be listed is logged and its subtree skipped. A
//! failed `ensure` is logged and the scan goes on; files inside that
//! directory will fail individually when the worker tries to write them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stager_core::domain::locator::relative_path;
use stager_core::domain::{Namespace, PathInfo};
use stager_core::ports::ICatalog;

use crate::context::ExecutionContext;
use crate::filesystem::{EntryKind, LocalFileSystem};
use crate::materializer::DirectoryMaterializer;

/// Counters reported when a scan ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: u64,
    pub directories: u64,
    /// Symlinks and special files left out
    pub skipped: u64,
    /// Directories that could not be listed or materialized
    pub errors: u64,
    pub cancelled: bool,
}

/// A running scan
///
/// `files` closes when the walk is over; `handle` then yields the counters.
pub struct Scan {
    pub files: mpsc::Receiver<String>,
    pub handle: JoinHandle<ScanStats>,
}

/// Walks one namespace
pub trait Scanner: Send + Sync {
    /// Start walking `root` on a background task
    fn scan(
        &self,
        root: PathInfo,
        buffer: usize,
        materializer: Option<Arc<dyn DirectoryMaterializer>>,
        cancel: CancellationToken,
    ) -> Scan;
}

/// Scanner for the namespace of `root`
pub fn scanner_for(ctx: &ExecutionContext, namespace: Namespace) -> Box<dyn Scanner> {
    match namespace {
        Namespace::LocalFilesystem => Box::new(LocalScanner::new(ctx.local, ctx.options.follow_symlinks)),
        Namespace::RemoteCatalog => Box::new(CatalogScanner::new(Arc::clone(&ctx.catalog))),
    }
}

/// Number of regular files under `root`
///
/// Runs a scan without a materializer and drains it.
pub async fn count_files(ctx: &ExecutionContext, root: &PathInfo, cancel: CancellationToken) -> u64 {
    if root.is_file() {
        return 1;
    }
    let scanner = scanner_for(ctx, root.namespace());
    let mut scan = scanner.scan(root.clone(), ctx.options.buffer_size(), None, cancel);

    let mut total = 0u64;
    while scan.files.recv().await.is_some() {
        total += 1;
    }
    if let Err(e) = scan.handle.await {
        warn!(error = %e, "counting scan task failed");
    }
    debug!(root = %root.path(), total, "files counted");
    total
}

// ============================================================================
// Shared walk helpers
// ============================================================================

/// Sends one file path; false when the scan must stop
async fn emit(tx: &mpsc::Sender<String>, cancel: &CancellationToken, path: String) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(path) => sent.is_ok(),
    }
}

async fn materialize(
    materializer: Option<&Arc<dyn DirectoryMaterializer>>,
    relative: &str,
    stats: &mut ScanStats,
) {
    let Some(materializer) = materializer else {
        return;
    };
    if let Err(e) = materializer.ensure(relative).await {
        warn!(relative = %relative, error = %e, "cannot materialize directory");
        stats.errors += 1;
    }
}

fn single_file(root: PathInfo, buffer: usize) -> Scan {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let handle = tokio::spawn(async move {
        let mut stats = ScanStats::default();
        if tx.send(root.path().to_string()).await.is_ok() {
            stats.files = 1;
        }
        stats
    });
    Scan { files: rx, handle }
}

// ============================================================================
// LocalScanner
// ============================================================================

/// Walks a local directory tree
#[derive(Debug, Clone)]
pub struct LocalScanner {
    fs: LocalFileSystem,
    follow_symlinks: bool,
}

/// A directory waiting to be walked, with the canonical paths of itself and
/// its ancestors
struct LocalFrame {
    path: PathBuf,
    lineage: Arc<Vec<PathBuf>>,
}

impl LocalScanner {
    #[must_use]
    pub fn new(fs: LocalFileSystem, follow_symlinks: bool) -> Self {
        Self { fs, follow_symlinks }
    }

    #[instrument(skip_all, fields(root = %root.display()))]
    async fn walk(
        self,
        root: PathBuf,
        tx: mpsc::Sender<String>,
        materializer: Option<Arc<dyn DirectoryMaterializer>>,
        cancel: CancellationToken,
    ) -> ScanStats {
        let mut stats = ScanStats::default();
        let root_str = root.to_string_lossy().into_owned();
        let root_canonical = tokio::fs::canonicalize(&root).await.unwrap_or_else(|_| root.clone());
        let mut stack = vec![LocalFrame {
            path: root,
            lineage: Arc::new(vec![root_canonical]),
        }];

        while let Some(frame) = stack.pop() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            stats.directories += 1;

            let dir_str = frame.path.to_string_lossy().into_owned();
            materialize(materializer.as_ref(), relative_path(&dir_str, &root_str), &mut stats).await;

            let entries = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                listed = self.fs.list_dir(&frame.path) => listed,
            };
            let entries = match entries {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir_str, error = %e, "cannot read directory, skipping subtree");
                    stats.errors += 1;
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                let (kind, canonical) = match entry.kind {
                    EntryKind::Symlink if self.follow_symlinks => {
                        match self.follow(&entry.path).await {
                            Some(resolved) => resolved,
                            None => {
                                stats.skipped += 1;
                                continue;
                            }
                        }
                    }
                    EntryKind::Symlink => {
                        info!(path = %entry.path.display(), "skipping symbolic link");
                        stats.skipped += 1;
                        continue;
                    }
                    kind => (kind, None),
                };

                match kind {
                    EntryKind::File => {
                        let Some(path) = entry.path.to_str() else {
                            warn!(path = %entry.path.display(), "skipping non UTF-8 path");
                            stats.skipped += 1;
                            continue;
                        };
                        if !emit(&tx, &cancel, path.to_string()).await {
                            stats.cancelled = cancel.is_cancelled();
                            return stats;
                        }
                        stats.files += 1;
                    }
                    EntryKind::Directory => {
                        let canonical = match canonical {
                            Some(c) => c,
                            None => tokio::fs::canonicalize(&entry.path)
                                .await
                                .unwrap_or_else(|_| entry.path.clone()),
                        };
                        if frame.lineage.contains(&canonical) {
                            warn!(path = %entry.path.display(), "skipping directory cycle");
                            stats.skipped += 1;
                            continue;
                        }
                        let mut lineage = (*frame.lineage).clone();
                        lineage.push(canonical);
                        subdirs.push(LocalFrame {
                            path: entry.path,
                            lineage: Arc::new(lineage),
                        });
                    }
                    EntryKind::Other | EntryKind::Symlink => {
                        debug!(path = %entry.path.display(), "skipping special file");
                        stats.skipped += 1;
                    }
                }
            }

            // Reverse so the first subdirectory in name order is walked next
            stack.extend(subdirs.into_iter().rev());
        }

        debug!(?stats, "local scan finished");
        stats
    }

    /// Kind and canonical path of a link's referent
    async fn follow(&self, link: &Path) -> Option<(EntryKind, Option<PathBuf>)> {
        let canonical = match tokio::fs::canonicalize(link).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %link.display(), error = %e, "skipping dangling symbolic link");
                return None;
            }
        };
        let meta = self.fs.stat(&canonical).await.ok().flatten()?;
        if meta.is_dir() {
            Some((EntryKind::Directory, Some(canonical)))
        } else if meta.is_file() {
            Some((EntryKind::File, None))
        } else {
            Some((EntryKind::Other, None))
        }
    }
}

impl Scanner for LocalScanner {
    fn scan(
        &self,
        root: PathInfo,
        buffer: usize,
        materializer: Option<Arc<dyn DirectoryMaterializer>>,
        cancel: CancellationToken,
    ) -> Scan {
        if root.is_file() {
            return single_file(root, buffer);
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let walker = self.clone();
        let handle = tokio::spawn(walker.walk(PathBuf::from(root.path()), tx, materializer, cancel));
        Scan { files: rx, handle }
    }
}

// ============================================================================
// CatalogScanner
// ============================================================================

/// Walks a catalog collection tree
pub struct CatalogScanner {
    catalog: Arc<dyn ICatalog>,
}

impl CatalogScanner {
    pub fn new(catalog: Arc<dyn ICatalog>) -> Self {
        Self { catalog }
    }
}

#[instrument(skip_all, fields(root = %root))]
async fn walk_catalog(
    catalog: Arc<dyn ICatalog>,
    root: String,
    tx: mpsc::Sender<String>,
    materializer: Option<Arc<dyn DirectoryMaterializer>>,
    cancel: CancellationToken,
) -> ScanStats {
    let mut stats = ScanStats::default();
    let mut stack = vec![root.clone()];

    while let Some(collection) = stack.pop() {
        if cancel.is_cancelled() {
            stats.cancelled = true;
            break;
        }
        stats.directories += 1;
        materialize(materializer.as_ref(), relative_path(&collection, &root), &mut stats).await;

        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stats.cancelled = true;
                break;
            }
            listed = catalog.list(&collection) => listed,
        };
        let entries = match listed {
            Ok(entries) => entries,
            Err(e) => {
                warn!(collection = %collection, error = %e, "cannot list collection, skipping subtree");
                stats.errors += 1;
                continue;
            }
        };

        let mut subcollections = Vec::new();
        for entry in entries {
            if entry.is_collection() {
                subcollections.push(entry.path);
                continue;
            }
            if !emit(&tx, &cancel, entry.path).await {
                stats.cancelled = cancel.is_cancelled();
                return stats;
            }
            stats.files += 1;
        }
        stack.extend(subcollections.into_iter().rev());
    }

    debug!(?stats, "catalog scan finished");
    stats
}

impl Scanner for CatalogScanner {
    fn scan(
        &self,
        root: PathInfo,
        buffer: usize,
        materializer: Option<Arc<dyn DirectoryMaterializer>>,
        cancel: CancellationToken,
    ) -> Scan {
        if root.is_file() {
            return single_file(root, buffer);
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(walk_catalog(
            Arc::clone(&self.catalog),
            root.path().to_string(),
            tx,
            materializer,
            cancel,
        ));
        Scan { files: rx, handle }
    }
}
