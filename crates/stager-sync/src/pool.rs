//! Sync worker pool
//!
//! A fixed number of tokio tasks share the scanner's file channel. Each one
//! maps a source file onto its destination, skips it when the destination
//! already holds the same content, and otherwise downloads or uploads it.
//! Every handled file yields exactly one [`SyncOutcome`].
//!
//! ## Design Notes
//!
//! - The outcome channel closes when the last worker drops its sender; that
//!   closure is the only end-of-run signal.
//! - Workers check the cancellation token between files and before sending
//!   an outcome. A transfer already in flight runs to completion, but its
//!   outcome is dropped once cancellation has been observed.
//! - Same-namespace pairs are rejected before any I/O.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use stager_core::domain::locator::{join_path, parent_path, relative_path};
use stager_core::domain::{Namespace, PathInfo, SyncOutcome, TransferError};

use crate::context::ExecutionContext;
use crate::resolver::{identical, resolve_path, ResolveError};

/// Start `n` workers draining `files`
///
/// Returns the outcome channel; it closes once every worker has exited.
pub fn spawn_workers(
    n: usize,
    ctx: ExecutionContext,
    src: PathInfo,
    dst: PathInfo,
    files: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> mpsc::Receiver<SyncOutcome> {
    let n = n.max(1);
    let (tx, rx) = mpsc::channel(n);
    let files = Arc::new(Mutex::new(files));
    let src = Arc::new(src);
    let dst = Arc::new(dst);

    for id in 0..n {
        tokio::spawn(worker(
            id,
            ctx.clone(),
            Arc::clone(&src),
            Arc::clone(&dst),
            Arc::clone(&files),
            tx.clone(),
            cancel.clone(),
        ));
    }

    rx
}

#[instrument(skip_all, fields(worker = id))]
async fn worker(
    id: usize,
    ctx: ExecutionContext,
    src: Arc<PathInfo>,
    dst: Arc<PathInfo>,
    files: Arc<Mutex<mpsc::Receiver<String>>>,
    outcomes: mpsc::Sender<SyncOutcome>,
    cancel: CancellationToken,
) {
    let mut handled = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = async { files.lock().await.recv().await } => next,
        };
        let Some(file) = next else {
            break;
        };

        let outcome = sync_file(&ctx, &src, &dst, &file).await;
        if cancel.is_cancelled() {
            break;
        }
        if let Some(err) = &outcome.error {
            warn!(file = %file, error = %err, "file failed");
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = outcomes.send(outcome) => sent.is_ok(),
        };
        if !sent {
            break;
        }
        handled += 1;
    }
    debug!(handled, "worker exiting");
}

/// Destination path for `file` found under the source root `src`
///
/// A single-file source copied onto anything but a directory targets the
/// destination path itself.
#[must_use]
pub fn map_destination(src: &PathInfo, dst: &PathInfo, file: &str) -> String {
    if src.is_file() && !dst.is_dir() {
        return dst.path().to_string();
    }
    let base = if src.is_file() {
        parent_path(src.path())
    } else {
        src.path()
    };
    join_path(dst.path(), relative_path(file, base))
}

/// Handle one file end to end
pub async fn sync_file(
    ctx: &ExecutionContext,
    src_root: &PathInfo,
    dst_root: &PathInfo,
    file: &str,
) -> SyncOutcome {
    let (from, to) = (src_root.namespace(), dst_root.namespace());
    if from == to {
        return SyncOutcome::failed(file, TransferError::Unsupported { from, to });
    }

    let target = map_destination(src_root, dst_root, file);

    let src = match resolve_path(ctx, from, file).await {
        Ok(info) => info,
        Err(e) => {
            return SyncOutcome::failed(
                file,
                TransferError::Resolution {
                    path: file.to_string(),
                    reason: e.to_string(),
                },
            )
        }
    };
    let dst = match resolve_path(ctx, to, &target).await {
        Ok(info) => Some(info),
        Err(ResolveError::NotFound(_)) => None,
        Err(e) => {
            return SyncOutcome::failed(
                file,
                TransferError::Resolution {
                    path: target,
                    reason: e.to_string(),
                },
            )
        }
    };

    if let Some(dst) = &dst {
        if identical(ctx, &src, dst).await {
            debug!(file = %file, target = %target, "destination identical, skipping");
            return SyncOutcome::ok(file);
        }
    }

    let result = match (from, to) {
        (Namespace::RemoteCatalog, Namespace::LocalFilesystem) => download(ctx, file, &target).await,
        (Namespace::LocalFilesystem, Namespace::RemoteCatalog) => upload(ctx, file, &target).await,
        (from, to) => Err(TransferError::Unsupported { from, to }),
    };

    match result {
        Ok(()) => SyncOutcome::ok(file),
        Err(e) => SyncOutcome::failed(file, e),
    }
}

async fn download(ctx: &ExecutionContext, file: &str, target: &str) -> Result<(), TransferError> {
    let bytes = ctx
        .catalog
        .download(file, Path::new(target))
        .await
        .map_err(|e| TransferError::Download {
            path: file.to_string(),
            reason: e.to_string(),
        })?;
    debug!(file = %file, target = %target, bytes, "downloaded");
    Ok(())
}

async fn upload(ctx: &ExecutionContext, file: &str, target: &str) -> Result<(), TransferError> {
    let bytes = ctx
        .catalog
        .upload(Path::new(file), target)
        .await
        .map_err(|e| TransferError::Upload {
            path: file.to_string(),
            reason: e.to_string(),
        })?;
    debug!(file = %file, target = %target, bytes, "uploaded");

    if !ctx.options.verify_checksum {
        return Ok(());
    }

    let remote = ctx
        .catalog
        .compute_checksum(target)
        .await
        .map_err(|e| TransferError::Upload {
            path: file.to_string(),
            reason: format!("checksum verification: {e}"),
        })?;
    let local = ctx
        .local
        .checksum(Path::new(file))
        .await
        .map_err(|e| TransferError::Io {
            path: file.to_string(),
            reason: e.to_string(),
        })?;

    if remote != local {
        return Err(TransferError::ChecksumMismatch {
            path: file.to_string(),
            local: local.to_string(),
            remote: remote.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stager_catalog::MemoryCatalog;
    use tempfile::TempDir;

    use super::*;
    use crate::context::SyncOptions;

    fn local_dir(p: &str) -> PathInfo {
        PathInfo::directory(Namespace::LocalFilesystem, p)
    }

    #[test]
    fn test_map_destination_directory_tree() {
        let src = local_dir("/data/in");
        let dst = PathInfo::directory(Namespace::RemoteCatalog, "/z/out");
        assert_eq!(map_destination(&src, &dst, "/data/in/a/b.txt"), "/z/out/a/b.txt");
    }

    #[test]
    fn test_map_destination_single_file() {
        let src = PathInfo::file(Namespace::LocalFilesystem, "/data/in/a.txt", 1);
        let into_dir = PathInfo::directory(Namespace::RemoteCatalog, "/z/out");
        assert_eq!(map_destination(&src, &into_dir, "/data/in/a.txt"), "/z/out/a.txt");

        let absent = PathInfo::unknown(Namespace::RemoteCatalog, "/z/out/renamed.txt");
        assert_eq!(
            map_destination(&src, &absent, "/data/in/a.txt"),
            "/z/out/renamed.txt"
        );
    }

    #[tokio::test]
    async fn test_sync_file_rejects_same_namespace() {
        let ctx = ExecutionContext::new(Arc::new(MemoryCatalog::new()), SyncOptions::default());
        let outcome = sync_file(&ctx, &local_dir("/a"), &local_dir("/b"), "/a/f").await;
        assert!(matches!(
            outcome.error,
            Some(TransferError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_detects_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"payload").unwrap();

        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_collection("/z/out");
        catalog.corrupt_checksums(true);
        let ctx = ExecutionContext::new(catalog, SyncOptions::default());

        let src = local_dir(dir.path().to_str().unwrap());
        let dst = PathInfo::directory(Namespace::RemoteCatalog, "/z/out");
        let outcome = sync_file(&ctx, &src, &dst, file.to_str().unwrap()).await;
        assert!(matches!(
            outcome.error,
            Some(TransferError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_object("/z/in/f.txt", b"x", true);
        catalog.fail_path("/z/in/f.txt");
        let ctx = ExecutionContext::new(catalog, SyncOptions::default());

        let src = PathInfo::directory(Namespace::RemoteCatalog, "/z/in");
        let dst = local_dir(dir.path().to_str().unwrap());
        let outcome = sync_file(&ctx, &src, &dst, "/z/in/f.txt").await;
        assert!(matches!(outcome.error, Some(TransferError::Download { .. })));
        assert_eq!(outcome.file, "/z/in/f.txt");
    }

    #[tokio::test]
    async fn test_missing_source_is_resolution_error() {
        let dir = TempDir::new().unwrap();
        let ctx = ExecutionContext::new(Arc::new(MemoryCatalog::new()), SyncOptions::default());
        let src = local_dir(dir.path().to_str().unwrap());
        let dst = PathInfo::directory(Namespace::RemoteCatalog, "/z/out");
        let missing = dir.path().join("gone.txt");

        let outcome = sync_file(&ctx, &src, &dst, missing.to_str().unwrap()).await;
        assert!(matches!(outcome.error, Some(TransferError::Resolution { .. })));
    }
}
