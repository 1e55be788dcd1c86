//! Staging engine entry points
//!
//! The [`SyncEngine`] wires the resolver, scanner, materializer and worker
//! pool together for one source/destination pair.
//!
//! ## Flow
//!
//! 1. **Plan**: resolve the source (must exist) and the destination (may be
//!    absent)
//! 2. **Count**: pre-scan the source without materializing anything
//! 3. **Start**: scan again with the destination materializer and feed the
//!    worker pool; callers consume the outcome channel
//!
//! Callers that own progress and timers (the job orchestrator, the
//! transfer subprocess) drive steps 2 and 3 themselves. [`SyncEngine::run`]
//! chains everything for callers that only want the final tally.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use stager_core::domain::{Locator, NodeKind, PathInfo, Progress, SyncOutcome};

use crate::context::ExecutionContext;
use crate::materializer::materializer_for;
use crate::pool::spawn_workers;
use crate::resolver::{resolve, ResolveError};
use crate::scanner::{count_files, scanner_for, ScanStats};
use crate::SyncError;

/// Resolved roots of a transfer
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub source: PathInfo,
    /// `NodeKind::Unknown` when the destination does not exist yet
    pub destination: PathInfo,
}

/// A started transfer
pub struct RunningTransfer {
    pub outcomes: mpsc::Receiver<SyncOutcome>,
    pub scan: JoinHandle<ScanStats>,
}

/// Drives one source/destination pair
#[derive(Debug, Clone)]
pub struct SyncEngine {
    ctx: ExecutionContext,
}

impl SyncEngine {
    #[must_use]
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Resolve both roots
    ///
    /// # Errors
    /// Fails if the source cannot be resolved, if the destination cannot be
    /// stat'ed for a reason other than absence, or if a directory would be
    /// copied onto a regular file.
    #[instrument(skip(self), fields(src = %src, dst = %dst))]
    pub async fn plan(&self, src: &Locator, dst: &Locator) -> Result<TransferPlan, SyncError> {
        let source = resolve(&self.ctx, src).await?;
        if source.node_kind() == NodeKind::Unknown {
            return Err(SyncError::InvalidDestination {
                path: src.path().to_string(),
                reason: "source is neither a file nor a directory".into(),
            });
        }

        let destination = match resolve(&self.ctx, dst).await {
            Ok(info) => info,
            Err(ResolveError::NotFound(_)) => PathInfo::unknown(dst.namespace(), dst.path()),
            Err(e) => return Err(e.into()),
        };
        if source.is_dir() && destination.is_file() {
            return Err(SyncError::InvalidDestination {
                path: dst.path().to_string(),
                reason: "cannot copy a directory onto a file".into(),
            });
        }

        info!(
            source_kind = ?source.node_kind(),
            destination_kind = ?destination.node_kind(),
            "transfer planned"
        );
        Ok(TransferPlan {
            source,
            destination,
        })
    }

    /// Number of files the transfer will handle
    pub async fn count(&self, plan: &TransferPlan, cancel: CancellationToken) -> u64 {
        count_files(&self.ctx, &plan.source, cancel).await
    }

    /// Start scanning and syncing; consume `outcomes` until it closes
    pub fn start(&self, plan: &TransferPlan, cancel: CancellationToken) -> RunningTransfer {
        let materializer = materializer_for(&self.ctx, &plan.destination);
        let scanner = scanner_for(&self.ctx, plan.source.namespace());
        let scan = scanner.scan(
            plan.source.clone(),
            self.ctx.options.buffer_size(),
            Some(materializer),
            cancel.clone(),
        );

        let outcomes = spawn_workers(
            self.ctx.options.workers,
            self.ctx.clone(),
            plan.source.clone(),
            plan.destination.clone(),
            scan.files,
            cancel,
        );

        RunningTransfer {
            outcomes,
            scan: scan.handle,
        }
    }

    /// Plan, count and transfer everything, returning the final tally
    ///
    /// Failed files are counted, not fatal.
    pub async fn run(
        &self,
        src: &Locator,
        dst: &Locator,
        cancel: CancellationToken,
    ) -> Result<Progress, SyncError> {
        let plan = self.plan(src, dst).await?;
        let mut progress = Progress::with_total(self.count(&plan, cancel.clone()).await);
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if progress.total == 0 {
            return Ok(progress);
        }

        let mut running = self.start(&plan, cancel.clone());
        while let Some(outcome) = running.outcomes.recv().await {
            progress.record(&outcome);
        }
        match running.scan.await {
            Ok(stats) => info!(?stats, ?progress, "transfer finished"),
            Err(e) => warn!(error = %e, "scan task failed"),
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(progress)
    }
}
