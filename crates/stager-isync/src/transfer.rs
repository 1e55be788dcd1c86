//! One transfer, start to finish
//!
//! Plans the transfer, counts the source, announces the total and streams
//! outcomes as progress lines. The first failed file ends the run: its
//! tally line is still written, then the workers are cancelled and the
//! error becomes the exit diagnostic.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stager_core::domain::{Locator, Progress};
use stager_sync::SyncEngine;

use crate::error::IsyncError;
use crate::output::ProgressWriter;

/// Transfer `src` to `dst`, writing progress lines to `out`
///
/// `cancel` is the process-wide abort signal; the workers run under a child
/// token so a failed file can stop them without looking like an abort.
///
/// # Errors
/// - [`IsyncError::InvalidArgument`] when the roots cannot be resolved or paired
/// - [`IsyncError::Transfer`] on the first failed file
/// - [`IsyncError::Aborted`] when `cancel` fires or stdout is gone
#[instrument(skip(engine, out, cancel), fields(src = %src, dst = %dst))]
pub async fn run_transfer<W: Write>(
    engine: &SyncEngine,
    task: &str,
    src: &Locator,
    dst: &Locator,
    out: W,
    cancel: CancellationToken,
) -> Result<Progress, IsyncError> {
    let plan = engine.plan(src, dst).await?;
    let workers = cancel.child_token();

    let total = engine.count(&plan, workers.clone()).await;
    if cancel.is_cancelled() {
        return Err(aborted());
    }
    info!(task, total, "source counted");

    let mut writer = ProgressWriter::new(out, total);
    writer.start().map_err(output_closed)?;
    if total == 0 {
        return Ok(writer.progress());
    }

    let mut running = engine.start(&plan, workers.clone());
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                workers.cancel();
                return Err(aborted());
            }
            next = running.outcomes.recv() => next,
        };
        let Some(outcome) = next else {
            break;
        };

        writer.record(&outcome).map_err(|e| {
            workers.cancel();
            output_closed(e)
        })?;

        if let Some(err) = outcome.error {
            warn!(task, file = %outcome.file, error = %err, "transfer failed");
            workers.cancel();
            return Err(IsyncError::Transfer(err.to_string()));
        }
        debug!(task, file = %outcome.file, "file done");
    }

    match running.scan.await {
        Ok(stats) => info!(task, ?stats, progress = ?writer.progress(), "finished"),
        Err(e) => warn!(task, error = %e, "scan task failed"),
    }
    if cancel.is_cancelled() {
        return Err(aborted());
    }
    Ok(writer.progress())
}

fn aborted() -> IsyncError {
    IsyncError::Aborted("aborted by task".into())
}

fn output_closed(err: std::io::Error) -> IsyncError {
    IsyncError::Aborted(format!("progress output closed: {err}"))
}
