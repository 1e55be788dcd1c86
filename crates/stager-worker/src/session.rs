//! Transfer sessions
//!
//! A session is one running transfer as seen by the orchestrator: a stream
//! of events, a way to wait for its natural end and a way to stop it early.
//! Whether the transfer runs in this process or in a child running as the
//! job's local account is hidden behind [`TransferLauncher`].

use async_trait::async_trait;

use stager_core::domain::{JobError, JobId, JobPayload, SyncOutcome};

/// What a running transfer reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Pre-count finished; sent exactly once, before any outcome
    Counted(u64),
    /// One regular file concluded
    Processed(SyncOutcome),
}

/// One running transfer
#[async_trait]
pub trait TransferSession: Send {
    /// Next event, `None` once the transfer produces no more
    async fn next_event(&mut self) -> Option<TransferEvent>;

    /// Wait for the transfer to end on its own
    ///
    /// # Errors
    /// Returns the session's own failure (non-zero exit, resolution error,
    /// lost task) as a [`JobError`].
    async fn wait(&mut self) -> Result<(), JobError>;

    /// Stop the transfer and wait until it is gone
    ///
    /// Returns the session's last diagnostic, if it left one.
    async fn terminate(&mut self) -> Option<String>;
}

/// The job a session is launched for
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub payload: JobPayload,
}

/// Starts transfer sessions
#[async_trait]
pub trait TransferLauncher: Send + Sync {
    /// # Errors
    /// Fails when the transfer cannot be started at all.
    async fn launch(&self, job: &JobContext) -> Result<Box<dyn TransferSession>, JobError>;
}
