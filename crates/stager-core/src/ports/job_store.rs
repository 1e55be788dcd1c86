//! Job store port (driven/secondary port)
//!
//! Durable job state shared with the external queue layer: the (redacted)
//! payload, the attempt counter, the latest progress snapshot and the
//! terminal status with its reason.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at this boundary are adapter-specific
//!   and the orchestrator only needs to report them.
//! - Progress is written by exactly one caller per job (the orchestrator).

use chrono::{DateTime, Utc};

use crate::domain::{JobId, JobPayload, JobResult, JobStatus, Progress};

/// Persisted view of one job
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    /// Payload as submitted, without the repository password
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Number of attempts started so far
    pub attempt: u32,
    pub progress: Progress,
    /// Failure, timeout or cancellation reason of the last attempt
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// The result document exposed to the queue layer
    #[must_use]
    pub fn result(&self) -> JobResult {
        JobResult {
            progress: self.progress,
        }
    }
}

/// Port for durable job state
#[async_trait::async_trait]
pub trait IJobStore: Send + Sync {
    /// Record a new job; a second call for the same id is a no-op
    async fn create_job(&self, id: &JobId, payload: &JobPayload) -> anyhow::Result<()>;

    /// Start a new attempt: bump the attempt counter, zero the progress and
    /// mark the job running. Returns the new attempt number.
    async fn begin_attempt(&self, id: &JobId) -> anyhow::Result<u32>;

    /// Store an intermediate progress snapshot
    async fn save_progress(&self, id: &JobId, progress: &Progress) -> anyhow::Result<()>;

    /// Store the terminal status of the current attempt with its final snapshot
    async fn finish(
        &self,
        id: &JobId,
        status: JobStatus,
        progress: &Progress,
        reason: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<JobRecord>>;
}
