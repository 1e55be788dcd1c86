//! Job orchestration
//!
//! Runs one attempt of a staging job over a [`TransferSession`]:
//!
//! ```text
//! Counting ──► Streaming ──► Succeeded
//!    │             ├──────► Failed
//!    │             ├──────► TimedOut (deadline | no progress)
//!    └─────────────┴──────► Cancelled
//! ```
//!
//! ## Design Notes
//!
//! - The progress aggregate lives on this task only; sessions hand over
//!   immutable events.
//! - The overall deadline spans the whole attempt, counting included. The
//!   no-progress timer starts with streaming and is re-armed by every
//!   outcome, failed or not.
//! - Progress is persisted after counting, whenever the integer percentage
//!   advances, and once more with the terminal status.
//! - Store write failures of intermediate snapshots are logged, not fatal.
//! - With a credential key configured, the payload password is decrypted
//!   here, once, so launchers only ever see the plain secret.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use stager_core::credential::decrypt_secret;
use stager_core::domain::{
    FailurePolicy, JobError, JobId, JobPayload, JobResult, JobStatus, Progress, TransferError,
};
use stager_core::ports::IJobStore;

use crate::session::{JobContext, TransferEvent, TransferLauncher, TransferSession};

/// Placeholder length of a disabled timer; its select branch is never polled
const DISABLED_TIMER: Duration = Duration::from_secs(86_400 * 365);

/// Where an attempt is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Counting,
    Streaming,
}

/// How a job attempt ended
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub result: JobResult,
    pub error: Option<JobError>,
    /// Attempt number assigned by the store, 0 if none was started
    pub attempt: u32,
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Drives staging jobs to a terminal status
pub struct Orchestrator {
    store: Arc<dyn IJobStore>,
    launcher: Arc<dyn TransferLauncher>,
    policy: FailurePolicy,
    credential_key: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn IJobStore>, launcher: Arc<dyn TransferLauncher>) -> Self {
        Self {
            store,
            launcher,
            policy: FailurePolicy::default(),
            credential_key: None,
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Treat payload passwords as RSA ciphertexts opened with `key`
    #[must_use]
    pub fn with_credential_key(mut self, key: Option<PathBuf>) -> Self {
        self.credential_key = key;
        self
    }

    /// Run one attempt of job `id`
    ///
    /// The job must already exist in the store. The terminal status and the
    /// final progress snapshot are always persisted, whatever the outcome.
    #[instrument(skip(self, payload, cancel), fields(job_id = %id))]
    pub async fn run(&self, id: &JobId, payload: &JobPayload, cancel: CancellationToken) -> JobOutcome {
        if let Err(e) = payload.validate() {
            return self.conclude(id, 0, Progress::default(), Err(e)).await;
        }
        let payload = match self.open_password(payload) {
            Ok(payload) => payload,
            Err(e) => return self.conclude(id, 0, Progress::default(), Err(e)).await,
        };
        let payload = &payload;

        let attempt = match self.store.begin_attempt(id).await {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(error = %e, "cannot start attempt");
                return JobOutcome {
                    status: JobStatus::Failed,
                    result: JobResult::default(),
                    error: Some(JobError::Store(e.to_string())),
                    attempt: 0,
                };
            }
        };
        info!(attempt, src = %payload.src_url, dst = %payload.dst_url, "attempt started");

        let job = JobContext {
            id: id.clone(),
            payload: payload.clone(),
        };
        let mut attempt_state = Attempt::new(id, payload, Arc::clone(&self.store), self.policy);
        let result = attempt_state.run(self.launcher.as_ref(), &job, cancel).await;
        self.conclude(id, attempt, attempt_state.progress, result).await
    }

    /// Payload with its password decrypted, if a credential key is set
    fn open_password(&self, payload: &JobPayload) -> Result<JobPayload, JobError> {
        let mut payload = payload.clone();
        if let (Some(key), Some(encrypted)) = (&self.credential_key, &payload.dr_pass) {
            let plain = decrypt_secret(encrypted, key).map_err(|e| {
                JobError::InvalidPayload(format!("fail to decrypt credential: {e:#}"))
            })?;
            debug!(key = %key.display(), "payload credential decrypted");
            payload.dr_pass = Some(plain);
        }
        Ok(payload)
    }

    async fn conclude(
        &self,
        id: &JobId,
        attempt: u32,
        progress: Progress,
        result: Result<(), JobError>,
    ) -> JobOutcome {
        let (status, error) = match result {
            Ok(()) => (JobStatus::Succeeded, None),
            Err(e) => (e.status(), Some(e)),
        };
        let reason = error.as_ref().map(ToString::to_string);

        if let Err(e) = self
            .store
            .finish(id, status, &progress, reason.as_deref())
            .await
        {
            error!(error = %e, "cannot persist job result");
        }

        match &error {
            None => info!(?progress, "job succeeded"),
            Some(e) => warn!(status = %status, error = %e, ?progress, "job did not succeed"),
        }
        JobOutcome {
            status,
            result: JobResult { progress },
            error,
            attempt,
        }
    }
}

// ============================================================================
// One attempt
// ============================================================================

struct Attempt<'a> {
    id: &'a JobId,
    store: Arc<dyn IJobStore>,
    policy: FailurePolicy,
    deadline: Option<Duration>,
    no_progress: Option<Duration>,
    phase: Phase,
    progress: Progress,
    persisted_percent: u64,
}

impl<'a> Attempt<'a> {
    fn new(id: &'a JobId, payload: &JobPayload, store: Arc<dyn IJobStore>, policy: FailurePolicy) -> Self {
        Self {
            id,
            store,
            policy,
            deadline: payload.overall_timeout(),
            no_progress: payload.no_progress_timeout(),
            phase: Phase::Counting,
            progress: Progress::default(),
            persisted_percent: 0,
        }
    }

    async fn run(
        &mut self,
        launcher: &dyn TransferLauncher,
        job: &JobContext,
        cancel: CancellationToken,
    ) -> Result<(), JobError> {
        let deadline_timer = sleep(self.deadline.unwrap_or(DISABLED_TIMER));
        tokio::pin!(deadline_timer);

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            launched = launcher.launch(job) => launched?,
        };

        let result = self
            .drive(session.as_mut(), deadline_timer.as_mut(), &cancel)
            .await;
        if let Err(e) = &result {
            debug!(phase = ?self.phase, error = %e, "attempt ended early");
        }
        result
    }

    async fn drive(
        &mut self,
        session: &mut dyn TransferSession,
        mut deadline_timer: Pin<&mut Sleep>,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        let deadline_armed = self.deadline.is_some();
        let stall_armed = self.no_progress.is_some();

        // Counting
        let total = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(abandon(session, JobError::Cancelled).await),
                _ = &mut deadline_timer, if deadline_armed => {
                    return Err(abandon(session, self.deadline_error()).await);
                }
                event = session.next_event() => event,
            };
            match event {
                Some(TransferEvent::Counted(total)) => break total,
                Some(TransferEvent::Processed(outcome)) => {
                    warn!(file = %outcome.file, "outcome before count, ignored");
                }
                None => {
                    session.wait().await?;
                    return Err(JobError::Session("transfer ended before counting finished".into()));
                }
            }
        };

        self.progress = Progress::with_total(total);
        self.persist().await;
        info!(total, "source counted");
        if total == 0 {
            return session.wait().await;
        }

        // Streaming
        self.phase = Phase::Streaming;
        let stall = self.no_progress.unwrap_or(DISABLED_TIMER);
        let stall_timer = sleep(stall);
        tokio::pin!(stall_timer);
        let mut first_error: Option<TransferError> = None;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(abandon(session, JobError::Cancelled).await),
                _ = &mut deadline_timer, if deadline_armed => {
                    return Err(abandon(session, self.deadline_error()).await);
                }
                _ = &mut stall_timer, if stall_armed => {
                    let err = JobError::NoProgressTimeout(stall);
                    return Err(abandon(session, err).await);
                }
                event = session.next_event() => event,
            };

            let outcome = match event {
                Some(TransferEvent::Processed(outcome)) => outcome,
                Some(TransferEvent::Counted(total)) => {
                    warn!(total, "second count ignored");
                    continue;
                }
                None => break,
            };

            stall_timer.as_mut().reset(Instant::now() + stall);
            self.progress.record(&outcome);
            if self.progress.percent() > self.persisted_percent {
                self.persist().await;
            }

            if let Some(err) = outcome.error {
                warn!(file = %outcome.file, error = %err, "file failed");
                match self.policy {
                    FailurePolicy::FailFast => {
                        let reason = session.terminate().await.unwrap_or_else(|| err.to_string());
                        return Err(JobError::Transfer(reason));
                    }
                    FailurePolicy::DrainAll => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(abandon(session, JobError::Cancelled).await),
            _ = &mut deadline_timer, if deadline_armed => {
                return Err(abandon(session, self.deadline_error()).await);
            }
            waited = session.wait() => waited?,
        }

        match first_error {
            Some(err) => Err(JobError::Transfer(format!(
                "{} of {} files failed, first: {err}",
                self.progress.failed, self.progress.total
            ))),
            None => Ok(()),
        }
    }

    fn deadline_error(&self) -> JobError {
        JobError::DeadlineExceeded(self.deadline.unwrap_or(DISABLED_TIMER))
    }

    async fn persist(&mut self) {
        match self.store.save_progress(self.id, &self.progress).await {
            Ok(()) => {
                self.persisted_percent = self.progress.percent();
                debug!(progress = ?self.progress, percent = self.persisted_percent, "progress saved");
            }
            Err(e) => warn!(error = %e, "cannot save progress"),
        }
    }
}

/// Stop the session and hand back `err`
async fn abandon(session: &mut dyn TransferSession, err: JobError) -> JobError {
    if let Some(diagnostic) = session.terminate().await {
        debug!(diagnostic = %diagnostic, "session terminated");
    }
    err
}
