//! Orchestrator state machine against scripted sessions
//!
//! Time is paused: timers fire as soon as every task is idle, so the
//! deadline and no-progress limits are exercised without real waiting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use stager_core::credential::encrypt_secret;
use stager_core::domain::{
    FailurePolicy, JobError, JobId, JobPayload, JobStatus, Progress, SyncOutcome, TimeoutKind,
    TransferError,
};
use stager_core::ports::{IJobStore, JobRecord};
use stager_worker::{JobContext, Orchestrator, TransferEvent, TransferLauncher, TransferSession};

// ============================================================================
// Fakes
// ============================================================================

struct ScriptedSession {
    events: mpsc::Receiver<TransferEvent>,
    exit: Result<(), JobError>,
    diagnostic: Option<String>,
    terminated: Arc<AtomicBool>,
}

#[async_trait]
impl TransferSession for ScriptedSession {
    async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    async fn wait(&mut self) -> Result<(), JobError> {
        self.exit.clone()
    }

    async fn terminate(&mut self) -> Option<String> {
        self.terminated.store(true, Ordering::SeqCst);
        self.events.close();
        self.diagnostic.clone()
    }
}

struct ScriptedLauncher {
    session: Mutex<Option<ScriptedSession>>,
    launched_with: Mutex<Option<JobPayload>>,
}

#[async_trait]
impl TransferLauncher for ScriptedLauncher {
    async fn launch(&self, job: &JobContext) -> Result<Box<dyn TransferSession>, JobError> {
        *self.launched_with.lock().unwrap() = Some(job.payload.clone());
        match self.session.lock().unwrap().take() {
            Some(session) => Ok(Box::new(session)),
            None => Err(JobError::Session("launched twice".into())),
        }
    }
}

/// Handles the test keeps on the scripted session
struct Script {
    events: mpsc::Sender<TransferEvent>,
    terminated: Arc<AtomicBool>,
    launcher: Arc<ScriptedLauncher>,
}

fn script(exit: Result<(), JobError>, diagnostic: Option<&str>) -> Script {
    let (tx, rx) = mpsc::channel(1024);
    let terminated = Arc::new(AtomicBool::new(false));
    let session = ScriptedSession {
        events: rx,
        exit,
        diagnostic: diagnostic.map(String::from),
        terminated: Arc::clone(&terminated),
    };
    Script {
        events: tx,
        terminated,
        launcher: Arc::new(ScriptedLauncher {
            session: Mutex::new(Some(session)),
            launched_with: Mutex::new(None),
        }),
    }
}

#[derive(Default)]
struct RecordingStore {
    saves: Mutex<Vec<Progress>>,
    finished: Mutex<Option<(JobStatus, Progress, Option<String>)>>,
}

#[async_trait]
impl IJobStore for RecordingStore {
    async fn create_job(&self, _id: &JobId, _payload: &JobPayload) -> anyhow::Result<()> {
        Ok(())
    }

    async fn begin_attempt(&self, _id: &JobId) -> anyhow::Result<u32> {
        Ok(1)
    }

    async fn save_progress(&self, _id: &JobId, progress: &Progress) -> anyhow::Result<()> {
        self.saves.lock().unwrap().push(*progress);
        Ok(())
    }

    async fn finish(
        &self,
        _id: &JobId,
        status: JobStatus,
        progress: &Progress,
        reason: Option<&str>,
    ) -> anyhow::Result<()> {
        *self.finished.lock().unwrap() = Some((status, *progress, reason.map(String::from)));
        Ok(())
    }

    async fn get_job(&self, _id: &JobId) -> anyhow::Result<Option<JobRecord>> {
        Ok(None)
    }
}

fn payload(timeout: i64, timeout_noprogress: i64) -> JobPayload {
    serde_json::from_value(serde_json::json!({
        "title": "scripted",
        "drUser": "researcher",
        "srcURL": "irods:/zone/home/src",
        "dstURL": "/project/dst",
        "stagerUser": "stager",
        "timeout": timeout,
        "timeout_noprogress": timeout_noprogress,
    }))
    .unwrap()
}

fn ok(n: usize) -> TransferEvent {
    TransferEvent::Processed(SyncOutcome::ok(format!("/project/dst/f{n}")))
}

fn failed(n: usize) -> TransferEvent {
    TransferEvent::Processed(SyncOutcome::failed(
        format!("/project/dst/f{n}"),
        TransferError::Reported("s-isync reported a failed file".into()),
    ))
}

fn job_id() -> JobId {
    JobId::new("42".to_string()).unwrap()
}

// ============================================================================
// Success paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_all_files_succeed() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());

    s.events.send(TransferEvent::Counted(3)).await.unwrap();
    for n in 0..3 {
        s.events.send(ok(n)).await.unwrap();
    }
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempt, 1);
    assert_eq!(outcome.result.progress, Progress { total: 3, processed: 3, failed: 0 });
    let finished = store.finished.lock().unwrap().clone().unwrap();
    assert_eq!(finished, (JobStatus::Succeeded, outcome.result.progress, None));
    assert!(!s.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_empty_source_succeeds_without_streaming() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());

    s.events.send(TransferEvent::Counted(0)).await.unwrap();
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(60, 10), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.result.progress, Progress::default());
    assert_eq!(store.saves.lock().unwrap().as_slice(), &[Progress::default()]);
}

#[tokio::test(start_paused = true)]
async fn test_progress_saves_are_throttled_by_percent() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());

    s.events.send(TransferEvent::Counted(250)).await.unwrap();
    for n in 0..250 {
        s.events.send(ok(n)).await.unwrap();
    }
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;
    assert!(outcome.is_success());

    let saves = store.saves.lock().unwrap().clone();
    assert!(saves.len() <= 101, "{} saves", saves.len());
    assert_eq!(saves.first().map(|p| p.processed), Some(0));
    assert_eq!(saves.last().map(Progress::percent), Some(100));
    assert!(saves.windows(2).all(|w| w[0].percent() < w[1].percent()));
}

// ============================================================================
// Timers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_transfer_hits_no_progress_timeout() {
    let s = script(Ok(()), Some("killed"));
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());

    s.events.send(TransferEvent::Counted(5)).await.unwrap();
    s.events.send(ok(0)).await.unwrap();
    // sender stays alive: the session is stalled, not finished

    let outcome = orchestrator.run(&job_id(), &payload(3600, 10), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::TimedOut);
    let err = outcome.error.unwrap();
    assert_eq!(err.timeout_kind(), Some(TimeoutKind::NoProgress));
    assert_eq!(err.to_string(), "no progress more than 10 seconds");
    assert_eq!(outcome.result.progress.processed, 1);
    assert!(s.terminated.load(Ordering::SeqCst));

    let finished = store.finished.lock().unwrap().clone().unwrap();
    assert_eq!(finished.2.as_deref(), Some("no progress more than 10 seconds"));
    drop(s.events);
}

#[tokio::test(start_paused = true)]
async fn test_steady_progress_runs_into_deadline() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store, s.launcher.clone());

    let events = s.events.clone();
    tokio::spawn(async move {
        events.send(TransferEvent::Counted(1000)).await.unwrap();
        for n in 0.. {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if events.send(ok(n)).await.is_err() {
                break;
            }
        }
    });

    let outcome = orchestrator.run(&job_id(), &payload(30, 2), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::TimedOut);
    assert_eq!(
        outcome.error,
        Some(JobError::DeadlineExceeded(Duration::from_secs(30)))
    );
    assert!(outcome.result.progress.processed >= 28);
    assert!(outcome.result.progress.processed < 1000);
    assert!(s.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_covers_counting() {
    let s = script(Ok(()), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());

    let outcome = orchestrator.run(&job_id(), &payload(5, 1), CancellationToken::new()).await;

    assert_eq!(
        outcome.error.and_then(|e| e.timeout_kind()),
        Some(TimeoutKind::Deadline)
    );
    assert_eq!(outcome.result.progress, Progress::default());
    drop(s.events);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_timers_never_fire() {
    let s = script(Ok(()), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());

    let events = s.events.clone();
    tokio::spawn(async move {
        events.send(TransferEvent::Counted(2)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        events.send(ok(0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        events.send(ok(1)).await.unwrap();
    });
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.result.progress.processed, 2);
}

// ============================================================================
// Cancellation and failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_terminates_session() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());
    let cancel = CancellationToken::new();

    s.events.send(TransferEvent::Counted(10)).await.unwrap();
    s.events.send(ok(0)).await.unwrap();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let outcome = orchestrator.run(&job_id(), &payload(3600, 60), cancel).await;

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert_eq!(outcome.error, Some(JobError::Cancelled));
    assert!(s.terminated.load(Ordering::SeqCst));
    let finished = store.finished.lock().unwrap().clone().unwrap();
    assert_eq!(finished.0, JobStatus::Cancelled);
    assert_eq!(finished.1.processed, 1);
    drop(s.events);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_reports_session_diagnostic() {
    let s = script(Ok(()), Some("ERROR: upload /zone/home/src/f1: permission denied"));
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());

    s.events.send(TransferEvent::Counted(3)).await.unwrap();
    s.events.send(ok(0)).await.unwrap();
    s.events.send(failed(1)).await.unwrap();
    s.events.send(ok(2)).await.unwrap();

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(
        outcome.error,
        Some(JobError::Transfer(
            "ERROR: upload /zone/home/src/f1: permission denied".into()
        ))
    );
    assert_eq!(outcome.result.progress, Progress { total: 3, processed: 2, failed: 1 });
    assert!(s.terminated.load(Ordering::SeqCst));
    drop(s.events);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_without_diagnostic_uses_outcome_error() {
    let s = script(Ok(()), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());

    s.events.send(TransferEvent::Counted(1)).await.unwrap();
    s.events.send(failed(0)).await.unwrap();

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert_eq!(
        outcome.error,
        Some(JobError::Transfer("s-isync reported a failed file".into()))
    );
    drop(s.events);
}

#[tokio::test(start_paused = true)]
async fn test_drain_all_consumes_every_outcome() {
    let s = script(Ok(()), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone())
        .with_failure_policy(FailurePolicy::DrainAll);

    s.events.send(TransferEvent::Counted(4)).await.unwrap();
    s.events.send(ok(0)).await.unwrap();
    s.events.send(failed(1)).await.unwrap();
    s.events.send(ok(2)).await.unwrap();
    s.events.send(failed(3)).await.unwrap();
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.result.progress, Progress { total: 4, processed: 4, failed: 2 });
    let reason = outcome.error.unwrap().to_string();
    assert!(reason.contains("2 of 4 files failed"), "{reason}");
    assert!(!s.terminated.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_session_exit_failure_fails_job() {
    let exit = Err(JobError::Session("s-isync failed: exit status: 1 - ERROR: boom".into()));
    let s = script(exit.clone(), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());

    s.events.send(TransferEvent::Counted(1)).await.unwrap();
    s.events.send(ok(0)).await.unwrap();
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(Err(outcome.error.unwrap()), exit);
}

#[tokio::test(start_paused = true)]
async fn test_session_ending_before_count_fails_job() {
    let s = script(Ok(()), None);
    let orchestrator = Orchestrator::new(Arc::new(RecordingStore::default()), s.launcher.clone());
    drop(s.events);

    let outcome = orchestrator.run(&job_id(), &payload(0, 0), CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert!(matches!(outcome.error, Some(JobError::Session(_))));
}

#[tokio::test]
async fn test_invalid_payload_fails_without_attempt() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());
    let mut bad = payload(0, 0);
    bad.stager_user = " ".into();

    let outcome = orchestrator.run(&job_id(), &bad, CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.attempt, 0);
    assert!(matches!(outcome.error, Some(JobError::InvalidPayload(_))));
    assert!(s.launcher.session.lock().unwrap().is_some());
    let finished = store.finished.lock().unwrap().clone().unwrap();
    assert!(finished.2.unwrap().starts_with("invalid payload"));
}

// ============================================================================
// Encrypted credentials
// ============================================================================

fn key_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../stager-core/tests/fixtures")
        .join(name)
}

#[tokio::test]
async fn test_encrypted_password_reaches_launcher_in_plain() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone())
        .with_credential_key(Some(key_fixture("credential_key.pem")));
    let mut job = payload(60, 10);
    job.dr_pass = Some(encrypt_secret("hunter2", &key_fixture("credential_key.pub.pem")).unwrap());

    s.events.send(TransferEvent::Counted(0)).await.unwrap();
    drop(s.events);
    let outcome = orchestrator.run(&job_id(), &job, CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Succeeded);
    let launched = s.launcher.launched_with.lock().unwrap().clone().unwrap();
    assert_eq!(launched.dr_pass.as_deref(), Some("hunter2"));
}

#[tokio::test]
async fn test_undecryptable_password_fails_without_attempt() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone())
        .with_credential_key(Some(key_fixture("credential_key.pem")));
    let mut job = payload(60, 10);
    job.dr_pass = Some("plain-text-password".into());

    let outcome = orchestrator.run(&job_id(), &job, CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.attempt, 0);
    assert!(matches!(outcome.error, Some(JobError::InvalidPayload(ref m)) if m.contains("decrypt")));
    assert!(s.launcher.launched_with.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_password_is_plain_without_credential_key() {
    let s = script(Ok(()), None);
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(store.clone(), s.launcher.clone());
    let mut job = payload(60, 10);
    job.dr_pass = Some("plain-text-password".into());

    s.events.send(TransferEvent::Counted(0)).await.unwrap();
    drop(s.events);
    let outcome = orchestrator.run(&job_id(), &job, CancellationToken::new()).await;

    assert_eq!(outcome.status, JobStatus::Succeeded);
    let launched = s.launcher.launched_with.lock().unwrap().clone().unwrap();
    assert_eq!(launched.dr_pass.as_deref(), Some("plain-text-password"));
}
