//! Privilege-separated transfer sessions
//!
//! Spawns `s-isync` as the job's local account so that everything written
//! on the local side belongs to that account, and turns its
//! `total,success,failure` stdout lines back into [`TransferEvent`]s.
//!
//! ## Design Notes
//!
//! - The repository password goes to a `0600` file owned by the target
//!   account, never onto the command line. The file is removed as soon as
//!   the child reports its first progress line, or when its stdout closes.
//! - The child keeps its own fail-fast policy: it exits after the first
//!   failed file, so the last stderr line is always the reason.
//! - Termination is SIGTERM first, SIGKILL once the grace period is over.
//! - Switching uid/gid needs root; when the target account is the current
//!   one the child is spawned without a credential change.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{chown, Gid, Pid, Uid, User};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use stager_core::config::Config;
use stager_core::domain::{JobError, ProgressLine, SyncOutcome, TransferError};

use crate::session::{JobContext, TransferEvent, TransferLauncher, TransferSession};

/// How long to wait for the child's stderr after it exited
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Reason attached to failures the child counted
const REPORTED_FAILURE: &str = "s-isync reported a failed file";

/// How `s-isync` is invoked
#[derive(Debug, Clone)]
pub struct SubprocessOptions {
    pub isync_path: PathBuf,
    /// Configuration file handed to the child with `-c`
    pub config_path: PathBuf,
    /// Directory for the per-job `s-isync-<job>.log`
    pub log_dir: PathBuf,
    pub workers: usize,
    pub verbose: bool,
    /// Time between SIGTERM and SIGKILL
    pub terminate_grace: Duration,
    /// Directory for the transient password files
    pub secret_dir: PathBuf,
}

impl SubprocessOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            isync_path: config.process.isync_path.clone(),
            config_path: config.process.config_path.clone(),
            log_dir: config.process.log_dir.clone(),
            workers: config.sync.workers,
            verbose: matches!(config.logging.level.as_str(), "debug" | "trace"),
            terminate_grace: Duration::from_secs(config.job.terminate_grace_secs),
            secret_dir: std::env::temp_dir(),
        }
    }
}

/// Runs transfers through `s-isync`
pub struct SubprocessLauncher {
    options: SubprocessOptions,
}

impl SubprocessLauncher {
    pub fn new(options: SubprocessOptions) -> Self {
        Self { options }
    }

    /// Command line for one job
    pub fn command_args(&self, job: &JobContext, password_file: Option<&Path>) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = vec![
            "-c".into(),
            opts.config_path.clone().into(),
            "-l".into(),
            opts.log_dir.join(format!("s-isync-{}.log", job.id)).into(),
            "-p".into(),
            opts.workers.max(1).to_string().into(),
            "--task".into(),
            job.id.to_string().into(),
        ];
        if !job.payload.dr_user.is_empty() {
            args.push("--druser".into());
            args.push(job.payload.dr_user.clone().into());
        }
        if opts.verbose {
            args.push("-v".into());
        }
        if let Some(file) = password_file {
            args.push("--fdrpass".into());
            args.push(file.into());
        }
        args.push(job.payload.src_url.clone().into());
        args.push(job.payload.dst_url.clone().into());
        args
    }
}

#[async_trait]
impl TransferLauncher for SubprocessLauncher {
    #[instrument(skip(self, job), fields(job_id = %job.id, user = %job.payload.stager_user))]
    async fn launch(&self, job: &JobContext) -> Result<Box<dyn TransferSession>, JobError> {
        let user = lookup_user(&job.payload.stager_user)?;
        let switch_user = user.uid != Uid::current();

        let password_file = match &job.payload.dr_pass {
            Some(pass) => Some(PasswordFile::create(
                &self.options.secret_dir,
                pass,
                switch_user.then_some((user.uid, user.gid)),
            )?),
            None => None,
        };

        let mut cmd = Command::new(&self.options.isync_path);
        cmd.args(self.command_args(job, password_file.as_ref().map(PasswordFile::path)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if switch_user {
            cmd.uid(user.uid.as_raw()).gid(user.gid.as_raw());
        }

        let mut child = cmd.spawn().map_err(|e| {
            JobError::Session(format!(
                "cannot start {}: {e}",
                self.options.isync_path.display()
            ))
        })?;
        info!(pid = ?child.id(), uid = %user.uid, gid = %user.gid, "s-isync started");

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return Err(JobError::Session("s-isync pipes unavailable".into())),
        };

        let (tx, rx) = mpsc::channel(64);
        let task_id = job.id.to_string();
        let source = job.payload.src_url.clone();
        let stdout_task = tokio::spawn(read_progress(stdout, tx, password_file, source));
        let stderr_task = tokio::spawn(read_diagnostics(stderr, task_id.clone()));

        Ok(Box::new(SubprocessSession {
            child,
            events: rx,
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
            grace: self.options.terminate_grace,
            task_id,
        }))
    }
}

fn lookup_user(name: &str) -> Result<User, JobError> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(JobError::Session(format!("unknown local user: {name}"))),
        Err(e) => Err(JobError::Session(format!("cannot look up user {name}: {e}"))),
    }
}

// ============================================================================
// Password hand-off
// ============================================================================

/// Transient `0600` password file, removed on drop
#[derive(Debug)]
pub struct PasswordFile {
    path: PathBuf,
}

impl PasswordFile {
    /// Write `password` to a fresh file in `dir`, owned by `owner` if given
    ///
    /// # Errors
    /// Returns [`JobError::Session`] if the file cannot be written or chowned.
    pub fn create(dir: &Path, password: &str, owner: Option<(Uid, Gid)>) -> Result<Self, JobError> {
        let uid = owner.map_or_else(Uid::current, |(uid, _)| uid);
        let path = dir.join(format!(".drpass-{uid}-{}", Uuid::new_v4().simple()));
        let file = Self { path };

        let mut handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&file.path)
            .map_err(|e| file.error("create", e))?;
        handle
            .write_all(password.as_bytes())
            .map_err(|e| file.error("write", e))?;

        if let Some((uid, gid)) = owner {
            chown(&file.path, Some(uid), Some(gid)).map_err(|e| file.error("chown", e))?;
        }
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, op: &str, err: impl std::fmt::Display) -> JobError {
        JobError::Session(format!(
            "cannot {op} credential file {}: {err}",
            self.path.display()
        ))
    }
}

impl Drop for PasswordFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "credential file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot remove credential file"),
        }
    }
}

// ============================================================================
// Child output
// ============================================================================

/// Events implied by a new progress line
///
/// The first line yields `Counted`; later lines yield one outcome per unit
/// the success and failure counters moved.
pub fn events_for_line(
    previous: Option<ProgressLine>,
    line: ProgressLine,
    source: &str,
) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    let prev = match previous {
        Some(prev) => prev,
        None => {
            events.push(TransferEvent::Counted(line.total));
            ProgressLine {
                total: line.total,
                ..ProgressLine::default()
            }
        }
    };

    for _ in prev.success..line.success {
        events.push(TransferEvent::Processed(SyncOutcome::ok(source)));
    }
    for _ in prev.failure..line.failure {
        events.push(TransferEvent::Processed(SyncOutcome::failed(
            source,
            TransferError::Reported(REPORTED_FAILURE.into()),
        )));
    }
    events
}

async fn read_progress(
    stdout: ChildStdout,
    events: mpsc::Sender<TransferEvent>,
    mut password_file: Option<PasswordFile>,
    source: String,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut previous: Option<ProgressLine> = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "cannot read s-isync output");
                break;
            }
        };
        let parsed: ProgressLine = match line.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(line = %line, "unexpected progress output");
                continue;
            }
        };
        if let Some(prev) = previous {
            if parsed.success < prev.success || parsed.failure < prev.failure {
                warn!(line = %line, "progress went backwards, ignored");
                continue;
            }
        }

        // The child has read its credential once it reports anything
        drop(password_file.take());

        for event in events_for_line(previous, parsed, &source) {
            if events.send(event).await.is_err() {
                return;
            }
        }
        previous = Some(parsed);
    }
}

/// Log every stderr line; return the last non-empty one
async fn read_diagnostics(stderr: ChildStderr, task_id: String) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(task = %task_id, stderr = %line, "s-isync");
        last = Some(line);
    }
    last
}

// ============================================================================
// Session
// ============================================================================

struct SubprocessSession {
    child: Child,
    events: mpsc::Receiver<TransferEvent>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<Option<String>>>,
    grace: Duration,
    task_id: String,
}

impl SubprocessSession {
    /// Last stderr line, waiting a bounded time for the pipe to close
    async fn last_diagnostic(&mut self) -> Option<String> {
        if let Some(task) = self.stdout_task.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await;
        }
        let task = self.stderr_task.take()?;
        match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
            Ok(Ok(last)) => last,
            _ => None,
        }
    }

    fn failure(status: ExitStatus, diagnostic: Option<String>) -> JobError {
        JobError::Session(format!(
            "s-isync failed: {status} - {}",
            diagnostic.unwrap_or_default()
        ))
    }
}

#[async_trait]
impl TransferSession for SubprocessSession {
    async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    async fn wait(&mut self) -> Result<(), JobError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| JobError::Session(format!("cannot wait for s-isync: {e}")))?;
        let diagnostic = self.last_diagnostic().await;

        if status.success() {
            debug!(task = %self.task_id, "s-isync exited");
            Ok(())
        } else {
            Err(Self::failure(status, diagnostic))
        }
    }

    async fn terminate(&mut self) -> Option<String> {
        if let Some(pid) = self.child.id() {
            let pid = Pid::from_raw(pid as i32);
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!(task = %self.task_id, error = %e, "cannot send SIGTERM to s-isync");
            }
        }

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(task = %self.task_id, %status, "s-isync terminated"),
            Ok(Err(e)) => warn!(task = %self.task_id, error = %e, "cannot wait for s-isync"),
            Err(_) => {
                warn!(task = %self.task_id, "s-isync ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(task = %self.task_id, error = %e, "cannot kill s-isync");
                }
            }
        }
        self.events.close();
        self.last_diagnostic().await
    }
}
