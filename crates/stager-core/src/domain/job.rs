//! Staging jobs: payload, result, status and terminal errors
//!
//! The payload is produced by the queue layer and is immutable once parsed;
//! the orchestrator only derives locators and limits from it.
//!
//! ## Design Notes
//!
//! - JSON field names follow the queue layer's wire format (`drUser`,
//!   `srcURL`, `timeout_noprogress`, ...), hence the explicit renames.
//! - `Debug` and [`JobPayload::redacted`] never expose the repository password.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::errors::DomainError;
use super::locator::Locator;
use super::progress::Progress;

/// Default overall job timeout (one day)
pub const DEFAULT_TIMEOUT_SECS: i64 = 86_400;

/// Default no-progress timeout (one hour)
pub const DEFAULT_TIMEOUT_NOPROGRESS_SECS: i64 = 3_600;

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_timeout_noprogress() -> i64 {
    DEFAULT_TIMEOUT_NOPROGRESS_SECS
}

// ============================================================================
// JobPayload
// ============================================================================

/// A staging request as delivered by the job queue
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub title: String,

    /// Repository account used for the catalog side of the transfer
    #[serde(rename = "drUser", default)]
    pub dr_user: String,

    #[serde(rename = "drPass", default, skip_serializing_if = "Option::is_none")]
    pub dr_pass: Option<String>,

    #[serde(rename = "srcURL")]
    pub src_url: String,

    #[serde(rename = "dstURL")]
    pub dst_url: String,

    /// Local account the transfer runs as
    #[serde(rename = "stagerUser")]
    pub stager_user: String,

    #[serde(
        rename = "stagerUserEmail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stager_user_email: Option<String>,

    /// Overall timeout in seconds, 0 for none
    #[serde(default = "default_timeout")]
    pub timeout: i64,

    /// No-progress timeout in seconds, 0 for none
    #[serde(rename = "timeout_noprogress", default = "default_timeout_noprogress")]
    pub timeout_noprogress: i64,

    /// Submission time, unix seconds
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,
}

impl fmt::Debug for JobPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPayload")
            .field("title", &self.title)
            .field("dr_user", &self.dr_user)
            .field("dr_pass", &self.dr_pass.as_ref().map(|_| "<redacted>"))
            .field("src_url", &self.src_url)
            .field("dst_url", &self.dst_url)
            .field("stager_user", &self.stager_user)
            .field("timeout", &self.timeout)
            .field("timeout_noprogress", &self.timeout_noprogress)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl JobPayload {
    /// Parse and validate a JSON payload
    ///
    /// # Errors
    /// Returns [`JobError::InvalidPayload`] for malformed JSON or a payload
    /// that fails [`JobPayload::validate`].
    pub fn from_json(data: &[u8]) -> Result<Self, JobError> {
        let payload: JobPayload =
            serde_json::from_slice(data).map_err(|e| JobError::InvalidPayload(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Check the payload before any I/O is done on its behalf
    ///
    /// # Errors
    /// Returns [`JobError::InvalidPayload`] describing the first problem found.
    pub fn validate(&self) -> Result<(), JobError> {
        self.source()?;
        self.destination()?;
        if self.stager_user.trim().is_empty() {
            return Err(JobError::InvalidPayload("stagerUser is empty".into()));
        }
        if self.timeout < 0 {
            return Err(JobError::InvalidPayload(format!(
                "timeout must not be negative: {}",
                self.timeout
            )));
        }
        if self.timeout_noprogress < 0 {
            return Err(JobError::InvalidPayload(format!(
                "timeout_noprogress must not be negative: {}",
                self.timeout_noprogress
            )));
        }
        Ok(())
    }

    /// Parsed source locator
    pub fn source(&self) -> Result<Locator, JobError> {
        Locator::parse(&self.src_url)
            .map_err(|e| JobError::InvalidPayload(format!("srcURL: {e}")))
    }

    /// Parsed destination locator
    pub fn destination(&self) -> Result<Locator, JobError> {
        Locator::parse(&self.dst_url)
            .map_err(|e| JobError::InvalidPayload(format!("dstURL: {e}")))
    }

    /// Overall deadline, `None` when disabled
    #[must_use]
    pub fn overall_timeout(&self) -> Option<Duration> {
        secs_to_limit(self.timeout)
    }

    /// Liveness limit between two outcomes, `None` when disabled
    #[must_use]
    pub fn no_progress_timeout(&self) -> Option<Duration> {
        secs_to_limit(self.timeout_noprogress)
    }

    /// Copy of the payload safe to persist or log
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            dr_pass: None,
            ..self.clone()
        }
    }
}

fn secs_to_limit(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

// ============================================================================
// JobResult / JobStatus
// ============================================================================

/// Result document persisted for the queue layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub progress: Progress,
}

/// Lifecycle state of a job as seen by the job store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the status ends an attempt
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "timed_out" => Ok(JobStatus::TimedOut),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

// ============================================================================
// Policies
// ============================================================================

/// What the orchestrator does with the first failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First transfer error ends the attempt; the job-level retry re-runs it
    #[default]
    FailFast,
    /// Consume every outcome and fail at the end if any failed
    DrainAll,
}

/// Which timer ended an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Deadline,
    NoProgress,
}

// ============================================================================
// JobError
// ============================================================================

/// Terminal reasons for an unsuccessful job attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Rejected before any I/O
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("cannot resolve {locator}: {reason}")]
    Resolution { locator: String, reason: String },

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("no progress more than {} seconds", .0.as_secs())]
    NoProgressTimeout(Duration),

    #[error("deadline of {} seconds exceeded", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("job cancelled")]
    Cancelled,

    /// The transfer session itself broke (spawn failure, lost child, ...)
    #[error("transfer session error: {0}")]
    Session(String),

    #[error("job store error: {0}")]
    Store(String),
}

impl JobError {
    /// Status recorded for a job ending with this error
    #[must_use]
    pub fn status(&self) -> JobStatus {
        match self {
            JobError::NoProgressTimeout(_) | JobError::DeadlineExceeded(_) => JobStatus::TimedOut,
            JobError::Cancelled => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    /// Which timer fired, if this is a timeout
    #[must_use]
    pub fn timeout_kind(&self) -> Option<TimeoutKind> {
        match self {
            JobError::NoProgressTimeout(_) => Some(TimeoutKind::NoProgress),
            JobError::DeadlineExceeded(_) => Some(TimeoutKind::Deadline),
            _ => None,
        }
    }

    /// Whether a fresh attempt could plausibly succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::InvalidPayload(_) | JobError::Cancelled)
    }
}
