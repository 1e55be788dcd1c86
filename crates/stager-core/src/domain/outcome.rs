//! Per-file transfer outcomes

use thiserror::Error;

use super::locator::Namespace;

/// Why a single file could not be staged
///
/// Every variant carries a concrete cause string so a failed outcome is
/// always explainable from the job result alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Same-namespace staging is not something the engine does
    #[error("transfer from {from} to {to} is not supported")]
    Unsupported { from: Namespace, to: Namespace },

    /// Source or destination could not be stat'ed
    #[error("cannot resolve {path}: {reason}")]
    Resolution { path: String, reason: String },

    #[error("download {path} failed: {reason}")]
    Download { path: String, reason: String },

    #[error("upload {path} failed: {reason}")]
    Upload { path: String, reason: String },

    /// Bytes were copied but the server-side digest disagrees
    #[error("checksum mismatch on {path}: local {local}, remote {remote}")]
    ChecksumMismatch {
        path: String,
        local: String,
        remote: String,
    },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// A transfer subprocess counted a failure without naming the file
    #[error("{0}")]
    Reported(String),
}

/// Result of handling one regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Source locator path of the file
    pub file: String,
    /// `None` when the file was transferred or already identical
    pub error: Option<TransferError>,
}

impl SyncOutcome {
    #[must_use]
    pub fn ok(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(file: impl Into<String>, error: TransferError) -> Self {
        Self {
            file: file.into(),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
