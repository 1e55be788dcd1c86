//! Exit codes of the transfer tool

use stager_sync::SyncError;
use thiserror::Error;

/// Transfer ran but a file failed
pub const EXIT_TRANSFER: u8 = 1;
/// Bad flags, configuration, credential or root locator
pub const EXIT_INVALID_ARGUMENT: u8 = 128;
/// Interrupted by a signal or the parent
pub const EXIT_ABORTED: u8 = 130;

/// Failure that ends the process with a non-zero exit code
///
/// The `Display` form is the diagnostic line written to stderr.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsyncError {
    #[error("general error (1): {0}")]
    Transfer(String),

    #[error("invalid argument (128): {0}")]
    InvalidArgument(String),

    #[error("process terminated (130): {0}")]
    Aborted(String),
}

impl IsyncError {
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            IsyncError::Transfer(_) => EXIT_TRANSFER,
            IsyncError::InvalidArgument(_) => EXIT_INVALID_ARGUMENT,
            IsyncError::Aborted(_) => EXIT_ABORTED,
        }
    }
}

impl From<SyncError> for IsyncError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Resolve(_) | SyncError::InvalidDestination { .. } | SyncError::DomainError(_) => {
                IsyncError::InvalidArgument(err.to_string())
            }
            SyncError::Cancelled => IsyncError::Aborted("aborted by task".into()),
            other => IsyncError::Transfer(other.to_string()),
        }
    }
}
