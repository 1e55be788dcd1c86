//! Stager Sync - Directory staging engine
//!
//! Provides:
//! - Path resolution against the local filesystem and the remote catalog
//! - Depth-first scanning with directory materialization ahead of files
//! - A fixed-size worker pool moving files across namespaces
//! - Content-skip of destination files that are already identical
//!
//! ## Modules
//!
//! - [`context`] - Per-job execution context (catalog handle, options)
//! - [`filesystem`] - Local filesystem adapter (streaming SHA-256, mkdir)
//! - [`resolver`] - Locator → `PathInfo` resolution and identity checks
//! - [`scanner`] - Local and catalog tree scanners
//! - [`materializer`] - Destination directory/collection creation
//! - [`pool`] - Sync worker pool
//! - [`engine`] - Plan/count/start entry points used by callers

pub mod context;
pub mod engine;
pub mod filesystem;
pub mod materializer;
pub mod pool;
pub mod resolver;
pub mod scanner;

use thiserror::Error;

pub use context::{ExecutionContext, SyncOptions};
pub use engine::{RunningTransfer, SyncEngine, TransferPlan};
pub use resolver::ResolveError;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A destination directory or collection could not be created
    #[error("cannot create directory {path}: {reason}")]
    DirectoryCreate { path: String, reason: String },

    /// A root locator could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Source and destination roots cannot be paired
    #[error("invalid destination {path}: {reason}")]
    InvalidDestination { path: String, reason: String },

    #[error("cancelled")]
    Cancelled,

    /// A domain-level error propagated from stager-core
    #[error("Domain error: {0}")]
    DomainError(#[from] stager_core::domain::DomainError),
}
