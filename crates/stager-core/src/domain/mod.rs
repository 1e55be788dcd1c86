//! Domain types and business rules
//!
//! This module contains the core domain types of the stager:
//! - Locators and the two storage namespaces
//! - Resolved path descriptors and the content identity rules
//! - Per-file transfer outcomes and aggregate job progress
//! - Job payloads, results and terminal job errors
//! - Validated newtypes (job ids, checksums)

pub mod errors;
pub mod job;
pub mod locator;
pub mod newtypes;
pub mod outcome;
pub mod path_info;
pub mod progress;

// Re-export commonly used types
pub use errors::DomainError;
pub use job::{FailurePolicy, JobError, JobPayload, JobResult, JobStatus, TimeoutKind};
pub use locator::{Locator, Namespace};
pub use newtypes::{Checksum, JobId};
pub use outcome::{SyncOutcome, TransferError};
pub use path_info::{IdentityPolicy, NodeKind, PathInfo};
pub use progress::{Progress, ProgressLine};
