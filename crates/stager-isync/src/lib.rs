//! s-isync - Transfer tool of the data stager
//!
//! The job orchestrator runs this tool as the job's local user, so every
//! file it creates on the local side is owned by that user. The tool moves
//! one source tree to one destination and reports progress on stdout.
//!
//! ## Output protocol
//!
//! - Once counting completes: `total,0,0`
//! - After every concluded file: `total,success,failure`
//! - On a non-zero exit the last stderr line is the failure reason,
//!   formatted as `<kind> (<exit code>): <message>`
//!
//! ## Modules
//!
//! - [`args`] - Command-line flags and credential selection
//! - [`error`] - Exit codes
//! - [`output`] - Progress line writer
//! - [`transfer`] - Plan, count and stream one transfer

pub mod args;
pub mod error;
pub mod output;
pub mod transfer;

pub use args::IsyncArgs;
pub use error::IsyncError;
pub use output::ProgressWriter;
pub use transfer::run_transfer;
