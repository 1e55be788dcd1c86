//! Stager Worker - Job orchestration for the data stager
//!
//! Takes a staging job payload, runs it through a transfer session and
//! keeps the job's durable state current.
//!
//! ## Modules
//!
//! - [`session`] - Transfer session and launcher traits
//! - [`orchestrator`] - Attempt state machine, timers and progress persistence
//! - [`inprocess`] - Sessions running the sync engine in this process
//! - [`subprocess`] - Sessions running `s-isync` as the job's local account
//! - [`logging`] - Tracing subscriber setup

pub mod inprocess;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod subprocess;

pub use inprocess::{CatalogProvider, HttpCatalogProvider, InProcessLauncher, SharedCatalog};
pub use orchestrator::{JobOutcome, Orchestrator, Phase};
pub use session::{JobContext, TransferEvent, TransferLauncher, TransferSession};
pub use subprocess::{SubprocessLauncher, SubprocessOptions};
