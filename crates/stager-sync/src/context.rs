//! Per-job execution context
//!
//! Every scanner, materializer and worker receives the backend handles and
//! tunables it needs through an [`ExecutionContext`] value. The context is
//! built once per job and cloned into each task; nothing is looked up from
//! process-wide state.

use std::sync::Arc;

use stager_core::config::SyncConfig;
use stager_core::domain::IdentityPolicy;
use stager_core::ports::ICatalog;

use crate::filesystem::LocalFileSystem;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Number of sync workers
    pub workers: usize,
    /// Scanner channel capacity per worker
    pub buffer_factor: usize,
    pub identity: IdentityPolicy,
    /// Ask the catalog for a fresh checksum after each upload and compare
    pub verify_checksum: bool,
    pub follow_symlinks: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            workers: cfg.workers.max(1),
            buffer_factor: cfg.buffer_factor.max(1),
            identity: cfg.identity,
            verify_checksum: cfg.verify_checksum,
            follow_symlinks: cfg.follow_symlinks,
        }
    }
}

impl SyncOptions {
    /// Capacity of the scanner's output channel
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.workers.max(1).saturating_mul(self.buffer_factor.max(1))
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Handles and options shared by every task of one job
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<dyn ICatalog>,
    pub local: LocalFileSystem,
    pub options: SyncOptions,
}

impl ExecutionContext {
    pub fn new(catalog: Arc<dyn ICatalog>, options: SyncOptions) -> Self {
        Self {
            catalog,
            local: LocalFileSystem::new(),
            options,
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
