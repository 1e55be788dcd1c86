//! Run command - Stage one job
//!
//! Provides the `stager-worker run` command which:
//! 1. Reads and validates the job payload
//! 2. Records the job in the job store
//! 3. Runs one attempt through `s-isync` or the in-process engine
//! 4. Prints the job result

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use stager_core::config::Config;
use stager_core::domain::{JobId, JobPayload};
use stager_core::ports::IJobStore;
use stager_store::{DatabasePool, SqliteJobStore};
use stager_sync::SyncOptions;
use stager_worker::{
    HttpCatalogProvider, InProcessLauncher, Orchestrator, SubprocessLauncher,
    SubprocessOptions, TransferLauncher,
};

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Job payload JSON file, `-` for stdin
    #[arg(long)]
    pub payload: PathBuf,

    /// Job id; a new one is generated when absent
    #[arg(long)]
    pub job_id: Option<String>,

    /// Run the transfer inside the worker instead of through s-isync
    #[arg(long)]
    pub in_process: bool,
}

impl RunCommand {
    /// Returns whether the job succeeded
    pub async fn execute(
        &self,
        config: &Config,
        format: OutputFormat,
        cancel: CancellationToken,
    ) -> Result<bool> {
        let formatter = get_formatter(format);

        let payload = JobPayload::from_json(&self.read_payload()?)?;
        let id = match &self.job_id {
            Some(id) => JobId::new(id.clone())?,
            None => JobId::generate(),
        };

        let pool = DatabasePool::new(&config.store.path)
            .await
            .context("Failed to open job database")?;
        let store = Arc::new(SqliteJobStore::new(pool.pool().clone()));
        store.create_job(&id, &payload).await?;

        let launcher = self.launcher(config);
        let orchestrator = Orchestrator::new(store, launcher)
            .with_failure_policy(config.job.failure_policy)
            .with_credential_key(config.job.credential_key.clone());

        info!(job_id = %id, title = %payload.title, "running job");
        let outcome = orchestrator.run(&id, &payload, cancel).await;

        formatter.outcome(&id, &outcome);
        Ok(outcome.is_success())
    }

    fn read_payload(&self) -> Result<Vec<u8>> {
        if self.payload.as_os_str() == "-" {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("Failed to read payload from stdin")?;
            return Ok(data);
        }
        std::fs::read(&self.payload)
            .with_context(|| format!("Failed to read payload {}", self.payload.display()))
    }

    fn launcher(&self, config: &Config) -> Arc<dyn TransferLauncher> {
        if self.in_process || config.process.in_process {
            let catalogs = HttpCatalogProvider::new(config.catalog.clone(), config.service_credential());
            Arc::new(InProcessLauncher::new(
                Arc::new(catalogs),
                SyncOptions::from(&config.sync),
            ))
        } else {
            Arc::new(SubprocessLauncher::new(SubprocessOptions::from_config(config)))
        }
    }
}
