//! Status command - Show job state from the job store

use anyhow::{Context, Result};
use clap::Args;

use stager_core::config::Config;
use stager_core::domain::JobId;
use stager_core::ports::IJobStore;
use stager_store::{DatabasePool, SqliteJobStore};

use crate::output::{get_formatter, OutputFormat};

/// Number of jobs listed when no id is given
const RECENT_JOBS: u32 = 20;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Job to show; the most recent jobs are listed when absent
    pub job_id: Option<String>,
}

impl StatusCommand {
    /// Returns false when the requested job does not exist
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<bool> {
        let formatter = get_formatter(format);

        if !config.store.path.exists() {
            if self.job_id.is_some() {
                formatter.error("no job database yet");
                return Ok(false);
            }
            formatter.records(&[]);
            return Ok(true);
        }

        let pool = DatabasePool::new(&config.store.path)
            .await
            .context("Failed to open job database")?;
        let store = SqliteJobStore::new(pool.pool().clone());

        let Some(id) = &self.job_id else {
            formatter.records(&store.list_jobs(RECENT_JOBS).await?);
            return Ok(true);
        };

        let id = JobId::new(id.clone())?;
        match store.get_job(&id).await? {
            Some(job) => {
                formatter.record(&job);
                Ok(true)
            }
            None => {
                formatter.error(&format!("job {id} not found"));
                Ok(false)
            }
        }
    }
}
