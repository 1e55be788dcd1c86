//! In-process transfer sessions
//!
//! Runs the sync engine on tasks of this process, under the worker's own
//! account. Used for single-user deployments and in tests; production
//! deployments that stage into users' directories use
//! [`crate::subprocess`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stager_catalog::{CatalogClient, HttpCatalog};
use stager_core::config::CatalogConfig;
use stager_core::credential::Credential;
use stager_core::domain::{JobError, JobPayload, Locator};
use stager_core::ports::ICatalog;
use stager_sync::{ExecutionContext, SyncEngine, SyncError, SyncOptions};

use crate::session::{JobContext, TransferEvent, TransferLauncher, TransferSession};

/// Supplies the catalog handle for one job
pub trait CatalogProvider: Send + Sync {
    /// # Errors
    /// Fails when no usable credential or endpoint is available.
    fn catalog_for(&self, payload: &JobPayload) -> Result<Arc<dyn ICatalog>, JobError>;
}

/// Fresh HTTP catalog per job, authenticated as the job's repository user
///
/// Jobs without a repository password run as the configured service account.
pub struct HttpCatalogProvider {
    config: CatalogConfig,
    service: Option<Credential>,
}

impl HttpCatalogProvider {
    pub fn new(config: CatalogConfig, service: Option<Credential>) -> Self {
        Self { config, service }
    }
}

impl CatalogProvider for HttpCatalogProvider {
    fn catalog_for(&self, payload: &JobPayload) -> Result<Arc<dyn ICatalog>, JobError> {
        let credential = match &payload.dr_pass {
            Some(pass) => Credential::new(payload.dr_user.clone(), pass.clone()),
            None => self.service.clone().ok_or_else(|| {
                JobError::InvalidPayload("no repository password and no service account".into())
            })?,
        };
        let client = CatalogClient::from_config(&self.config, credential)
            .map_err(|e| JobError::Session(e.to_string()))?;
        Ok(Arc::new(HttpCatalog::new(client)))
    }
}

/// The same catalog for every job
pub struct SharedCatalog(pub Arc<dyn ICatalog>);

impl CatalogProvider for SharedCatalog {
    fn catalog_for(&self, _payload: &JobPayload) -> Result<Arc<dyn ICatalog>, JobError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Launches the sync engine inside this process
pub struct InProcessLauncher {
    catalogs: Arc<dyn CatalogProvider>,
    options: SyncOptions,
}

impl InProcessLauncher {
    pub fn new(catalogs: Arc<dyn CatalogProvider>, options: SyncOptions) -> Self {
        Self { catalogs, options }
    }
}

#[async_trait]
impl TransferLauncher for InProcessLauncher {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn launch(&self, job: &JobContext) -> Result<Box<dyn TransferSession>, JobError> {
        let src = job.payload.source()?;
        let dst = job.payload.destination()?;
        let catalog = self.catalogs.catalog_for(&job.payload)?;
        let engine = SyncEngine::new(ExecutionContext::new(catalog, self.options.clone()));

        let (tx, rx) = mpsc::channel(self.options.workers.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(engine, src, dst, tx, cancel.clone()));
        info!(workers = self.options.workers, "in-process transfer started");

        Ok(Box::new(InProcessSession {
            events: rx,
            task: Some(task),
            cancel,
        }))
    }
}

/// Plan, count and forward outcomes as events
async fn drive(
    engine: SyncEngine,
    src: Locator,
    dst: Locator,
    events: mpsc::Sender<TransferEvent>,
    cancel: CancellationToken,
) -> Result<(), JobError> {
    let plan = engine.plan(&src, &dst).await.map_err(|e| match e {
        SyncError::Resolve(_) | SyncError::InvalidDestination { .. } => JobError::Resolution {
            locator: format!("{src} -> {dst}"),
            reason: e.to_string(),
        },
        other => JobError::Session(other.to_string()),
    })?;

    let total = engine.count(&plan, cancel.clone()).await;
    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    if events.send(TransferEvent::Counted(total)).await.is_err() || total == 0 {
        return Ok(());
    }

    let mut running = engine.start(&plan, cancel.clone());
    while let Some(outcome) = running.outcomes.recv().await {
        if events.send(TransferEvent::Processed(outcome)).await.is_err() {
            debug!("session dropped, stopping transfer");
            cancel.cancel();
            break;
        }
    }
    match running.scan.await {
        Ok(stats) => debug!(?stats, "scan finished"),
        Err(e) => warn!(error = %e, "scan task failed"),
    }

    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    Ok(())
}

struct InProcessSession {
    events: mpsc::Receiver<TransferEvent>,
    task: Option<JoinHandle<Result<(), JobError>>>,
    cancel: CancellationToken,
}

impl InProcessSession {
    async fn join(&mut self) -> Result<(), JobError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| JobError::Session(format!("transfer task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TransferSession for InProcessSession {
    async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    async fn wait(&mut self) -> Result<(), JobError> {
        self.join().await
    }

    async fn terminate(&mut self) -> Option<String> {
        self.cancel.cancel();
        self.events.close();
        match self.join().await {
            Ok(()) | Err(JobError::Cancelled) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

impl Drop for InProcessSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
