//! Configuration module for the stager.
//!
//! Provides typed configuration structs that map to the YAML worker
//! configuration file, with loading, validation, defaults, and a builder
//! pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::domain::{FailurePolicy, IdentityPolicy};

/// Environment variable naming the worker configuration file
pub const CONFIG_ENV: &str = "STAGER_WORKER_CONFIG";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the stager worker and the transfer tool.
///
/// Every section is optional in the YAML file; missing sections take their
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub sync: SyncConfig,
    pub job: JobConfig,
    pub process: ProcessConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

/// Remote catalog endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog HTTP API.
    pub base_url: String,
    /// Catalog zone name.
    pub zone: String,
    /// Service account used when a job carries no repository password.
    pub service_user: Option<String>,
    pub service_password: Option<String>,
    /// Rows requested per listing page.
    pub page_size: u32,
    /// Size of each upload chunk (in MiB).
    pub chunk_size_mb: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of concurrent transfer workers.
    pub workers: usize,
    /// Scan queue capacity per worker.
    pub buffer_factor: usize,
    /// When an existing destination file counts as identical.
    pub identity: IdentityPolicy,
    /// Verify uploads with a server-side checksum.
    pub verify_checksum: bool,
    /// Follow symbolic links while scanning local trees.
    pub follow_symlinks: bool,
}

/// Job orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// What to do with the first failed file: `fail_fast` or `drain_all`.
    pub failure_policy: FailurePolicy,
    /// Seconds a terminated transfer subprocess gets before it is killed.
    pub terminate_grace_secs: u64,
    /// PKCS#8 PEM private key for RSA-encrypted payload passwords.
    /// Payload passwords are taken as plain text when absent.
    pub credential_key: Option<PathBuf>,
}

/// Transfer subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Path of the `s-isync` executable.
    pub isync_path: PathBuf,
    /// Configuration file handed to `s-isync`.
    pub config_path: PathBuf,
    /// Directory receiving per-job `s-isync` logs.
    pub log_dir: PathBuf,
    /// Run transfers inside the worker instead of a subprocess.
    pub in_process: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

/// Job store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// `$STAGER_WORKER_CONFIG` when set, otherwise
    /// `$XDG_CONFIG_HOME/stager/worker.yml` on Linux.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("stager")
            .join("worker.yml")
    }

    /// Service account credential, when both halves are configured.
    pub fn service_credential(&self) -> Option<Credential> {
        match (&self.catalog.service_user, &self.catalog.service_password) {
            (Some(user), Some(pass)) => Some(Credential::new(user.clone(), pass.clone())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000/irods-http-api/0.2.0".to_string(),
            zone: "tempZone".to_string(),
            service_user: None,
            service_password: None,
            page_size: 1024,
            chunk_size_mb: 8,
            request_timeout_secs: 300,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            buffer_factor: 8,
            identity: IdentityPolicy::Checksum,
            verify_checksum: true,
            follow_symlinks: false,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::FailFast,
            terminate_grace_secs: 5,
            credential_key: None,
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            isync_path: PathBuf::from("/opt/stager/bin/s-isync"),
            config_path: PathBuf::from("/etc/stager/worker.yml"),
            log_dir: PathBuf::from("/tmp"),
            in_process: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("stager")
                .join("jobs.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- catalog ---
        positive("catalog.page_size", u64::from(self.catalog.page_size));
        positive("catalog.chunk_size_mb", self.catalog.chunk_size_mb);
        positive(
            "catalog.request_timeout_secs",
            self.catalog.request_timeout_secs,
        );

        // --- sync ---
        positive("sync.workers", self.sync.workers as u64);
        positive("sync.buffer_factor", self.sync.buffer_factor as u64);

        if !(self.catalog.base_url.starts_with("http://")
            || self.catalog.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "catalog.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.catalog.base_url),
            });
        }
        if self.catalog.zone.trim().is_empty() {
            errors.push(ValidationError {
                field: "catalog.zone".into(),
                message: "must not be empty".into(),
            });
        }
        if self.catalog.service_user.is_some() != self.catalog.service_password.is_some() {
            errors.push(ValidationError {
                field: "catalog.service_password".into(),
                message: "service_user and service_password must be set together".into(),
            });
        }

        // --- process ---
        if !self.process.in_process && self.process.isync_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "process.isync_path".into(),
                message: "required unless process.in_process is set".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for programmatic construction of a [`Config`].
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- catalog ---

    pub fn catalog_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.catalog.base_url = url.into();
        self
    }

    pub fn catalog_zone(mut self, zone: impl Into<String>) -> Self {
        self.config.catalog.zone = zone.into();
        self
    }

    pub fn catalog_service_account(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.catalog.service_user = Some(user.into());
        self.config.catalog.service_password = Some(password.into());
        self
    }

    pub fn catalog_page_size(mut self, rows: u32) -> Self {
        self.config.catalog.page_size = rows;
        self
    }

    pub fn catalog_chunk_size_mb(mut self, mb: u64) -> Self {
        self.config.catalog.chunk_size_mb = mb;
        self
    }

    // --- sync ---

    pub fn sync_workers(mut self, n: usize) -> Self {
        self.config.sync.workers = n;
        self
    }

    pub fn sync_identity(mut self, policy: IdentityPolicy) -> Self {
        self.config.sync.identity = policy;
        self
    }

    pub fn sync_verify_checksum(mut self, verify: bool) -> Self {
        self.config.sync.verify_checksum = verify;
        self
    }

    pub fn sync_follow_symlinks(mut self, follow: bool) -> Self {
        self.config.sync.follow_symlinks = follow;
        self
    }

    // --- job ---

    pub fn job_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.job.failure_policy = policy;
        self
    }

    pub fn job_credential_key(mut self, path: PathBuf) -> Self {
        self.config.job.credential_key = Some(path);
        self
    }

    // --- process ---

    pub fn process_isync_path(mut self, path: PathBuf) -> Self {
        self.config.process.isync_path = path;
        self
    }

    pub fn process_in_process(mut self, in_process: bool) -> Self {
        self.config.process.in_process = in_process;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
