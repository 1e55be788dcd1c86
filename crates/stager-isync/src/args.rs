//! Command-line flags
//!
//! Flag names are part of the contract with the job orchestrator, which
//! builds the `s-isync` command line itself.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use stager_core::config::{Config, CONFIG_ENV};
use stager_core::credential::{decrypt_secret, Credential};
use stager_core::domain::Locator;
use stager_sync::SyncOptions;

use crate::error::IsyncError;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_LOG_FILE: &str = "/opt/stager/log/s-isync.log";
pub const DEFAULT_TASK_ID: &str = "0000-0000-0000-0000";
pub const DEFAULT_KEY_FILE: &str = "key.pem";

#[derive(Debug, Parser)]
#[command(
    name = "s-isync",
    version,
    about = "Stage a file tree between the local filesystem and the data repository"
)]
pub struct IsyncArgs {
    /// Print debug messages (repeat for trace)
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of concurrent transfer workers
    #[arg(short = 'p', long = "workers", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Configuration file path
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log file path
    #[arg(short = 'l', long = "log", default_value = DEFAULT_LOG_FILE)]
    pub log: PathBuf,

    /// Stager task id, used to tag log lines
    #[arg(long, default_value = DEFAULT_TASK_ID)]
    pub task: String,

    /// Repository data-access username
    #[arg(long)]
    pub druser: Option<String>,

    /// Repository data-access password (visible in process listings)
    #[arg(long, conflicts_with = "fdrpass")]
    pub drpass: Option<String>,

    /// File whose first line is the repository data-access password
    #[arg(long, value_name = "FILE")]
    pub fdrpass: Option<PathBuf>,

    /// The given password is RSA-encrypted (base64)
    #[arg(short = 'e', long = "encrypted")]
    pub encrypted: bool,

    /// PKCS#8 PEM private key decrypting the password
    #[arg(short = 'k', long = "key", value_name = "FILE", default_value = DEFAULT_KEY_FILE)]
    pub key: PathBuf,

    /// Source path; prefix with `i:` or `irods:` for the repository
    pub source: String,

    /// Destination path; prefix with `i:` or `irods:` for the repository
    pub destination: String,
}

impl IsyncArgs {
    /// Load the configuration file
    ///
    /// Without `-c` the default location is tried and missing files fall
    /// back to defaults.
    pub fn load_config(&self) -> Result<Config, IsyncError> {
        let config = match &self.config {
            Some(path) => Config::load(path).map_err(|e| {
                IsyncError::InvalidArgument(format!(
                    "fail to load configuration {}: {e}",
                    path.display()
                ))
            })?,
            None => Config::load_or_default(&Config::default_path()),
        };

        let problems = config.validate();
        if !problems.is_empty() {
            let joined: Vec<String> = problems.iter().map(ToString::to_string).collect();
            return Err(IsyncError::InvalidArgument(format!(
                "invalid configuration: {}",
                joined.join("; ")
            )));
        }
        Ok(config)
    }

    /// Repository credential for this run
    ///
    /// `--fdrpass` wins over `--drpass`; without either the configured
    /// service account is used. With `-e` the given password is decrypted
    /// with the `-k` key first.
    pub fn credential(&self, config: &Config) -> Result<Credential, IsyncError> {
        let credential = match (&self.druser, &self.fdrpass, &self.drpass) {
            (Some(user), Some(file), _) => Credential::from_file(user.clone(), file)
                .map_err(|e| IsyncError::InvalidArgument(format!("{e:#}")))?,
            (Some(user), None, Some(pass)) => Credential::new(user.clone(), pass.clone()),
            (None, Some(_), _) | (None, None, Some(_)) => {
                return Err(IsyncError::InvalidArgument(
                    "--druser is required with a password".into(),
                ))
            }
            (_, None, None) => {
                return config.service_credential().ok_or_else(|| {
                    IsyncError::InvalidArgument("no repository credential given".into())
                })
            }
        };
        if !self.encrypted {
            return Ok(credential);
        }

        let password = decrypt_secret(credential.password(), &self.key).map_err(|e| {
            IsyncError::InvalidArgument(format!("fail to decrypt credential: {e:#}"))
        })?;
        Ok(Credential::new(credential.user(), password))
    }

    /// Parsed source and destination
    pub fn locators(&self) -> Result<(Locator, Locator), IsyncError> {
        let parse = |s: &str| {
            Locator::parse(s).map_err(|e| IsyncError::InvalidArgument(e.to_string()))
        };
        Ok((parse(&self.source)?, parse(&self.destination)?))
    }

    /// Engine options: the configured `sync` section with `-p` applied
    pub fn sync_options(&self, config: &Config) -> Result<SyncOptions, IsyncError> {
        if self.workers == 0 {
            return Err(IsyncError::InvalidArgument(
                "number of workers must be positive".into(),
            ));
        }
        Ok(SyncOptions::from(&config.sync).with_workers(self.workers))
    }

    pub fn log_file(&self) -> &Path {
        &self.log
    }
}
