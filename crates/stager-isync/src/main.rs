//! s-isync - transfer one tree as the invoking user
//!
//! Stdout carries the progress protocol, stderr the final diagnostic, and
//! all tracing output goes to the `-l` log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::error::ErrorKind;
use clap::Parser;
use nix::unistd::{Uid, User};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stager_catalog::{CatalogClient, HttpCatalog};
use stager_core::domain::Progress;
use stager_isync::error::EXIT_INVALID_ARGUMENT;
use stager_isync::{run_transfer, IsyncArgs, IsyncError};
use stager_sync::{ExecutionContext, SyncEngine};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match IsyncArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_INVALID_ARGUMENT),
            };
        }
    };

    init_tracing(&args);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match run(&args, cancel).await {
        Ok(progress) => {
            info!(task = %args.task, ?progress, "transfer completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(task = %args.task, error = %e, "transfer ended with error");
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: &IsyncArgs, cancel: CancellationToken) -> Result<Progress, IsyncError> {
    let config = args.load_config()?;
    let credential = args.credential(&config)?;
    let (src, dst) = args.locators()?;
    let options = args.sync_options(&config)?;

    info!(
        task = %args.task,
        local_user = %current_user(),
        repository_user = %credential.user(),
        "{} --> {}",
        src,
        dst
    );

    let client = CatalogClient::from_config(&config.catalog, credential)
        .map_err(|e| IsyncError::Transfer(e.to_string()))?;
    let ctx = ExecutionContext::new(Arc::new(HttpCatalog::new(client)), options);
    let engine = SyncEngine::new(ctx);

    run_transfer(&engine, &args.task, &src, &dst, std::io::stdout(), cancel).await
}

fn current_user() -> String {
    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Log to the `-l` file, or to stderr when it cannot be opened
fn init_tracing(args: &IsyncArgs) {
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false);

    match open_log(args.log_file()) {
        Ok(file) => builder.with_writer(Mutex::new(file)).init(),
        Err(e) => {
            builder.with_writer(std::io::stderr).init();
            warn!(path = %args.log_file().display(), error = %e, "cannot open log file");
        }
    }
}

fn open_log(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}
