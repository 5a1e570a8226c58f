//! Szczk CLI - command-line host for the Szczk Cloud storage driver
//!
//! Browses and modifies a Szczk Cloud account through the generic
//! storage-driver interface: listing, metadata, download links, renames,
//! moves, deletes and uploads.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use szczk_core::ports::StorageDriver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    browse::{LinkCommand, LsCommand, StatCommand},
    modify::{MkdirCommand, MvCommand, RenameCommand, RmCommand},
    put::PutCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "szczk", version, about = "Command-line client for Szczk Cloud")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a remote folder
    Ls(LsCommand),
    /// Show metadata for a remote path
    Stat(StatCommand),
    /// Print a download URL for a remote file
    Link(LinkCommand),
    /// Create a remote folder
    Mkdir(MkdirCommand),
    /// Rename a remote object
    Rename(RenameCommand),
    /// Move a remote object into another folder
    Mv(MvCommand),
    /// Delete a remote object
    Rm(RmCommand),
    /// Upload a local file into a remote folder
    Put(PutCommand),
}

impl Commands {
    async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        match self {
            Commands::Ls(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Stat(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Link(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Mkdir(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Rename(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Mv(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Rm(cmd) => cmd.execute(driver, cancel, format).await,
            Commands::Put(cmd) => cmd.execute(driver, cancel, format).await,
        }
    }
}

/// Filter directive for the given verbosity; zero defers to the configured level
fn filter_directive(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Cancels `token` on SIGINT or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
        _ = token.cancelled() => {
            return;
        }
    }

    token.cancel();
}

/// Cancels `lifecycle` and waits for the signal listener to exit
async fn stop_signal_listener(lifecycle: &CancellationToken, signals: JoinHandle<()>) {
    lifecycle.cancel();
    if let Err(e) = signals.await {
        warn!(error = %e, "Signal listener task ended abnormally");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(cli.verbose, &config.logging.level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let lifecycle = CancellationToken::new();
    let signal_token = lifecycle.clone();
    let signals = tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let driver = commands::connect(&config, &lifecycle).await?;
    let result = cli.command.execute(&driver, &lifecycle, format).await;

    if let Err(e) = driver.shutdown().await {
        warn!(error = %e, "Driver shutdown failed");
    }
    stop_signal_listener(&lifecycle, signals).await;

    if let Err(e) = result {
        output::get_formatter(format).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
