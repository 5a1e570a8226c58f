//! Subcommands and the plumbing they share
//!
//! Every command receives an initialised driver and the process-wide
//! cancellation token; `main` owns driver setup and teardown.

pub mod browse;
pub mod modify;
pub mod put;

use std::path::Path;

use anyhow::{Context, Result};
use szczk_cloud::SzczkDriver;
use szczk_core::config::Config;
use szczk_core::domain::newtypes::RemotePath;
use szczk_core::ports::{Object, StorageDriver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Loads the configuration from `path`, or from the default location
///
/// An explicitly named file must exist; a missing default file is reported
/// with the path the user should create.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let default_path = Config::default_path();
    let path = path.unwrap_or(&default_path);
    debug!(config_path = %path.display(), "Loading configuration");

    Config::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Validates `config` and initialises the driver under `lifecycle`
pub async fn connect(config: &Config, lifecycle: &CancellationToken) -> Result<SzczkDriver> {
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration: {}", messages.join("; "));
    }

    let driver = SzczkDriver::init(&config.driver, lifecycle)
        .await
        .context("Failed to initialise the Szczk driver")?;
    info!("Connected to Szczk Cloud");
    Ok(driver)
}

/// Parses a host path argument
pub fn parse_remote_path(raw: &str) -> Result<RemotePath> {
    RemotePath::new(raw.to_string()).with_context(|| format!("Invalid remote path '{raw}'"))
}

/// Resolves a path argument to an object
pub async fn resolve(
    driver: &dyn StorageDriver,
    raw: &str,
    cancel: &CancellationToken,
) -> Result<Object> {
    let path = parse_remote_path(raw)?;
    driver
        .get(&path, cancel)
        .await
        .with_context(|| format!("Cannot resolve {raw}"))
}

/// Resolves a path argument that must name a folder
pub async fn resolve_folder(
    driver: &dyn StorageDriver,
    raw: &str,
    cancel: &CancellationToken,
) -> Result<Object> {
    let object = resolve(driver, raw, cancel).await?;
    if !object.is_folder {
        anyhow::bail!("{raw} is not a folder");
    }
    Ok(object)
}
