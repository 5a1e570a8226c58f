//! Mutating commands: `mkdir`, `rename`, `mv` and `rm`

use anyhow::{Context, Result};
use clap::Args;
use szczk_core::ports::StorageDriver;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

use super::{resolve, resolve_folder};

/// Create a folder
#[derive(Debug, Args)]
pub struct MkdirCommand {
    /// Remote parent folder
    pub parent: String,
    /// Name of the new folder
    pub name: String,
}

impl MkdirCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let parent = resolve_folder(driver, &self.parent, cancel).await?;
        let created = driver
            .make_dir(&parent, &self.name, cancel)
            .await
            .with_context(|| format!("Cannot create {} in {}", self.name, self.parent))?;

        let formatter = get_formatter(format);
        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&created)?);
        } else {
            formatter.success(&format!("Created {}", created.path));
        }
        Ok(())
    }
}

/// Rename an object in place
#[derive(Debug, Args)]
pub struct RenameCommand {
    /// Remote path of the object
    pub path: String,
    /// New name (a single path segment)
    pub new_name: String,
}

impl RenameCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let object = resolve(driver, &self.path, cancel).await?;
        info!(path = %self.path, new_name = %self.new_name, "Renaming");
        driver
            .rename(&object, &self.new_name, cancel)
            .await
            .with_context(|| format!("Failed to rename {}", self.path))?;

        get_formatter(format).success(&format!("Renamed {} to {}", self.path, self.new_name));
        Ok(())
    }
}

/// Move an object into another folder
#[derive(Debug, Args)]
pub struct MvCommand {
    /// Remote path of the object
    pub path: String,
    /// Remote destination folder
    pub dest_dir: String,
}

impl MvCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let object = resolve(driver, &self.path, cancel).await?;
        let destination = resolve_folder(driver, &self.dest_dir, cancel).await?;
        info!(path = %self.path, dest = %self.dest_dir, "Moving");
        driver
            .move_item(&object, &destination, cancel)
            .await
            .with_context(|| format!("Failed to move {}", self.path))?;

        get_formatter(format).success(&format!("Moved {} to {}", self.path, self.dest_dir));
        Ok(())
    }
}

/// Delete an object
#[derive(Debug, Args)]
pub struct RmCommand {
    /// Remote path of the object
    pub path: String,
}

impl RmCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let object = resolve(driver, &self.path, cancel).await?;
        if object.path.is_root() {
            anyhow::bail!("Refusing to delete the root folder");
        }
        info!(path = %self.path, "Deleting");
        driver
            .remove(&object, cancel)
            .await
            .with_context(|| format!("Failed to delete {}", self.path))?;

        get_formatter(format).success(&format!("Deleted {}", self.path));
        Ok(())
    }
}
