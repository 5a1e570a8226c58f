//! Read-only commands: `ls`, `stat` and `link`

use anyhow::{Context, Result};
use clap::Args;
use szczk_core::ports::StorageDriver;
use tokio_util::sync::CancellationToken;

use crate::output::{format_bytes, get_formatter, object_row, OutputFormat};

use super::resolve;

/// List a folder's contents
#[derive(Debug, Args)]
pub struct LsCommand {
    /// Remote folder path
    #[arg(default_value = "/")]
    pub path: String,
}

impl LsCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let target = resolve(driver, &self.path, cancel).await?;

        // a file lists as itself
        let objects = if target.is_folder {
            driver
                .list(Some(&target), cancel)
                .await
                .with_context(|| format!("Failed to list {}", self.path))?
        } else {
            vec![target]
        };

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&objects)?);
            return Ok(());
        }

        for object in &objects {
            println!("{}", object_row(object));
        }
        formatter.info(&format!("{} item(s)", objects.len()));
        Ok(())
    }
}

/// Show an object's metadata
#[derive(Debug, Args)]
pub struct StatCommand {
    /// Remote path
    pub path: String,
}

impl StatCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let object = resolve(driver, &self.path, cancel).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&object)?);
            return Ok(());
        }

        formatter.success(object.path.as_str());
        formatter.info(&format!("ID:       {}", object.id));
        formatter.info(&format!(
            "Type:     {}",
            if object.is_folder { "folder" } else { "file" }
        ));
        if !object.is_folder {
            formatter.info(&format!(
                "Size:     {}",
                format_bytes(u64::try_from(object.size).unwrap_or(0))
            ));
        }
        if let Some(modified) = object.modified {
            formatter.info(&format!("Modified: {}", modified.to_rfc3339()));
        }
        Ok(())
    }
}

/// Print a temporary download URL for a file
#[derive(Debug, Args)]
pub struct LinkCommand {
    /// Remote file path
    pub path: String,
}

impl LinkCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let object = resolve(driver, &self.path, cancel).await?;
        let link = driver
            .link(&object, cancel)
            .await
            .with_context(|| format!("Failed to get a link for {}", self.path))?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&link)?);
        } else {
            println!("{}", link.url);
        }
        Ok(())
    }
}
