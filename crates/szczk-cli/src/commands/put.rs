//! `put` command - upload a local file into a remote folder

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use szczk_core::ports::{FileStream, ProgressFn, StorageDriver};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::{format_bytes, get_formatter, OutputFormat};

use super::resolve_folder;

/// Upload a local file
#[derive(Debug, Args)]
pub struct PutCommand {
    /// Local file to upload
    pub local_file: PathBuf,
    /// Remote destination folder
    pub dest_dir: String,
}

impl PutCommand {
    pub async fn execute(
        &self,
        driver: &dyn StorageDriver,
        cancel: &CancellationToken,
        format: OutputFormat,
    ) -> Result<()> {
        let file = FileStream::open(&self.local_file)
            .await
            .with_context(|| format!("Cannot open {}", self.local_file.display()))?;
        let name = file.name().to_string();
        let size = file.size();

        let destination = resolve_folder(driver, &self.dest_dir, cancel).await?;
        info!(file = %self.local_file.display(), dest = %self.dest_dir, size, "Uploading");

        let progress: ProgressFn = Box::new(move |done, total| {
            get_formatter(format).info(&format!("{} / {}", format_bytes(done), format_bytes(total)));
        });

        driver
            .put(&destination, file, Some(progress), cancel)
            .await
            .with_context(|| format!("Failed to upload {}", self.local_file.display()))?;

        let formatter = get_formatter(format);
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "name": name,
                "size": size,
                "destination": self.dest_dir,
            }));
        } else {
            formatter.success(&format!(
                "Uploaded {} ({}) to {}",
                name,
                format_bytes(size),
                self.dest_dir
            ));
        }
        Ok(())
    }
}
