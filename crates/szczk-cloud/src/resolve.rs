//! Path resolution
//!
//! The service addresses objects only by identifier, so a host path is
//! resolved by walking it from the root: each segment is looked up by
//! listing the folder resolved for the previous segment. A path of depth `n`
//! costs `n` listings. Nothing is cached.

use szczk_core::domain::newtypes::RemotePath;
use szczk_core::ports::Object;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::SzczkClient;
use crate::items;
use crate::SzczkError;

/// Finds the child whose name is exactly `name` (case-sensitive)
pub fn find_child<'a>(children: &'a [Object], name: &str) -> Option<&'a Object> {
    children.iter().find(|child| child.name == name)
}

/// Resolves `path` starting from `root`
///
/// Returns `Ok(None)` when a segment has no matching child, or when an
/// intermediate segment names a file.
pub async fn resolve_path(
    client: &SzczkClient,
    root: &Object,
    path: &RemotePath,
    cancel: &CancellationToken,
) -> Result<Option<Object>, SzczkError> {
    let mut current = root.clone();

    for segment in path.segments() {
        if !current.is_folder {
            debug!(path = %path, at = %current.path, "Intermediate segment is not a folder");
            return Ok(None);
        }

        let children = items::list_files(client, &current, cancel).await?;
        match find_child(&children, segment) {
            Some(child) => current = child.clone(),
            None => {
                debug!(path = %path, missing = segment, "Path segment not found");
                return Ok(None);
            }
        }
    }

    Ok(Some(current))
}
