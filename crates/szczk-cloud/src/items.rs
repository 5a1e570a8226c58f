//! Item operations on the Szczk file service
//!
//! Thin translations from object-store verbs to the service's endpoints:
//! - [`list_files`] - children of a folder, mapped to host [`Object`]s
//! - [`get_download_url`] - temporary URL for a file's content
//! - [`rename_item`], [`move_item`], [`delete_item`] - single-call mutations
//!
//! The service never returns paths. Child paths are synthesised from the
//! listed folder's path and each child's name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use szczk_core::domain::errors::DomainError;
use szczk_core::domain::newtypes::{RemoteId, RemotePath};
use szczk_core::ports::Object;
use tokio_util::sync::CancellationToken;

use crate::client::SzczkClient;
use crate::SzczkError;

const LIST_FILES_PATH: &str = "/list_files";
const DOWNLOAD_URL_PATH: &str = "/get_download_url";
const RENAME_PATH: &str = "/rename_item";
const MOVE_PATH: &str = "/move_item";
const DELETE_PATH: &str = "/delete_item";

// ============================================================================
// Wire types
// ============================================================================

/// Response from `GET /list_files`
#[derive(Debug, Deserialize)]
struct ListFilesResponse {
    #[serde(default)]
    files: Vec<RemoteItem>,
}

/// A file or folder as the service describes it
#[derive(Debug, Deserialize)]
struct RemoteItem {
    id: String,
    name: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    is_folder: bool,
    /// RFC 3339; any non-string value reads as absent so one bad entry
    /// cannot fail the listing
    #[serde(default, deserialize_with = "lenient_string")]
    modified_at: Option<String>,
}

/// Response from `GET /get_download_url`
#[derive(Debug, Deserialize)]
struct DownloadUrlResponse {
    url: String,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    item_id: &'a str,
    new_name: &'a str,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    item_id: &'a str,
    destination_folder_id: &'a str,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    item_id: &'a str,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Parses an RFC 3339 timestamp, `None` if absent or malformed
fn parse_modified(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Converts a listed [`RemoteItem`] into a host [`Object`] under `parent`
fn item_to_object(item: RemoteItem, parent: &RemotePath) -> Result<Object, DomainError> {
    let modified = parse_modified(item.modified_at.as_deref());
    if modified.is_none() && item.modified_at.is_some() {
        debug!(item_id = %item.id, "Unparseable modified_at, leaving unset");
    }

    Ok(Object {
        id: RemoteId::new(item.id)?,
        path: parent.join(&item.name)?,
        name: item.name,
        size: item.size,
        is_folder: item.is_folder,
        modified,
    })
}

// ============================================================================
// Operations
// ============================================================================

/// Lists the children of `folder`
///
/// Entries the host cannot represent (empty id, a name containing `/`) are
/// skipped with a warning rather than failing the whole listing.
pub async fn list_files(
    client: &SzczkClient,
    folder: &Object,
    cancel: &CancellationToken,
) -> Result<Vec<Object>, SzczkError> {
    debug!(folder_id = %folder.id, path = %folder.path, "Listing folder");

    let response: ListFilesResponse = client
        .get_json(LIST_FILES_PATH, &[("folder_id", folder.id.as_str())], cancel)
        .await?;

    let mut objects = Vec::with_capacity(response.files.len());
    for item in response.files {
        let item_id = item.id.clone();
        match item_to_object(item, &folder.path) {
            Ok(object) => objects.push(object),
            Err(e) => warn!(item_id = %item_id, error = %e, "Skipping unrepresentable entry"),
        }
    }

    debug!(folder_id = %folder.id, count = objects.len(), "Listed folder");
    Ok(objects)
}

/// Requests a temporary download URL for the file `id`
pub async fn get_download_url(
    client: &SzczkClient,
    id: &RemoteId,
    cancel: &CancellationToken,
) -> Result<String, SzczkError> {
    debug!(item_id = %id, "Requesting download URL");
    let response: DownloadUrlResponse = client
        .get_json(DOWNLOAD_URL_PATH, &[("file_id", id.as_str())], cancel)
        .await?;
    Ok(response.url)
}

/// Renames the item `id` to `new_name`
pub async fn rename_item(
    client: &SzczkClient,
    id: &RemoteId,
    new_name: &str,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    debug!(item_id = %id, new_name, "Renaming item");
    let body = RenameRequest {
        item_id: id.as_str(),
        new_name,
    };
    client.post_json(RENAME_PATH, &body, cancel).await
}

/// Moves the item `id` into the folder `destination`
pub async fn move_item(
    client: &SzczkClient,
    id: &RemoteId,
    destination: &RemoteId,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    debug!(item_id = %id, destination = %destination, "Moving item");
    let body = MoveRequest {
        item_id: id.as_str(),
        destination_folder_id: destination.as_str(),
    };
    client.post_json(MOVE_PATH, &body, cancel).await
}

/// Deletes the item `id`
pub async fn delete_item(
    client: &SzczkClient,
    id: &RemoteId,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    debug!(item_id = %id, "Deleting item");
    client
        .post_json(DELETE_PATH, &DeleteRequest { item_id: id.as_str() }, cancel)
        .await
}
