//! Storage driver port (driving side of the adapter)
//!
//! This module defines the contract the host requires from a storage backend:
//! list a container, resolve a path, obtain a download link, create, rename,
//! move and delete objects, upload a file with progress, and tear down.
//!
//! ## Design Notes
//!
//! - Every operation receives the caller's [`CancellationToken`] and must abort
//!   promptly when it fires rather than hang on the network.
//! - Errors are classified into [`DriverError`] so the host can tell "no such
//!   object" and "capability missing" apart from wrapped backend failures.
//! - [`Object`] is the host's object model. Backends synthesise its `path`;
//!   they are free to address objects internally by [`RemoteId`] only.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainError;
use crate::domain::newtypes::{RemoteId, RemotePath};

/// Boxed error carried by [`DriverError::Backend`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Upload progress callback, called with `(bytes_done, total_bytes)`
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

// ============================================================================
// DriverError
// ============================================================================

/// Classified failure of a driver operation
#[derive(Debug, Error)]
pub enum DriverError {
    /// Path resolution found no object with that name
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A file-only operation was attempted on a folder
    #[error("Not a file: {0}")]
    NotAFile(String),

    /// The backend has no way to perform this operation
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// Caller supplied a name or path that fails validation
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DomainError),

    /// The caller's or the driver's cancellation scope fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport or remote failure, with the operation and its target
    #[error("{op} failed for {target}")]
    Backend {
        /// Operation name, e.g. `"rename"`
        op: &'static str,
        /// Identifier or path the operation was aimed at
        target: String,
        /// The backend's own error
        #[source]
        source: BoxError,
    },
}

impl DriverError {
    /// Wraps a backend error with the operation name and target
    pub fn backend(
        op: &'static str,
        target: impl fmt::Display,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Backend {
            op,
            target: target.to_string(),
            source: source.into(),
        }
    }
}

// ============================================================================
// Object / Link
// ============================================================================

/// A file or folder as presented to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    /// Backend identifier used for every remote call on this object
    pub id: RemoteId,
    /// Name within the parent folder (empty for the root)
    pub name: String,
    /// Host path, synthesised from the parent's path and `name`
    pub path: RemotePath,
    /// Size in bytes (0 for folders)
    pub size: i64,
    /// Whether this object is a folder
    pub is_folder: bool,
    /// Last modification time, if the backend reported a parseable one
    pub modified: Option<DateTime<Utc>>,
}

impl Object {
    /// The root container, addressed by `id`
    #[must_use]
    pub fn root(id: RemoteId) -> Self {
        Self {
            id,
            name: String::new(),
            path: RemotePath::root(),
            size: 0,
            is_folder: true,
            modified: None,
        }
    }
}

/// A fetchable URL for a file's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Signed or temporary download URL
    pub url: String,
    /// Content length, when known from the object's metadata
    pub content_length: Option<u64>,
}

// ============================================================================
// FileStream
// ============================================================================

/// File content handed to [`StorageDriver::put`]
///
/// The size is declared up front because the upload protocol negotiates it
/// before any byte is sent.
pub struct FileStream {
    name: String,
    size: u64,
    reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
}

impl FileStream {
    /// Wraps an arbitrary reader of exactly `size` bytes
    pub fn new(
        name: impl Into<String>,
        size: u64,
        reader: impl AsyncRead + Send + Sync + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            reader: Box::new(reader),
        }
    }

    /// In-memory content
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self::new(name, size, std::io::Cursor::new(data))
    }

    /// Opens a local file, taking its name and size from the filesystem
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path has no file name: {}", path.display()),
                )
            })?;
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self::new(name, size, file))
    }

    /// File name to create in the destination folder
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consumes the stream, yielding its reader
    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Sync + Unpin> {
        self.reader
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DriverInfo
// ============================================================================

/// Static description of a driver, consumed by the host's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    /// Registry key
    pub name: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
    /// Whether the host should sort listings itself
    pub local_sort: bool,
    /// Whether the host must bypass its listing cache for this driver
    pub no_cache: bool,
    /// Whether the host keeps the listed metadata of an object across
    /// operations instead of re-resolving it
    pub keep_file_info: bool,
    /// Path the host mounts the driver's root at
    pub default_root: &'static str,
}

// ============================================================================
// StorageDriver trait
// ============================================================================

/// Port trait for storage backend operations
///
/// ## Implementation Notes
///
/// - Implementations own their credentials and refresh them transparently;
///   callers never see token handling.
/// - Only the retries a backend documents are automatic. Everything else is
///   surfaced immediately so the host decides whether to retry.
/// - After [`shutdown`](StorageDriver::shutdown) every operation fails with
///   [`DriverError::Cancelled`].
#[async_trait::async_trait]
pub trait StorageDriver: Send + Sync {
    /// Static metadata about this driver
    fn info(&self) -> DriverInfo;

    /// Lists the children of `dir` (the root container when `None`)
    async fn list(
        &self,
        dir: Option<&Object>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Object>, DriverError>;

    /// Resolves a host path to an object
    ///
    /// # Errors
    /// [`DriverError::NotFound`] when any segment of the path does not exist
    async fn get(&self, path: &RemotePath, cancel: &CancellationToken)
        -> Result<Object, DriverError>;

    /// Obtains a fetchable link for a file
    ///
    /// # Errors
    /// [`DriverError::NotAFile`] when `file` is a folder
    async fn link(&self, file: &Object, cancel: &CancellationToken) -> Result<Link, DriverError>;

    /// Creates a folder named `name` inside `parent`
    async fn make_dir(
        &self,
        parent: &Object,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Object, DriverError>;

    /// Renames `obj` in place
    async fn rename(
        &self,
        obj: &Object,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;

    /// Moves `obj` into the folder `dst_dir`
    async fn move_item(
        &self,
        obj: &Object,
        dst_dir: &Object,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;

    /// Deletes `obj`
    async fn remove(&self, obj: &Object, cancel: &CancellationToken) -> Result<(), DriverError>;

    /// Uploads `file` into the folder `dst_dir`
    ///
    /// `progress` receives `(bytes_done, total_bytes)`; the upload counts as
    /// complete only once `(total, total)` has been reported.
    async fn put(
        &self,
        dst_dir: &Object,
        file: FileStream,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;

    /// Stops background work and invalidates the driver
    async fn shutdown(&self) -> Result<(), DriverError>;
}
