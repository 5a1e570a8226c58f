//! Szczk Cloud - storage adapter for the Szczk file service
//!
//! Presents the service's identifier-based REST API as a path-addressed
//! object store implementing [`szczk_core::ports::StorageDriver`].
//!
//! ## Modules
//!
//! - [`auth`] - Credential exchange, token refresh and the shared token cell
//! - [`scheduler`] - Background task that refreshes the token before expiry
//! - [`client`] - Authenticated request executor with one refresh-and-retry
//! - [`items`] - Listing, download links, rename, move and delete
//! - [`resolve`] - Path to object resolution by listing parents
//! - [`upload`] - Three-phase upload (negotiate, transfer, finalize)
//! - [`driver`] - [`SzczkDriver`](driver::SzczkDriver), the port implementation

pub mod auth;
pub mod client;
pub mod driver;
pub mod items;
pub mod resolve;
pub mod scheduler;
pub mod upload;

use std::fmt;
use std::future::Future;

use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use driver::SzczkDriver;

/// Errors that can occur when communicating with the Szczk service
#[derive(Debug, Error)]
pub enum SzczkError {
    /// Initial credential exchange failed
    #[error("Authentication failed: {}", describe(status, reason))]
    Authentication {
        /// HTTP status, if a response was received
        status: Option<StatusCode>,
        /// Response body or parse failure
        reason: String,
    },

    /// Token renewal failed
    #[error("Token refresh failed: {}", describe(status, reason))]
    Refresh {
        /// HTTP status, if a response was received
        status: Option<StatusCode>,
        /// Response body or parse failure
        reason: String,
    },

    /// No response was received
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response other than an authorization rejection
    #[error("Remote error {status}: {body}")]
    Remote {
        /// HTTP status
        status: StatusCode,
        /// Response body
        body: String,
    },

    /// Authorization still rejected after one refresh and retry
    #[error("Authorization rejected after token refresh ({status}): {body}")]
    AuthRejected {
        /// HTTP status of the second rejection
        status: StatusCode,
        /// Response body
        body: String,
    },

    /// 2xx response whose body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// One phase of the upload protocol failed
    #[error("Upload {phase} failed: {source}")]
    Upload {
        /// Phase that failed
        phase: UploadPhase,
        /// Underlying failure
        #[source]
        source: Box<SzczkError>,
    },

    /// The caller's or the adapter's cancellation scope fired
    #[error("Operation cancelled")]
    Cancelled,
}

impl SzczkError {
    /// Whether this error (or the upload failure it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Upload { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

fn describe(status: &Option<StatusCode>, reason: &str) -> String {
    match status {
        Some(status) => format!("status {status}: {reason}"),
        None => reason.to_string(),
    }
}

/// The three sequential phases of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Session setup (`/first_upload`)
    Negotiate,
    /// Byte transfer to the negotiated URL
    Transfer,
    /// Completion confirmation (`/ok_upload`)
    Finalize,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Negotiate => "negotiate",
            Self::Transfer => "transfer",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Races `fut` against two cancellation scopes
///
/// Used with the caller's token and the adapter's lifecycle token so an
/// in-flight call aborts when either fires.
pub(crate) async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    lifecycle: &CancellationToken,
    fut: F,
) -> Result<T, SzczkError>
where
    F: Future<Output = Result<T, SzczkError>>,
{
    if cancel.is_cancelled() || lifecycle.is_cancelled() {
        return Err(SzczkError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SzczkError::Cancelled),
        _ = lifecycle.cancelled() => Err(SzczkError::Cancelled),
        result = fut => result,
    }
}
