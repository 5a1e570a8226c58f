//! Upload protocol for the Szczk file service
//!
//! An upload is three strictly sequential phases:
//! 1. [`negotiate`] - `POST /first_upload` returns an upload URL and token
//! 2. [`transfer`] - the file is streamed as multipart field `file` to that URL
//! 3. [`finalize`] - `POST /ok_upload` confirms the upload token
//!
//! The upload is durable only once finalize succeeds. A failed transfer
//! leaves the negotiated session unconfirmed; the service has no abort
//! endpoint, so nothing else is sent.

use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use szczk_core::domain::newtypes::RemoteId;
use szczk_core::ports::{FileStream, ProgressFn};

use crate::client::SzczkClient;
use crate::{SzczkError, UploadPhase};

const FIRST_UPLOAD_PATH: &str = "/first_upload";
const OK_UPLOAD_PATH: &str = "/ok_upload";

/// Multipart field carrying the file bytes
const FILE_FIELD: &str = "file";

#[derive(Serialize)]
struct FirstUploadRequest<'a> {
    parent_folder_id: &'a str,
    file_name: &'a str,
    file_size: u64,
}

#[derive(Serialize)]
struct OkUploadRequest<'a> {
    upload_token: &'a str,
}

/// Per-upload state returned by [`negotiate`]
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSession {
    /// Where the bytes are sent
    pub upload_url: String,
    /// Confirms the upload in [`finalize`]
    pub upload_token: String,
}

fn in_phase(phase: UploadPhase) -> impl FnOnce(SzczkError) -> SzczkError {
    move |source| SzczkError::Upload {
        phase,
        source: Box::new(source),
    }
}

/// Opens an upload session for `file_name` in the folder `parent`
pub async fn negotiate(
    client: &SzczkClient,
    parent: &RemoteId,
    file_name: &str,
    file_size: u64,
    cancel: &CancellationToken,
) -> Result<UploadSession, SzczkError> {
    debug!(parent = %parent, file_name, file_size, "Negotiating upload");
    let request = FirstUploadRequest {
        parent_folder_id: parent.as_str(),
        file_name,
        file_size,
    };
    client
        .post_json_for(FIRST_UPLOAD_PATH, &request, cancel)
        .await
        .map_err(in_phase(UploadPhase::Negotiate))
}

/// Streams `file` to the session's upload URL
///
/// The upload URL carries its own authorization, so no bearer token is
/// attached and an authorization failure here is not retried.
pub async fn transfer(
    client: &SzczkClient,
    session: &UploadSession,
    file: FileStream,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    let name = file.name().to_string();
    let size = file.size();
    debug!(file_name = %name, size, "Transferring upload");

    let body = Body::wrap_stream(ReaderStream::new(file.into_reader()));
    let part = Part::stream_with_length(body, size).file_name(name);
    let form = Form::new().part(FILE_FIELD, part);

    let request = client
        .http_client()
        .post(&session.upload_url)
        .multipart(form);

    let result = client
        .guard(cancel, async {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(SzczkError::Remote { status, body })
        })
        .await;

    result.map_err(in_phase(UploadPhase::Transfer))
}

/// Confirms the session's upload token
pub async fn finalize(
    client: &SzczkClient,
    session: &UploadSession,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    debug!("Finalizing upload");
    let request = OkUploadRequest {
        upload_token: &session.upload_token,
    };
    client
        .post_json(OK_UPLOAD_PATH, &request, cancel)
        .await
        .map_err(in_phase(UploadPhase::Finalize))
}

/// Runs all three phases for `file` into the folder `parent`
///
/// `progress` is called once with `(size, size)` after finalize succeeds.
pub async fn put_file(
    client: &SzczkClient,
    parent: &RemoteId,
    file: FileStream,
    progress: Option<ProgressFn>,
    cancel: &CancellationToken,
) -> Result<(), SzczkError> {
    let name = file.name().to_string();
    let size = file.size();

    let session = negotiate(client, parent, &name, size, cancel).await?;
    transfer(client, &session, file, cancel).await?;
    finalize(client, &session, cancel).await?;

    if let Some(cb) = progress {
        cb(size, size);
    }

    info!(parent = %parent, file_name = %name, size, "Upload completed");
    Ok(())
}
