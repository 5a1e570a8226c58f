//! Authenticated request executor for the Szczk file service
//!
//! Every file-service call goes through [`SzczkClient::execute`], which
//! attaches the current bearer token, races the request against
//! cancellation, and applies the service's only automatic retry: one token
//! refresh and one retry after a 401/403.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use tokio_util::sync::CancellationToken;
//! # use szczk_cloud::client::SzczkClient;
//!
//! # async fn example(client: &SzczkClient) -> Result<(), szczk_cloud::SzczkError> {
//! let cancel = CancellationToken::new();
//! let response = client
//!     .execute(Method::GET, "/list_files", &cancel, |req| {
//!         req.query(&[("folder_id", "root")])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::TokenManager;
use crate::{until_cancelled, SzczkError};

/// Retries allowed after an authorization rejection
const MAX_AUTH_RETRIES: u32 = 1;

/// HTTP client for file-service calls
///
/// Holds the shared [`TokenManager`] and the adapter's lifecycle token; once
/// the lifecycle token fires every call fails with [`SzczkError::Cancelled`].
pub struct SzczkClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    lifecycle: CancellationToken,
}

impl SzczkClient {
    /// Creates a client for the file service at `base_url`
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        tokens: Arc<TokenManager>,
        lifecycle: CancellationToken,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            lifecycle,
        }
    }

    /// Base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared token manager
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// The adapter's lifecycle token
    pub fn lifecycle(&self) -> &CancellationToken {
        &self.lifecycle
    }

    /// The underlying HTTP client, for requests to absolute URLs
    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Runs `fut` unless `cancel` or the lifecycle token fires first
    pub(crate) async fn guard<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T, SzczkError>
    where
        F: Future<Output = Result<T, SzczkError>>,
    {
        until_cancelled(cancel, &self.lifecycle, fut).await
    }

    /// Executes an authenticated request
    ///
    /// `build` customises the request (query, body) and is applied again if
    /// the request has to be re-issued with a refreshed token.
    ///
    /// # Errors
    /// - [`SzczkError::Transport`] when no response was received
    /// - [`SzczkError::AuthRejected`] when the retry is rejected again
    /// - [`SzczkError::Refresh`] when the refresh itself fails
    /// - [`SzczkError::Remote`] for any other non-2xx status
    /// - [`SzczkError::Cancelled`] when either cancellation scope fires
    pub async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<Response, SzczkError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..=MAX_AUTH_RETRIES {
            let token = self
                .tokens
                .access_token()
                .ok_or_else(|| SzczkError::Authentication {
                    status: None,
                    reason: "adapter is not authenticated".to_string(),
                })?;

            let request = build(self.client.request(method.clone(), &url).bearer_auth(&token));
            debug!(%method, path, attempt, "Sending request");

            let response = self
                .guard(cancel, async { request.send().await.map_err(SzczkError::from) })
                .await?;

            let status = response.status();
            if status.is_success() {
                if attempt > 0 {
                    info!(path, attempt, "Request succeeded after token refresh");
                }
                return Ok(response);
            }

            let body = self
                .guard(cancel, async { Ok(response.text().await.unwrap_or_default()) })
                .await?;

            if !is_auth_rejection(status) {
                debug!(path, status = status.as_u16(), "Request failed");
                return Err(SzczkError::Remote { status, body });
            }

            if attempt >= MAX_AUTH_RETRIES {
                warn!(path, status = status.as_u16(), "Authorization rejected after refresh");
                return Err(SzczkError::AuthRejected { status, body });
            }

            warn!(path, status = status.as_u16(), "Authorization rejected, refreshing token");
            self.guard(cancel, self.tokens.refresh_after_rejection(&token))
                .await?;
        }

        Err(SzczkError::InvalidResponse(format!(
            "retry loop exited unexpectedly for {path}"
        )))
    }

    /// GET `path` with `query`, decoding a JSON body
    pub async fn get_json<T, Q>(
        &self,
        path: &str,
        query: &Q,
        cancel: &CancellationToken,
    ) -> Result<T, SzczkError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .execute(Method::GET, path, cancel, |req| req.query(query))
            .await?;
        self.read_json(response, cancel).await
    }

    /// POST `body` as JSON to `path`, ignoring any response body
    pub async fn post_json<B>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<(), SzczkError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::POST, path, cancel, |req| req.json(body))
            .await?;
        Ok(())
    }

    /// POST `body` as JSON to `path`, decoding a JSON response
    pub async fn post_json_for<T, B>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, SzczkError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .execute(Method::POST, path, cancel, |req| req.json(body))
            .await?;
        self.read_json(response, cancel).await
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        cancel: &CancellationToken,
    ) -> Result<T, SzczkError> {
        let bytes = self
            .guard(cancel, async { response.bytes().await.map_err(SzczkError::from) })
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| SzczkError::InvalidResponse(e.to_string()))
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}
