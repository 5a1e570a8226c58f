//! Token lifecycle for the Szczk service
//!
//! The service issues a short-lived access token in exchange for an API
//! key/secret pair, plus a refresh token that renews it without resubmitting
//! the secret.
//!
//! ## Components
//!
//! - [`TokenState`] - The access/refresh/expiry triple, replaced atomically
//! - [`TokenProvider`] - The two credential exchanges (authenticate, refresh)
//! - [`HttpTokenProvider`] - [`TokenProvider`] against the auth service
//! - [`TokenManager`] - Owns the state cell and serialises every renewal

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::SzczkError;

// ============================================================================
// TokenState / TokenGrant
// ============================================================================

/// Current credentials and the instant the access token stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Instant,
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of a successful credential exchange
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` when the service kept the previous refresh token
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token_rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TokenProvider
// ============================================================================

/// The two credential exchanges the service offers
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchanges the API key/secret for a fresh token pair
    async fn authenticate(&self) -> Result<TokenGrant, SzczkError>;

    /// Renews the access token using the refresh token
    async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenGrant, SzczkError>;
}

// ============================================================================
// HttpTokenProvider
// ============================================================================

/// Response from `GET /authenticate`
#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

/// Response from `POST /refresh_token`
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// [`TokenProvider`] talking to the auth service over HTTP
pub struct HttpTokenProvider {
    client: Client,
    auth_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpTokenProvider {
    /// Creates a provider for the auth service at `auth_url`
    pub fn new(
        client: Client,
        auth_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        let auth_url: String = auth_url.into();
        Self {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn authenticate(&self) -> Result<TokenGrant, SzczkError> {
        let url = format!("{}/authenticate", self.auth_url);
        debug!("Requesting access token from auth service");

        let fail = |status: Option<StatusCode>, reason: String| SzczkError::Authentication {
            status,
            reason,
        };

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", &self.api_key), ("api_secret", &self.api_secret)])
            .send()
            .await
            .map_err(|e| fail(None, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| fail(Some(status), format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(fail(Some(status), body));
        }

        let parsed: AuthenticateResponse = serde_json::from_str(&body)
            .map_err(|e| fail(Some(status), format!("malformed response: {e}")))?;

        Ok(TokenGrant {
            access_token: parsed.access_token,
            refresh_token: Some(parsed.refresh_token),
            expires_in: Duration::from_secs(parsed.expires_in),
        })
    }

    async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenGrant, SzczkError> {
        let url = format!("{}/refresh_token", self.auth_url);
        debug!("Refreshing access token");

        let fail = |status: Option<StatusCode>, reason: String| SzczkError::Refresh {
            status,
            reason,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| fail(None, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| fail(Some(status), format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(fail(Some(status), body));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| fail(Some(status), format!("malformed response: {e}")))?;

        Ok(TokenGrant {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: Duration::from_secs(parsed.expires_in),
        })
    }
}

// ============================================================================
// TokenManager
// ============================================================================

/// Shared owner of the [`TokenState`]
///
/// Readers take a copy of the state under a short read lock. Writers run the
/// network exchange first and then swap the whole triple in one assignment,
/// so nobody observes a half-written token/expiry pair and the lock is never
/// held across a request.
///
/// Every exchange additionally runs under `renewal`, an async mutex that
/// makes refreshes single-flight: callers that were rejected with the same
/// stale token wait for the first refresh and then reuse its result.
pub struct TokenManager {
    provider: Arc<dyn TokenProvider>,
    state: RwLock<Option<TokenState>>,
    renewal: Mutex<()>,
}

impl TokenManager {
    /// Creates a manager with no token yet
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            state: RwLock::new(None),
            renewal: Mutex::new(()),
        }
    }

    /// Copy of the current state, `None` before the first authentication
    pub fn current(&self) -> Option<TokenState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current access token
    pub fn access_token(&self) -> Option<String> {
        self.current().map(|s| s.access_token)
    }

    /// Expiry of the current access token
    pub fn expires_at(&self) -> Option<Instant> {
        self.current().map(|s| s.expires_at)
    }

    /// Performs the full credential exchange, replacing the whole state
    pub async fn authenticate(&self) -> Result<(), SzczkError> {
        let _guard = self.renewal.lock().await;
        self.authenticate_locked().await
    }

    /// Renews the access token with the refresh token
    pub async fn refresh(&self) -> Result<(), SzczkError> {
        let _guard = self.renewal.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes after the service rejected `rejected_token`
    ///
    /// If another caller already rotated the token in the meantime the
    /// refresh is skipped and the caller simply retries with the new token.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<(), SzczkError> {
        let _guard = self.renewal.lock().await;
        if self.access_token().as_deref() != Some(rejected_token) {
            debug!("Token already rotated by a concurrent refresh");
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Scheduled renewal: refresh, falling back to full authentication
    pub async fn renew(&self) -> Result<(), SzczkError> {
        let _guard = self.renewal.lock().await;
        match self.refresh_locked().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, re-authenticating");
                self.authenticate_locked().await
            }
        }
    }

    async fn authenticate_locked(&self) -> Result<(), SzczkError> {
        let grant = self.provider.authenticate().await?;
        let Some(refresh_token) = grant.refresh_token else {
            return Err(SzczkError::Authentication {
                status: None,
                reason: "response carried no refresh token".to_string(),
            });
        };

        let expires_in = grant.expires_in;
        let expires_at =
            expiry_after(expires_in).ok_or_else(|| SzczkError::Authentication {
                status: None,
                reason: EXPIRY_OUT_OF_RANGE.to_string(),
            })?;
        self.store(TokenState {
            access_token: grant.access_token,
            refresh_token,
            expires_at,
        });
        info!(expires_in_secs = expires_in.as_secs(), "Authenticated with auth service");
        Ok(())
    }

    async fn refresh_locked(&self) -> Result<(), SzczkError> {
        let Some(current) = self.current() else {
            return Err(SzczkError::Refresh {
                status: None,
                reason: "no token to refresh".to_string(),
            });
        };

        let grant = self
            .provider
            .refresh(&current.access_token, &current.refresh_token)
            .await?;

        let expires_in = grant.expires_in;
        let expires_at = expiry_after(expires_in).ok_or_else(|| SzczkError::Refresh {
            status: None,
            reason: EXPIRY_OUT_OF_RANGE.to_string(),
        })?;
        self.store(TokenState {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(current.refresh_token),
            expires_at,
        });
        info!(expires_in_secs = expires_in.as_secs(), "Access token refreshed");
        Ok(())
    }

    fn store(&self, state: TokenState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }
}

const EXPIRY_OUT_OF_RANGE: &str = "expires_in out of range";

/// Instant `expires_in` from now, `None` if the clock cannot represent it
fn expiry_after(expires_in: Duration) -> Option<Instant> {
    Instant::now().checked_add(expires_in)
}
