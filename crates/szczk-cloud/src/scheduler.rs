//! Token scheduler - keeps the access token fresh in the background
//!
//! A single long-lived task sleeps until shortly before the current token
//! expires, renews it through [`TokenManager::renew`] and rearms from the new
//! expiry. It exits only when its lifecycle [`CancellationToken`] fires.
//!
//! ```text
//! expires_at - now - REFRESH_MARGIN ──→ sleep ──→ refresh ─┬─→ rearm
//!                                        ▲                 └─→ authenticate ──→ rearm
//!                                        └── cancel ──→ exit
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::auth::TokenManager;

/// How long before expiry the token is renewed
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Floor for the wait, so a token at or past expiry cannot cause a tight loop
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Time to wait before the next renewal of a token expiring at `expires_at`
pub fn next_refresh_delay(expires_at: Instant, now: Instant) -> Duration {
    let remaining = expires_at.saturating_duration_since(now);
    match remaining.checked_sub(REFRESH_MARGIN) {
        Some(delay) if !delay.is_zero() => delay,
        _ => MIN_REFRESH_INTERVAL,
    }
}

/// Background renewal loop over a shared [`TokenManager`]
pub struct TokenScheduler {
    tokens: Arc<TokenManager>,
    cancel: CancellationToken,
}

impl TokenScheduler {
    pub fn new(tokens: Arc<TokenManager>, cancel: CancellationToken) -> Self {
        Self { tokens, cancel }
    }

    /// Spawns [`run`](Self::run) onto the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until the cancellation token fires
    ///
    /// A failed renewal is logged and retried on the next cycle; the expiry
    /// is unchanged in that case, so the clamp schedules the retry one
    /// [`MIN_REFRESH_INTERVAL`] later once the token is close to expiry.
    pub async fn run(self) {
        info!("Token scheduler started");

        loop {
            let delay = match self.tokens.expires_at() {
                Some(expires_at) => next_refresh_delay(expires_at, Instant::now()),
                None => MIN_REFRESH_INTERVAL,
            };
            debug!(delay_secs = delay.as_secs(), "Next token renewal scheduled");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.tokens.renew() => {
                    if let Err(e) = result {
                        error!(error = %e, "Token renewal and re-authentication failed");
                    }
                }
            }
        }

        info!("Token scheduler stopped");
    }
}
