//! Bearer token handling for the remote document store.
//!
//! Tokens are fetched through a pluggable source, cached, and refreshed
//! before expiry with a safety margin so commands never go out with a
//! token about to lapse. Command handlers read the current token under
//! a brief lock; the refresh itself happens outside it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ScannerError;

/// Refresh this long before nominal expiry.
const EXPIRY_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

/// Hard deadline for one token fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Fresh enough to be attached to a new command.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - EXPIRY_MARGIN > now
    }
}

/// Pluggable token fetcher (client-credentials flow in production, a
/// fixed token in tests).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<BearerToken, ScannerError>;
}

/// Caching provider over a [`TokenSource`].
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<BearerToken>>,
}

impl TokenProvider {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
        }
    }

    /// The current token, refreshing when absent or inside the expiry
    /// margin. Fetch failures surface as [`ScannerError::Token`] after
    /// one retry.
    pub async fn token(&self) -> Result<String, ScannerError> {
        let now = Utc::now();

        {
            let guard = self.current.read().await;
            if let Some(token) = guard.as_ref() {
                if token.is_fresh(now) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.current.write().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_with_retry().await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn fetch_with_retry(&self) -> Result<BearerToken, ScannerError> {
        match self.fetch_once().await {
            Ok(token) => Ok(token),
            Err(first) => {
                tracing::warn!(error = %first, "token fetch failed, retrying once");
                self.fetch_once().await
            }
        }
    }

    async fn fetch_once(&self) -> Result<BearerToken, ScannerError> {
        match tokio::time::timeout(FETCH_TIMEOUT, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(ScannerError::Token("token fetch timed out".into())),
        }
    }
}
