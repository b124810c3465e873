//! Bearer token lifecycle
//!
//! The cached token sits behind an async mutex that stays locked for the whole
//! acquisition, so concurrent callers wait on the in-flight request instead of
//! starting their own.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{TokenRequest, TokenResponse};

/// Where the cached token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Issued by the catalog's token endpoint
    Acquired,
    /// The configured secondary token
    Fallback,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    acquired_at: Instant,
    source: TokenSource,
}

impl CachedToken {
    fn new(value: String, source: TokenSource) -> Self {
        Self {
            value,
            acquired_at: Instant::now(),
            source,
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.acquired_at.elapsed() < ttl
    }
}

/// Shared token cache with single-flight acquisition
pub(crate) struct TokenManager {
    http_client: Client,
    token_url: String,
    username: String,
    password: String,
    fallback: Option<String>,
    ttl: Duration,
    timeout: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("has_fallback", &self.fallback.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenManager {
    pub fn new(
        http_client: Client,
        token_url: String,
        username: String,
        password: String,
        fallback: Option<String>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            token_url,
            username,
            password,
            fallback,
            ttl,
            timeout,
            cached: Mutex::new(None),
        }
    }

    /// Return a usable token, acquiring one if the cache is empty or stale
    pub async fn token(&self) -> CatalogResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(self.ttl) {
                return Ok(token.value.clone());
            }
            debug!(source = ?token.source, "Catalog token expired");
        }

        let fresh = self.acquire().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Discard the cached token if it is still the one that was rejected
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.value == rejected) {
            debug!("Invalidating rejected catalog token");
            *cached = None;
        }
    }

    /// Source of the currently cached token, if any
    pub async fn current_source(&self) -> Option<TokenSource> {
        self.cached.lock().await.as_ref().map(|t| t.source)
    }

    async fn acquire(&self) -> CatalogResult<CachedToken> {
        match self.request_token().await {
            Ok(value) => {
                info!("Acquired catalog token");
                Ok(CachedToken::new(value, TokenSource::Acquired))
            }
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    warn!(error = %e, "Catalog token acquisition failed, using fallback token");
                    Ok(CachedToken::new(fallback.clone(), TokenSource::Fallback))
                }
                None => {
                    warn!(error = %e, "Catalog token acquisition failed, no fallback configured");
                    Err(CatalogError::TokenUnavailable(e.to_string()))
                }
            },
        }
    }

    async fn request_token(&self) -> CatalogResult<String> {
        let response = self
            .http_client
            .post(&self.token_url)
            .timeout(self.timeout)
            .json(&TokenRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(CatalogError::from_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(CatalogError::from_transport)?;
        if !status.is_success() {
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: TokenResponse = serde_json::from_str(&text)?;
        if body.token.trim().is_empty() {
            return Err(CatalogError::InvalidInput(
                "token endpoint returned an empty token".to_string(),
            ));
        }
        Ok(body.token)
    }
}
