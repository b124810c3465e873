//! Catalog API client implementation

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use encore_shared_config::CatalogConfig;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::matching::{candidate_matches, dedup_by_isrc, select_candidate, MatchDecision};
use crate::models::{CandidateRecord, RecordingQuery, SearchFields, SearchRequest, SearchResponse};
use crate::strategy::SearchStrategy;
use crate::token::{TokenManager, TokenSource};

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Result window for identifier lookups
const LOOKUP_RESULT_LIMIT: u32 = 10;

/// Maximum title length accepted for a search
const MAX_TITLE_LENGTH: usize = 512;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Longest error body kept in [`CatalogError::Api`]
const MAX_ERROR_BODY: usize = 512;

/// Result of resolving one recording against the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Strategy whose candidates were used, `None` when nothing matched
    pub strategy: Option<SearchStrategy>,
    /// Filtered, de-duplicated candidates from that strategy
    pub candidates: Vec<CandidateRecord>,
    /// Which candidate (if any) was accepted
    pub decision: MatchDecision,
    /// Number of search requests issued
    pub requests: u32,
}

impl Resolution {
    pub fn isrc(&self) -> Option<&str> {
        self.decision.isrc()
    }
}

/// Client for the external metadata catalog
///
/// Clones share one token cache.
#[derive(Clone)]
pub struct CatalogClient {
    http_client: Client,
    config: CatalogConfig,
    tokens: Arc<TokenManager>,
    request_delay: Duration,
    max_retries: u32,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("config", &self.config)
            .field("request_delay", &self.request_delay)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl CatalogClient {
    /// Create a new catalog client
    ///
    /// # Errors
    /// - `CatalogError::InvalidInput` if the URL or username is empty
    /// - `CatalogError::Http` if the HTTP client cannot be built
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        if config.url.trim().is_empty() {
            return Err(CatalogError::InvalidInput(
                "catalog URL cannot be empty".to_string(),
            ));
        }
        if config.username.trim().is_empty() {
            return Err(CatalogError::InvalidInput(
                "catalog username cannot be empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Encore/1.0")
            .build()?;

        let tokens = TokenManager::new(
            http_client.clone(),
            config.api_url("auth/token"),
            config.username.clone(),
            config.password.clone(),
            config.fallback_token.clone(),
            Duration::from_secs(config.token_ttl_secs),
            Duration::from_secs(config.token_timeout_secs),
        );

        Ok(Self {
            http_client,
            request_delay: Duration::from_millis(config.request_delay_ms),
            config,
            tokens: Arc::new(tokens),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a catalog client from environment variables
    ///
    /// See [`CatalogConfig::from_env`] for the variables read.
    pub fn from_env() -> CatalogResult<Self> {
        let config =
            CatalogConfig::from_env().map_err(|e| CatalogError::InvalidInput(e.to_string()))?;
        Self::new(config)
    }

    /// Override the number of retries for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The rate-limiting delay applied between consecutive requests
    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Source of the cached token, if one has been obtained
    pub async fn token_source(&self) -> Option<TokenSource> {
        self.tokens.current_source().await
    }

    fn validate_query(query: &RecordingQuery) -> CatalogResult<()> {
        let title = query.title.trim();
        if title.is_empty() {
            return Err(CatalogError::InvalidInput(
                "title cannot be empty".to_string(),
            ));
        }
        if title.len() > MAX_TITLE_LENGTH {
            return Err(CatalogError::InvalidInput(format!(
                "title too long (max {} characters)",
                MAX_TITLE_LENGTH
            )));
        }
        Ok(())
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> CatalogResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Catalog request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        url: &str,
        token: &str,
        body: &B,
    ) -> CatalogResult<reqwest::Response> {
        self.http_client
            .post(url)
            .header(AUTHORIZATION, format!("Token {}", token))
            .json(body)
            .send()
            .await
            .map_err(CatalogError::from_transport)
    }

    /// POST with the cached token, refreshing it once on an auth rejection
    async fn post_authorized<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> CatalogResult<String> {
        let url = self.config.api_url(path);

        let token = self.tokens.token().await?;
        let response = self.send(&url, &token, body).await?;
        if !is_auth_rejection(response.status()) {
            return read_body(response).await;
        }

        warn!(status = %response.status(), "Catalog rejected token, refreshing");
        self.tokens.invalidate(&token).await;

        let token = self.tokens.token().await?;
        let response = self.send(&url, &token, body).await?;
        if is_auth_rejection(response.status()) {
            warn!(status = %response.status(), "Catalog rejected refreshed token");
            return Err(CatalogError::Unauthorized);
        }
        read_body(response).await
    }

    async fn search(&self, request: &SearchRequest) -> CatalogResult<Vec<CandidateRecord>> {
        let text = self
            .with_retry(|| self.post_authorized("search", request))
            .await?;
        let response: SearchResponse = serde_json::from_str(&text)?;
        Ok(response
            .results
            .into_iter()
            .filter_map(|raw| raw.into_candidate())
            .collect())
    }

    /// Run one strategy and keep the candidates that pass its checks
    #[instrument(skip(self, query), fields(title = %query.title))]
    pub async fn search_strategy(
        &self,
        strategy: SearchStrategy,
        query: &RecordingQuery,
    ) -> CatalogResult<Vec<CandidateRecord>> {
        Self::validate_query(query)?;

        let request = strategy.build_request(query);
        let raw = self.search(&request).await?;
        let total = raw.len();

        let checks = strategy.checks();
        let filtered = dedup_by_isrc(
            raw.into_iter()
                .filter(|c| candidate_matches(query, c, checks))
                .collect(),
        );

        debug!(
            strategy = %strategy,
            returned = total,
            kept = filtered.len(),
            "Catalog search finished"
        );
        Ok(filtered)
    }

    async fn pace(&self, issued: &mut u32) {
        if *issued > 0 && !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        *issued += 1;
    }

    /// Resolve a recording to its identifier using the ordered strategies
    ///
    /// Returns an empty [`Resolution`] when no strategy finds anything; that
    /// is not an error.
    ///
    /// # Errors
    /// - `CatalogError::InvalidInput` if the title is empty or too long
    /// - transport, authorization and API errors from any search request
    #[instrument(skip(self, query), fields(title = %query.title))]
    pub async fn resolve(&self, query: &RecordingQuery) -> CatalogResult<Resolution> {
        Self::validate_query(query)?;

        let mut issued = 0u32;
        let mut chosen: Option<(SearchStrategy, Vec<CandidateRecord>)> = None;

        for strategy in [SearchStrategy::FullInfo, SearchStrategy::Relaxed] {
            if chosen.is_some() || !strategy.applies_to(query) {
                continue;
            }
            self.pace(&mut issued).await;
            let found = self.search_strategy(strategy, query).await?;
            if !found.is_empty() {
                chosen = Some((strategy, found));
            }
        }

        if SearchStrategy::ArtistQualified.applies_to(query) {
            self.pace(&mut issued).await;
            let found = self
                .search_strategy(SearchStrategy::ArtistQualified, query)
                .await?;
            if !found.is_empty() {
                if let Some((previous, _)) = &chosen {
                    debug!(previous = %previous, "Artist-qualified results take precedence");
                }
                chosen = Some((SearchStrategy::ArtistQualified, found));
            }
        }

        if chosen.is_none() {
            self.pace(&mut issued).await;
            let found = self
                .search_strategy(SearchStrategy::TitleOnly, query)
                .await?;
            if !found.is_empty() {
                chosen = Some((SearchStrategy::TitleOnly, found));
            }
        }

        let resolution = match chosen {
            Some((strategy, candidates)) => Resolution {
                decision: select_candidate(&candidates, &query.artists),
                strategy: Some(strategy),
                candidates,
                requests: issued,
            },
            None => Resolution {
                strategy: None,
                candidates: Vec::new(),
                decision: MatchDecision::NotFound,
                requests: issued,
            },
        };

        info!(
            strategy = ?resolution.strategy,
            candidates = resolution.candidates.len(),
            isrc = ?resolution.isrc(),
            requests = resolution.requests,
            "Resolved recording"
        );
        Ok(resolution)
    }

    /// Look up the parent release identifier (UPC) for a known ISRC
    ///
    /// Returns `None` when the catalog has no UPC for it.
    #[instrument(skip(self))]
    pub async fn lookup_upc(&self, isrc: &str) -> CatalogResult<Option<String>> {
        let isrc = isrc.trim();
        if isrc.is_empty() {
            return Err(CatalogError::InvalidInput(
                "isrc cannot be empty".to_string(),
            ));
        }

        let request = SearchRequest {
            result_limit: LOOKUP_RESULT_LIMIT,
            offset: 0,
            search_fields: SearchFields {
                isrc: Some(isrc.to_string()),
                ..SearchFields::default()
            },
            include_releases: true,
        };

        let upc = self
            .search(&request)
            .await?
            .into_iter()
            .filter(|c| c.isrc.eq_ignore_ascii_case(isrc))
            .find_map(|c| c.upc);

        debug!(isrc = %isrc, upc = ?upc, "UPC lookup finished");
        Ok(upc)
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn read_body(response: reqwest::Response) -> CatalogResult<String> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Catalog API rate limited");
        return Err(CatalogError::RateLimited);
    }

    let text = response.text().await.map_err(CatalogError::from_transport)?;
    if !status.is_success() {
        let message: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(CatalogError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(text)
}
