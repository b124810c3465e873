//! External catalog (identifier resolver) configuration types

use crate::{get_optional_env, get_required_env, parse_env, ConfigError, ConfigResult};

/// Default token lifetime: the provider issues hour-long tokens, renew early
const DEFAULT_TOKEN_TTL_SECS: u64 = 3000;

/// Configuration for the third-party metadata catalog
#[derive(Clone)]
pub struct CatalogConfig {
    /// Catalog API base URL
    pub url: String,

    /// Account used to acquire bearer tokens
    pub username: String,

    /// Password for the token account
    pub password: String,

    /// Fixed secondary token used when acquisition fails
    pub fallback_token: Option<String>,

    /// How long an acquired token is trusted, in seconds
    pub token_ttl_secs: u64,

    /// Timeout for the token acquisition request, in seconds
    pub token_timeout_secs: u64,

    /// Timeout for search and lookup requests, in seconds
    pub request_timeout_secs: u64,

    /// Rate-limiting delay between consecutive catalog requests, in milliseconds
    pub request_delay_ms: u64,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field(
                "fallback_token",
                &self.fallback_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("token_timeout_secs", &self.token_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("request_delay_ms", &self.request_delay_ms)
            .finish()
    }
}

impl CatalogConfig {
    /// Load catalog configuration from environment variables
    ///
    /// `CATALOG_API_URL`, `CATALOG_USERNAME` and `CATALOG_PASSWORD` are required.
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_required_env("CATALOG_API_URL")?;
        let username = get_required_env("CATALOG_USERNAME")?;
        let password = get_required_env("CATALOG_PASSWORD")?;

        url::Url::parse(&url)
            .map_err(|e| ConfigError::InvalidUrl("CATALOG_API_URL".to_string(), e.to_string()))?;

        if username.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "CATALOG_USERNAME".to_string(),
                "username cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            url,
            username,
            password,
            fallback_token: get_optional_env("CATALOG_FALLBACK_TOKEN"),
            token_ttl_secs: parse_env("CATALOG_TOKEN_TTL", DEFAULT_TOKEN_TTL_SECS)?,
            token_timeout_secs: parse_env("CATALOG_TOKEN_TIMEOUT", 10)?,
            request_timeout_secs: parse_env("CATALOG_REQUEST_TIMEOUT", 30)?,
            request_delay_ms: parse_env("CATALOG_REQUEST_DELAY_MS", 1000)?,
        })
    }

    /// Create a configuration with custom URL and credentials (useful for testing)
    ///
    /// The rate-limiting delay defaults to zero here so tests run quickly.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            fallback_token: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            token_timeout_secs: 10,
            request_timeout_secs: 30,
            request_delay_ms: 0,
        }
    }

    /// Set the fixed secondary token
    pub fn with_fallback_token(mut self, token: impl Into<String>) -> Self {
        self.fallback_token = Some(token.into());
        self
    }

    /// Set the token lifetime
    pub fn with_token_ttl(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config() {
        let config = CatalogConfig::new("http://catalog:9000", "svc", "secret");
        assert_eq!(config.url, "http://catalog:9000");
        assert_eq!(config.username, "svc");
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.request_delay_ms, 0);
        assert!(config.fallback_token.is_none());
    }

    #[test]
    fn test_api_url_with_trailing_slash() {
        let config = CatalogConfig::new("http://catalog:9000/", "svc", "secret");
        assert_eq!(config.api_url("search"), "http://catalog:9000/search");
        assert_eq!(config.api_url("/auth/token"), "http://catalog:9000/auth/token");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config =
            CatalogConfig::new("http://catalog:9000", "svc", "hunter2").with_fallback_token("tok");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("\"tok\""));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_env_requires_credentials() {
        temp_env::with_vars(
            [
                ("CATALOG_API_URL", Some("http://catalog:9000")),
                ("CATALOG_USERNAME", None),
                ("CATALOG_PASSWORD", Some("secret")),
            ],
            || {
                let err = CatalogConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "CATALOG_USERNAME"));
            },
        );
    }

    #[test]
    fn test_from_env_rejects_bad_url() {
        temp_env::with_vars(
            [
                ("CATALOG_API_URL", Some("not a url")),
                ("CATALOG_USERNAME", Some("svc")),
                ("CATALOG_PASSWORD", Some("secret")),
            ],
            || {
                let err = CatalogConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::InvalidUrl(..)));
            },
        );
    }

    #[test]
    fn test_from_env_reads_optional_values() {
        temp_env::with_vars(
            [
                ("CATALOG_API_URL", Some("http://catalog:9000")),
                ("CATALOG_USERNAME", Some("svc")),
                ("CATALOG_PASSWORD", Some("secret")),
                ("CATALOG_FALLBACK_TOKEN", Some("static-token")),
                ("CATALOG_REQUEST_DELAY_MS", Some("250")),
                ("CATALOG_TOKEN_TTL", None),
            ],
            || {
                let config = CatalogConfig::from_env().unwrap();
                assert_eq!(config.fallback_token.as_deref(), Some("static-token"));
                assert_eq!(config.request_delay_ms, 250);
                assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
                assert_eq!(config.token_timeout_secs, 10);
            },
        );
    }
}
