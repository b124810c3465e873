//! Catalog API error types

use thiserror::Error;

/// Catalog client errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Invalid input provided to a client method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse catalog response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The catalog rejected a freshly acquired token as well
    #[error("Catalog rejected the request after refreshing the token")]
    Unauthorized,

    /// Token acquisition failed and no fallback token is configured
    #[error("No catalog token available: {0}")]
    TokenUnavailable(String),

    /// Catalog returned a non-success status
    #[error("Catalog API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the catalog
    #[error("Rate limited by catalog API")]
    RateLimited,

    /// Request timeout
    #[error("Request to catalog timed out")]
    Timeout,
}

impl CatalogError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Timeouts, rate limiting, transport errors and 5xx responses are
    /// transient. Authentication and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Timeout | CatalogError::RateLimited => true,
            CatalogError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            CatalogError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a transport error, keeping timeouts distinct
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Http(e)
        }
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
