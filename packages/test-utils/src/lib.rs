//! Shared test utilities for Encore workspace
//!
//! This crate provides mock implementations of external services for testing
//! without network dependencies. These mocks are used by the catalog client
//! and scheduler test suites.
//!
//! # Mock Services
//!
//! - [`MockCatalogServer`] - Mock metadata catalog (token + search endpoints)
//!
//! # Example
//!
//! ```rust,ignore
//! use encore_test_utils::{MockCatalogServer, TEST_TOKEN};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let catalog = MockCatalogServer::start().await;
//!     catalog.mock_token_success(TEST_TOKEN).await;
//!
//!     // Use catalog.config() to configure your client
//! }
//! ```

mod catalog;

pub use catalog::{CandidateFixture, MockCatalogServer, TEST_TOKEN};
