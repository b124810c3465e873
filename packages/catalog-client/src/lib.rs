//! External catalog client for Encore
//!
//! This crate talks to a third-party metadata catalog that is only reachable
//! with a short-lived bearer token. It provides:
//! - Token acquisition with single-flight caching and a fallback token
//! - Multi-strategy ISRC resolution from minimal recording metadata
//! - UPC lookup for an already-resolved ISRC
//!
//! # Example
//!
//! ```rust,no_run
//! use encore_catalog_client::{CatalogClient, RecordingQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::from_env()?;
//!
//! let query = RecordingQuery::new("Shake It Off")
//!     .with_album("1989")
//!     .with_label("Big Machine Records")
//!     .with_release_date("2014-08-18")
//!     .with_artists(["Taylor Swift"]);
//!
//! let resolution = client.resolve(&query).await?;
//! if let Some(isrc) = resolution.isrc() {
//!     println!("{}", isrc);
//!     let upc = client.lookup_upc(isrc).await?;
//!     println!("{:?}", upc);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `CATALOG_API_URL`: catalog base URL (required)
//! - `CATALOG_USERNAME` / `CATALOG_PASSWORD`: token credentials (required)
//! - `CATALOG_FALLBACK_TOKEN`: token used when acquisition fails

mod client;
mod error;
pub mod matching;
mod models;
mod strategy;
mod token;

pub use client::{CatalogClient, Resolution};
pub use error::{CatalogError, CatalogResult};
pub use matching::MatchDecision;
pub use models::{CandidateRecord, RecordingQuery};
pub use strategy::SearchStrategy;
pub use token::TokenSource;
