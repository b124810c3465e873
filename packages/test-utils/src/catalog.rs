//! Mock metadata catalog for testing identifier resolution
//!
//! Provides a [`MockCatalogServer`] that simulates the catalog's token and
//! search endpoints so resolver and backfill tests run without the real
//! service.

use std::time::Duration;

use encore_shared_config::CatalogConfig;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Default token issued by the mock token endpoint
pub const TEST_TOKEN: &str = "test-token";

const TOKEN_PATH: &str = "/auth/token";
const SEARCH_PATH: &str = "/search";

/// Mock catalog server
///
/// Wraps a [`wiremock::MockServer`]. Search mocks only match requests that
/// carry `authorization: Token <token>` for the token they were mounted with.
/// When several mounted mocks match a request, the one mounted first wins, so
/// mount narrow mocks before catch-all ones.
///
/// # Example
///
/// ```rust,ignore
/// use encore_test_utils::{CandidateFixture, MockCatalogServer, TEST_TOKEN};
///
/// #[tokio::test]
/// async fn test_resolve() {
///     let server = MockCatalogServer::start().await;
///     server.mock_token_success(TEST_TOKEN).await;
///     server
///         .mock_search(TEST_TOKEN, vec![CandidateFixture::new("USCJY1431349", "Shake It Off")])
///         .await;
///
///     let client = CatalogClient::new(server.config()).unwrap();
/// }
/// ```
pub struct MockCatalogServer {
    server: MockServer,
    username: String,
    password: String,
}

impl MockCatalogServer {
    /// Start a new mock catalog with default credentials
    pub async fn start() -> Self {
        Self::start_with_credentials("svc-encore", "catalog-secret").await
    }

    /// Start a new mock catalog with custom credentials
    pub async fn start_with_credentials(username: &str, password: &str) -> Self {
        let server = MockServer::start().await;
        Self {
            server,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Client configuration pointing at this server, with no request delay
    pub fn config(&self) -> CatalogConfig {
        CatalogConfig::new(self.url(), &self.username, &self.password)
    }

    /// Mount a token endpoint that issues `token` for the configured credentials
    pub async fn mock_token_success(&self, token: &str) {
        self.mount_token(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .await;
    }

    /// Mount a token endpoint that answers after `delay`
    pub async fn mock_token_delayed(&self, token: &str, delay: Duration) {
        self.mount_token(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": token }))
                .set_delay(delay),
        )
        .await;
    }

    /// Mount a token endpoint that fails with `status`
    pub async fn mock_token_failure(&self, status: u16) {
        self.mount_token(
            ResponseTemplate::new(status).set_body_json(json!({ "error": "token unavailable" })),
        )
        .await;
    }

    /// Mount a token endpoint that issues `first` once, then `second`
    pub async fn mock_token_sequence(&self, first: &str, second: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": first })))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
        self.mock_token_success(second).await;
    }

    async fn mount_token(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_partial_json(json!({
                "username": self.username,
                "password": self.password
            })))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Mount a search mock answering every search made with `token`
    pub async fn mock_search(&self, token: &str, results: Vec<CandidateFixture>) {
        self.mock_search_where(token, json!({}), results).await;
    }

    /// Mount a search mock for requests whose body contains `partial_body`
    ///
    /// Strategies are told apart by their window (`resultLimit`) and by
    /// whether `searchFields.artist` is present.
    pub async fn mock_search_where(
        &self,
        token: &str,
        partial_body: Value,
        results: Vec<CandidateFixture>,
    ) {
        let results: Vec<Value> = results.iter().map(CandidateFixture::to_json).collect();
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(header("authorization", format!("Token {}", token).as_str()))
            .and(body_partial_json(partial_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
            .mount(&self.server)
            .await;
    }

    /// Mount a UPC lookup answer for `isrc`
    pub async fn mock_lookup(&self, token: &str, isrc: &str, upc: Option<&str>) {
        let mut fixture = CandidateFixture::new(isrc, "Lookup");
        fixture.upc = upc.map(str::to_string);
        self.mock_search_where(
            token,
            json!({ "searchFields": { "isrc": isrc } }),
            vec![fixture],
        )
        .await;
    }

    /// Mount a 401 response for searches made with `token`
    pub async fn mock_search_rejected(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(header("authorization", format!("Token {}", token).as_str()))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Invalid token."
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a server error for every search
    pub async fn mock_search_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "catalog unavailable"
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of token acquisition requests received
    pub async fn token_requests(&self) -> usize {
        self.requests_to(TOKEN_PATH).await.len()
    }

    /// JSON bodies of search requests received, in order
    pub async fn search_bodies(&self) -> Vec<Value> {
        self.requests_to(SEARCH_PATH).await
    }

    async fn requests_to(&self, wanted: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == wanted)
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }
}

/// Fixture for catalog search results
#[derive(Debug, Clone)]
pub struct CandidateFixture {
    pub isrc: String,
    pub title: String,
    pub release_name: Option<String>,
    pub label: Option<String>,
    pub artist_name: Option<String>,
    pub release_date: Option<String>,
    pub upc: Option<String>,
}

impl CandidateFixture {
    /// Create a fixture with only an identifier and a title
    pub fn new(isrc: &str, title: &str) -> Self {
        Self {
            isrc: isrc.to_string(),
            title: title.to_string(),
            release_name: None,
            label: None,
            artist_name: None,
            release_date: None,
            upc: None,
        }
    }

    /// The "Shake It Off" single as the catalog lists it
    pub fn shake_it_off() -> Self {
        Self::new("USCJY1431349", "Shake It Off")
            .release("1989")
            .label("BigMachineRecords")
            .artist("Taylor Swift")
            .release_date("2014-08-18")
            .upc("00843930013562")
    }

    pub fn release(mut self, name: &str) -> Self {
        self.release_name = Some(name.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn artist(mut self, artist: &str) -> Self {
        self.artist_name = Some(artist.to_string());
        self
    }

    pub fn release_date(mut self, date: &str) -> Self {
        self.release_date = Some(date.to_string());
        self
    }

    pub fn upc(mut self, upc: &str) -> Self {
        self.upc = Some(upc.to_string());
        self
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> Value {
        json!({
            "isrc": self.isrc,
            "title": self.title,
            "releaseName": self.release_name,
            "label": self.label,
            "artistName": self.artist_name,
            "releaseDate": self.release_date,
            "upc": self.upc
        })
    }
}
