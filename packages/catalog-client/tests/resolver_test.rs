//! Integration tests for catalog resolution
//!
//! Exercises token handling and the strategy cascade against a wiremock
//! catalog.

use std::time::{Duration, Instant};

use encore_catalog_client::{
    CatalogClient, CatalogError, MatchDecision, RecordingQuery, SearchStrategy, TokenSource,
};
use encore_test_utils::{CandidateFixture, MockCatalogServer, TEST_TOKEN};
use serde_json::json;

fn shake_it_off_query() -> RecordingQuery {
    RecordingQuery::new("Shake It Off")
        .with_album("1989")
        .with_label("Big Machine Records")
        .with_release_date("2014-08-18")
}

fn client_for(server: &MockCatalogServer) -> CatalogClient {
    CatalogClient::new(server.config())
        .unwrap()
        .with_max_retries(0)
}

// ============================================================================
// Token lifecycle
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_acquire_one_token() {
    let server = MockCatalogServer::start().await;
    server
        .mock_token_delayed(TEST_TOKEN, Duration::from_millis(200))
        .await;
    server
        .mock_search(TEST_TOKEN, vec![CandidateFixture::shake_it_off()])
        .await;

    let client = client_for(&server);
    let other = client.clone();
    let query = RecordingQuery::new("Shake It Off").with_album("1989");

    let (first, second) = tokio::join!(client.resolve(&query), other.resolve(&query));

    assert_eq!(first.unwrap().isrc(), Some("USCJY1431349"));
    assert_eq!(second.unwrap().isrc(), Some("USCJY1431349"));
    assert_eq!(server.token_requests().await, 1);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let server = MockCatalogServer::start().await;
    server.mock_token_sequence("stale-token", "fresh-token").await;
    server.mock_search_rejected("stale-token").await;
    server
        .mock_search("fresh-token", vec![CandidateFixture::shake_it_off()])
        .await;

    let client = client_for(&server);
    let resolution = client
        .resolve(&RecordingQuery::new("Shake It Off"))
        .await
        .unwrap();

    assert_eq!(resolution.isrc(), Some("USCJY1431349"));
    assert_eq!(server.token_requests().await, 2);
}

#[tokio::test]
async fn test_second_rejection_is_unauthorized() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server.mock_search_rejected(TEST_TOKEN).await;

    let client = client_for(&server);
    let result = client.resolve(&RecordingQuery::new("Shake It Off")).await;

    assert!(matches!(result, Err(CatalogError::Unauthorized)));
    assert_eq!(server.token_requests().await, 2);
    assert_eq!(server.search_bodies().await.len(), 2);
}

#[tokio::test]
async fn test_failed_acquisition_uses_fallback_token() {
    let server = MockCatalogServer::start().await;
    server.mock_token_failure(500).await;
    server
        .mock_search("static-token", vec![CandidateFixture::shake_it_off()])
        .await;

    let config = server.config().with_fallback_token("static-token");
    let client = CatalogClient::new(config).unwrap().with_max_retries(0);

    let resolution = client
        .resolve(&RecordingQuery::new("Shake It Off"))
        .await
        .unwrap();

    assert_eq!(resolution.isrc(), Some("USCJY1431349"));
    assert_eq!(client.token_source().await, Some(TokenSource::Fallback));
}

#[tokio::test]
async fn test_failed_acquisition_without_fallback() {
    let server = MockCatalogServer::start().await;
    server.mock_token_failure(503).await;

    let client = client_for(&server);
    let result = client.resolve(&RecordingQuery::new("Shake It Off")).await;

    assert!(matches!(result, Err(CatalogError::TokenUnavailable(_))));
    assert!(server.search_bodies().await.is_empty());
}

#[tokio::test]
async fn test_expired_token_is_reacquired() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(TEST_TOKEN, vec![CandidateFixture::shake_it_off()])
        .await;

    let config = server.config().with_token_ttl(0);
    let client = CatalogClient::new(config).unwrap();
    let query = RecordingQuery::new("Shake It Off");

    client.resolve(&query).await.unwrap();
    client.resolve(&query).await.unwrap();

    assert_eq!(server.token_requests().await, 2);
}

// ============================================================================
// Strategy cascade
// ============================================================================

#[tokio::test]
async fn test_exact_match_resolves_on_full_info() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(TEST_TOKEN, vec![CandidateFixture::shake_it_off()])
        .await;

    let client = client_for(&server);
    let resolution = client.resolve(&shake_it_off_query()).await.unwrap();

    assert_eq!(resolution.strategy, Some(SearchStrategy::FullInfo));
    assert_eq!(resolution.isrc(), Some("USCJY1431349"));
    assert_eq!(resolution.requests, 1);

    let bodies = server.search_bodies().await;
    assert_eq!(
        bodies[0],
        json!({
            "resultLimit": 50,
            "offset": 0,
            "searchFields": {"title": "Shake It Off", "releaseName": "1989"},
            "includeReleases": true
        })
    );
}

#[tokio::test]
async fn test_no_matches_falls_through_every_strategy() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server.mock_search(TEST_TOKEN, vec![]).await;

    let client = client_for(&server);
    let query = shake_it_off_query().with_artists(["Taylor Swift"]);
    let resolution = client.resolve(&query).await.unwrap();

    assert!(resolution.strategy.is_none());
    assert!(resolution.candidates.is_empty());
    assert_eq!(resolution.decision, MatchDecision::NotFound);
    assert_eq!(resolution.requests, 4);

    let windows: Vec<u64> = server
        .search_bodies()
        .await
        .iter()
        .map(|b| b["resultLimit"].as_u64().unwrap())
        .collect();
    assert_eq!(windows, vec![50, 20, 20, 100]);
}

#[tokio::test]
async fn test_artist_qualified_overrides_full_info() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search_where(
            TEST_TOKEN,
            json!({"searchFields": {"artist": "Taylor Swift"}}),
            vec![CandidateFixture::new("USCJY1431350", "Shake It Off").artist("Taylor Swift")],
        )
        .await;
    server
        .mock_search(TEST_TOKEN, vec![CandidateFixture::shake_it_off()])
        .await;

    let client = client_for(&server);
    let query = shake_it_off_query().with_artists(["Taylor Swift"]);
    let resolution = client.resolve(&query).await.unwrap();

    assert_eq!(resolution.strategy, Some(SearchStrategy::ArtistQualified));
    assert_eq!(resolution.isrc(), Some("USCJY1431350"));
    assert_eq!(resolution.requests, 2);
}

#[tokio::test]
async fn test_label_mismatch_falls_back_to_relaxed() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(
            TEST_TOKEN,
            vec![CandidateFixture::shake_it_off().label("Republic Records")],
        )
        .await;

    let client = client_for(&server);
    let resolution = client.resolve(&shake_it_off_query()).await.unwrap();

    assert_eq!(resolution.strategy, Some(SearchStrategy::Relaxed));
    assert_eq!(resolution.isrc(), Some("USCJY1431349"));
}

#[tokio::test]
async fn test_title_only_last_resort() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(
            TEST_TOKEN,
            vec![CandidateFixture::new("GBUM71029604", "Shake It Off (Live)").release("Tour")],
        )
        .await;

    let client = client_for(&server);
    let resolution = client.resolve(&shake_it_off_query()).await.unwrap();

    assert_eq!(resolution.strategy, Some(SearchStrategy::TitleOnly));
    assert_eq!(resolution.isrc(), Some("GBUM71029604"));
    assert_eq!(resolution.requests, 3);
}

#[tokio::test]
async fn test_ambiguous_candidates_need_artist_overlap() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(
            TEST_TOKEN,
            vec![
                CandidateFixture::new("QZAAA1500001", "Shake It Off").artist("Cover Band"),
                CandidateFixture::new("QZAAA1500002", "Shake It Off").artist("Karaoke Stars"),
            ],
        )
        .await;

    let client = client_for(&server);
    let query = RecordingQuery::new("Shake It Off").with_artists(["Taylor Swift"]);
    let resolution = client.resolve(&query).await.unwrap();

    assert_eq!(resolution.candidates.len(), 2);
    assert!(resolution.isrc().is_none());
    assert!(matches!(
        resolution.decision,
        MatchDecision::NoConfidentMatch { candidates: 2, .. }
    ));
}

#[tokio::test]
async fn test_duplicate_identifiers_count_once() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_search(
            TEST_TOKEN,
            vec![
                CandidateFixture::shake_it_off(),
                CandidateFixture::shake_it_off().release("1989 (Deluxe)"),
            ],
        )
        .await;

    let client = client_for(&server);
    let resolution = client.resolve(&shake_it_off_query()).await.unwrap();

    assert_eq!(resolution.candidates.len(), 1);
    assert_eq!(resolution.isrc(), Some("USCJY1431349"));
}

#[tokio::test]
async fn test_delay_between_strategy_requests() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server.mock_search(TEST_TOKEN, vec![]).await;

    let mut config = server.config();
    config.request_delay_ms = 50;
    let client = CatalogClient::new(config).unwrap();

    let started = Instant::now();
    let resolution = client.resolve(&shake_it_off_query()).await.unwrap();

    assert_eq!(resolution.requests, 3);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_server_error_surfaces() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server.mock_search_error(500).await;

    let client = client_for(&server);
    let result = client.resolve(&shake_it_off_query()).await;

    assert!(matches!(result, Err(CatalogError::Api { status: 500, .. })));
}

// ============================================================================
// UPC lookup
// ============================================================================

#[tokio::test]
async fn test_lookup_upc() {
    let server = MockCatalogServer::start().await;
    server.mock_token_success(TEST_TOKEN).await;
    server
        .mock_lookup(TEST_TOKEN, "USCJY1431349", Some("00843930013562"))
        .await;
    server
        .mock_lookup(TEST_TOKEN, "USCJY1431399", None)
        .await;

    let client = client_for(&server);

    let upc = client.lookup_upc("USCJY1431349").await.unwrap();
    assert_eq!(upc.as_deref(), Some("00843930013562"));

    let missing = client.lookup_upc("USCJY1431399").await.unwrap();
    assert!(missing.is_none());

    let bodies = server.search_bodies().await;
    assert_eq!(bodies[0]["searchFields"], json!({"isrc": "USCJY1431349"}));
    assert_eq!(bodies[0]["resultLimit"], 10);
}
