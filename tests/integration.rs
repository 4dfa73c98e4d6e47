//! Integration tests driving the real client against an in-process stub
//! upstream. The stub is a plain axum router bound to an ephemeral port,
//! so retry counts, fallback switching, and limiter behavior are observed
//! over real HTTP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use arena_mcp::client::{ArenaClient, SearchParams};
use arena_mcp::config::ApiConfig;
use arena_mcp::error::ArenaError;
use arena_mcp::models::{SearchEntityType, SearchSource};
use arena_mcp::resolver::{resolve_channel, ResolveStrategy};

#[derive(Default)]
struct StubState {
    requests: AtomicUsize,
    channel_lookups: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn test_config(base: &str) -> ApiConfig {
    ApiConfig {
        base_url: format!("{base}/v3"),
        v2_base_url: format!("{base}/v2"),
        access_token: Some("test-token".to_string()),
        timeout_secs: 5,
        max_retries: 3,
        backoff_base_ms: 1,
        max_concurrent_requests: 5,
        default_page_size: 24,
        enable_v2_fallback: true,
    }
}

fn client(base: &str) -> ArenaClient {
    ArenaClient::new(test_config(base)).unwrap()
}

// ── Retry engine ─────────────────────────────────────────────────────────

#[tokio::test]
async fn retries_server_errors_until_success() {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(
            "/v3/blocks/{id}",
            get(|State(state): State<Arc<StubState>>| async move {
                let n = state.requests.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"})))
                        .into_response()
                } else {
                    Json(json!({"id": 99, "type": "Text", "content": "recovered"}))
                        .into_response()
                }
            }),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let block = client(&base).get_block("99").await.unwrap();
    assert_eq!(block.id, "99");
    // Two failures plus the success.
    assert_eq!(state.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn honors_retry_after_on_rate_limit() {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(
            "/v3/blocks/{id}",
            get(|State(state): State<Arc<StubState>>| async move {
                let n = state.requests.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [(header::RETRY_AFTER, "0")],
                        Json(json!({"message": "slow down"})),
                    )
                        .into_response()
                } else {
                    Json(json!({"id": 7, "type": "Text"})).into_response()
                }
            }),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let block = client(&base).get_block("7").await.unwrap();
    assert_eq!(block.id, "7");
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_budget_surfaces_typed_error() {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(
            "/v3/blocks/{id}",
            get(|State(state): State<Arc<StubState>>| async move {
                state.requests.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "down"})))
            }),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let mut config = test_config(&base);
    config.max_retries = 1;
    let err = ArenaClient::new(config)
        .unwrap()
        .get_block("1")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable());
    assert_eq!(err.diagnostic().as_deref(), Some("down"));
    // One initial call plus one retry.
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(
            "/v3/channels/{id}",
            get(|State(state): State<Arc<StubState>>| async move {
                state.requests.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, Json(json!({"message": "no such channel"})))
            }),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let err = client(&base).get_channel("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(state.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bearer_token_is_forwarded() {
    let app = Router::new().route(
        "/v3/users/{id}",
        get(|headers: HeaderMap| async move {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if auth == "Bearer test-token" {
                Json(json!({"id": 5, "slug": "morgan", "name": "Morgan"})).into_response()
            } else {
                StatusCode::UNAUTHORIZED.into_response()
            }
        }),
    );
    let base = serve(app).await;

    let user = client(&base).get_user("morgan").await.unwrap();
    assert_eq!(user.slug, "morgan");
}

#[tokio::test]
async fn delete_resolves_on_204_without_body() {
    let app = Router::new().route(
        "/v3/connections/{id}",
        axum::routing::delete(|| async { StatusCode::NO_CONTENT }),
    );
    let base = serve(app).await;

    client(&base).disconnect_connection("41").await.unwrap();
}

// ── Search fallback policy ───────────────────────────────────────────────

fn fallback_app() -> Router {
    Router::new()
        .route(
            "/v3/search",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"message": "search requires premium"})),
                )
            }),
        )
        .route(
            "/v2/search",
            get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
                assert_eq!(q.get("q").map(String::as_str), Some("maps"));
                Json(json!({
                    "blocks": [{"id": 20, "title": "A map image"}],
                    "channels": [{"id": 10, "title": "Maps", "slug": "maps"}],
                    "users": [],
                    "current_page": 1,
                    "total_pages": 2,
                    "per": 24,
                    "length": 30
                }))
            }),
        )
}

#[tokio::test]
async fn search_falls_back_to_legacy_on_403() {
    let base = serve(fallback_app()).await;

    let result = client(&base)
        .search(&SearchParams {
            query: "maps".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.source_api, SearchSource::V2Fallback);
    // Legacy arrays concatenate blocks first, then channels, then users.
    assert_eq!(result.items[0].entity_type, SearchEntityType::Block);
    assert_eq!(result.items[1].entity_type, SearchEntityType::Channel);
    assert!(result.meta.unwrap().has_more_pages);
}

#[tokio::test]
async fn search_403_propagates_when_fallback_disabled() {
    let base = serve(fallback_app()).await;

    let mut config = test_config(&base);
    config.enable_v2_fallback = false;
    let err = ArenaClient::new(config)
        .unwrap()
        .search(&SearchParams {
            query: "maps".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn primary_search_is_tagged_v3() {
    let app = Router::new().route(
        "/v3/search",
        get(|| async {
            Json(json!({
                "data": [{"id": 1, "type": "Channel", "title": "Maps", "slug": "maps"}],
                "meta": {"current_page": 1, "next_page": null}
            }))
        }),
    );
    let base = serve(app).await;

    let result = client(&base)
        .search(&SearchParams {
            query: "maps".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.source_api, SearchSource::V3);
    assert_eq!(result.items.len(), 1);
}

// ── Channel resolver ─────────────────────────────────────────────────────

/// Stub content graph: `reading-list` owned by `morgan`, findable via
/// search by its title "Reading List"; `maps` surfaces only via search
/// (direct lookup is case-sensitive); `old-maps` is the lone hit for
/// "cartography"; two channels share the prefix "garden" to force
/// ambiguity.
fn resolver_app(state: Arc<StubState>) -> Router {
    Router::new()
        .route(
            "/v3/channels/{key}",
            get(
                |State(state): State<Arc<StubState>>, Path(key): Path<String>| async move {
                    state.channel_lookups.fetch_add(1, Ordering::SeqCst);
                    let found = match key.as_str() {
                        "reading-list" => Some(json!({
                            "id": 4021,
                            "slug": "reading-list",
                            "title": "Reading List",
                            "owner": {"id": 5, "slug": "morgan", "name": "Morgan"}
                        })),
                        "maps" => Some(json!({
                            "id": 4022,
                            "slug": "maps",
                            "title": "All Maps",
                            "owner": {"id": 5, "slug": "morgan", "name": "Morgan"}
                        })),
                        "old-maps" => Some(json!({
                            "id": 4023,
                            "slug": "old-maps",
                            "title": "Old Maps",
                            "owner": {"id": 5, "slug": "morgan", "name": "Morgan"}
                        })),
                        _ => None,
                    };
                    match found {
                        Some(channel) => Json(channel).into_response(),
                        None => (StatusCode::NOT_FOUND, Json(json!({"message": "not found"})))
                            .into_response(),
                    }
                },
            ),
        )
        .route(
            "/v3/search",
            get(
                |Query(q): Query<std::collections::HashMap<String, String>>| async move {
                    assert_eq!(q.get("scope").map(String::as_str), Some("my"));
                    assert_eq!(q.get("type").map(String::as_str), Some("Channel"));
                    let query = q.get("q").cloned().unwrap_or_default();
                    let data = if query == "Reading List" {
                        json!([{
                            "id": 4021, "type": "Channel",
                            "title": "Reading List", "slug": "reading-list"
                        }])
                    } else if query == "Maps" {
                        json!([
                            {"id": 4022, "type": "Channel", "title": "All Maps", "slug": "maps"},
                            {"id": 4030, "type": "Channel", "title": "Maps Archive", "slug": "maps-archive"}
                        ])
                    } else if query == "cartography" {
                        json!([{
                            "id": 4023, "type": "Channel",
                            "title": "Old Maps", "slug": "old-maps"
                        }])
                    } else if query.contains("garden") {
                        json!([
                            {"id": 1, "type": "Channel", "title": "Garden Notes", "slug": "garden-notes"},
                            {"id": 2, "type": "Channel", "title": "Garden Photos", "slug": "garden-photos"}
                        ])
                    } else {
                        json!([])
                    };
                    Json(json!({"data": data, "meta": {"current_page": 1}}))
                },
            ),
        )
        .with_state(state)
}

#[tokio::test]
async fn url_input_resolves_and_verifies_owner() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state)).await;
    let client = client(&base);

    let resolved = resolve_channel(&client, "https://www.are.na/morgan/reading-list")
        .await
        .unwrap();
    assert_eq!(resolved.strategy, ResolveStrategy::UrlExtracted);
    assert_eq!(resolved.canonical, "reading-list");
    assert_eq!(resolved.expected_owner.as_deref(), Some("morgan"));
    assert!(resolved.search_source.is_none());
}

#[tokio::test]
async fn owner_mismatch_fails_closed() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state)).await;
    let client = client(&base);

    let err = resolve_channel(&client, "https://www.are.na/alex/reading-list")
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::OwnerMismatch { .. }));
}

#[tokio::test]
async fn title_input_resolves_via_search_with_two_lookups() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state.clone())).await;
    let client = client(&base);

    let resolved = resolve_channel(&client, "Reading List").await.unwrap();
    assert_eq!(resolved.strategy, ResolveStrategy::SearchExactTitle);
    assert_eq!(resolved.canonical, "reading-list");
    assert_eq!(resolved.search_source, Some(SearchSource::V3));
    // Once failed, once after search.
    assert_eq!(state.channel_lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exact_slug_match_wins_among_candidates() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state.clone())).await;
    let client = client(&base);

    // Direct lookup of "Maps" misses (slugs are lowercase); search returns
    // two candidates, one of whose slugs matches the input ignoring case.
    let resolved = resolve_channel(&client, "Maps").await.unwrap();
    assert_eq!(resolved.strategy, ResolveStrategy::SearchExactSlug);
    assert_eq!(resolved.canonical, "maps");
    assert_eq!(resolved.search_source, Some(SearchSource::V3));
    // Once failed, once re-fetching the winning candidate.
    assert_eq!(state.channel_lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lone_candidate_resolves_without_exact_match() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state)).await;
    let client = client(&base);

    // "cartography" matches neither slug nor title of the single result.
    let resolved = resolve_channel(&client, "cartography").await.unwrap();
    assert_eq!(resolved.strategy, ResolveStrategy::SearchSingle);
    assert_eq!(resolved.canonical, "old-maps");
    assert_eq!(resolved.search_source, Some(SearchSource::V3));
}

#[tokio::test]
async fn ambiguous_reference_lists_candidates() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state)).await;
    let client = client(&base);

    let err = resolve_channel(&client, "garden").await.unwrap_err();
    match err {
        ArenaError::AmbiguousChannel { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
            assert_eq!(candidates[0].slug, "garden-notes");
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[tokio::test]
async fn no_candidates_rethrows_original_not_found() {
    let state = Arc::new(StubState::default());
    let base = serve(resolver_app(state)).await;
    let client = client(&base);

    let err = resolve_channel(&client, "completely-unknown").await.unwrap_err();
    assert!(err.is_not_found());
}

// ── Concurrency limiter ──────────────────────────────────────────────────

#[tokio::test]
async fn limiter_bounds_in_flight_requests() {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(
            "/v3/blocks/{id}",
            get(|State(state): State<Arc<StubState>>| async move {
                let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                state.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                state.in_flight.fetch_sub(1, Ordering::SeqCst);
                Json(json!({"id": 1, "type": "Text"}))
            }),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let mut config = test_config(&base);
    config.max_concurrent_requests = 3;
    let client = Arc::new(ArenaClient::new(config).unwrap());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.get_block("1").await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(state.max_in_flight.load(Ordering::SeqCst) <= 3);
}

/// Stub state for observing the order queued requests are serviced in:
/// the first request blocks until released, so the rest pile up on the
/// client's limiter while it is held.
#[derive(Default)]
struct FifoState {
    arrivals: AtomicUsize,
    release: std::sync::atomic::AtomicBool,
    order: std::sync::Mutex<Vec<String>>,
}

#[tokio::test]
async fn queued_requests_release_in_submission_order() {
    let state = Arc::new(FifoState::default());
    let app = Router::new()
        .route(
            "/v3/blocks/{id}",
            get(
                |State(state): State<Arc<FifoState>>, Path(id): Path<String>| async move {
                    state.order.lock().unwrap().push(id);
                    let n = state.arrivals.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        while !state.release.load(Ordering::SeqCst) {
                            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        }
                    }
                    Json(json!({"id": 1, "type": "Text"}))
                },
            ),
        )
        .with_state(state.clone());
    let base = serve(app).await;

    let mut config = test_config(&base);
    config.max_concurrent_requests = 1;
    let client = Arc::new(ArenaClient::new(config).unwrap());

    // The first call takes the lone permit and parks inside the stub.
    let mut handles = Vec::new();
    {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.get_block("0").await }));
    }
    while state.arrivals.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    // Queue the rest one at a time so each reaches the limiter in order.
    for i in 1..=4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.get_block(&i.to_string()).await
        }));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    state.release.store(true, Ordering::SeqCst);
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = state.order.lock().unwrap().clone();
    assert_eq!(order, vec!["0", "1", "2", "3", "4"]);
}

// ── Query serialization ──────────────────────────────────────────────────

#[tokio::test]
async fn multiple_entity_filters_join_with_commas() {
    let app = Router::new().route(
        "/v3/search",
        get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
            assert_eq!(q.get("type").map(String::as_str), Some("Block,Channel"));
            Json(json!({"data": [], "meta": {"current_page": 1}}))
        }),
    );
    let base = serve(app).await;

    let result = client(&base)
        .search(&SearchParams {
            query: "maps".to_string(),
            entities: vec![SearchEntityType::Block, SearchEntityType::Channel],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(result.items.is_empty());
}
