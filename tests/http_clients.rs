use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use plexport::config::{PlexConfig, RetryPolicy, TvMazeConfig};
use plexport::error::{ConnectionError, MetadataError};
use plexport::plex::{MediaServerApi, PlexClient, SeasonCount};
use plexport::tvmaze::{resolve_totals, MetadataApi, SeasonTotals, TvMazeClient};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "plex-token";

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-plex-token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

async fn plex_sections(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "MediaContainer": {
            "size": 2,
            "Directory": [
                { "key": "1", "title": "Movies", "type": "movie" },
                { "key": "2", "title": "TV Shows", "type": "show" }
            ]
        }
    }))
    .into_response()
}

async fn plex_children(headers: HeaderMap, Path(key): Path<String>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let metadata = match key.as_str() {
        "10" => json!([
            { "ratingKey": "11", "index": 1, "leafCount": 8 },
            { "ratingKey": "12", "index": 2 },
            { "ratingKey": "13", "index": 0, "leafCount": 1 }
        ]),
        "12" => json!([
            { "ratingKey": "121", "index": 1 },
            { "ratingKey": "122", "index": 2 },
            { "ratingKey": "123", "index": 3 }
        ]),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(json!({ "MediaContainer": { "Metadata": metadata } })).into_response()
}

fn plex_router() -> Router {
    Router::new()
        .route("/library/sections", get(plex_sections))
        .route("/library/metadata/:key/children", get(plex_children))
}

fn plex_config(base_url: &str, token: Option<&str>) -> PlexConfig {
    PlexConfig {
        base_url: base_url.to_string(),
        token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    }
}

#[derive(Clone)]
struct TvMazeState {
    throttled_first: usize,
    retry_after: &'static str,
    searches: Arc<AtomicUsize>,
}

async fn tvmaze_search(
    State(state): State<TvMazeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let n = state.searches.fetch_add(1, Ordering::SeqCst);
    if n < state.throttled_first {
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, state.retry_after)]).into_response();
    }
    if params.get("q").map(String::as_str) != Some("Severance") {
        return Json(json!([])).into_response();
    }
    Json(json!([
        { "score": 0.9, "show": { "id": 44933, "name": "Severance", "premiered": "2022-02-18" } },
        { "score": 0.4, "show": { "id": 1, "name": "Severance Pay", "premiered": null } }
    ]))
    .into_response()
}

async fn tvmaze_episodes(Path(id): Path<u64>) -> Response {
    if id != 44933 {
        return StatusCode::NOT_FOUND.into_response();
    }
    let episodes: Vec<_> = [(0, 1), (1, 9), (2, 10)]
        .iter()
        .flat_map(|&(season, count)| (1..=count).map(move |n| json!({ "season": season, "number": n })))
        .collect();
    Json(json!(episodes)).into_response()
}

async fn tvmaze(throttled_first: usize, retry_after: &'static str) -> (String, Arc<AtomicUsize>) {
    let searches = Arc::new(AtomicUsize::new(0));
    let state = TvMazeState {
        throttled_first,
        retry_after,
        searches: searches.clone(),
    };
    let router = Router::new()
        .route("/search/shows", get(tvmaze_search))
        .route("/shows/:id/episodes", get(tvmaze_episodes))
        .with_state(state);
    (spawn(router).await, searches)
}

fn tvmaze_client(base_url: &str, max_retries: u32) -> TvMazeClient {
    TvMazeClient::new(&TvMazeConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    })
    .unwrap()
}

#[tokio::test]
async fn plex_connect_with_valid_token() {
    let base = spawn(plex_router()).await;
    let plex = PlexClient::connect(&plex_config(&base, Some(TOKEN))).await.unwrap();
    let section = plex.section("tv shows").await.unwrap();
    assert_eq!(section.key, "2");
}

#[tokio::test]
async fn plex_rejects_bad_token() {
    let base = spawn(plex_router()).await;
    let err = PlexClient::connect(&plex_config(&base, Some("wrong"))).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Unauthorized { status: 401 }));

    let err = PlexClient::connect(&plex_config(&base, None)).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Unauthorized { .. }));
}

#[tokio::test]
async fn plex_unknown_section_lists_available() {
    let base = spawn(plex_router()).await;
    let plex = PlexClient::connect(&plex_config(&base, Some(TOKEN))).await.unwrap();
    match plex.section("Anime").await.unwrap_err() {
        ConnectionError::SectionNotFound { available, .. } => {
            assert_eq!(available, vec!["Movies".to_string(), "TV Shows".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn plex_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = PlexClient::connect(&plex_config(&base, Some(TOKEN))).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Unreachable { .. }));
}

#[tokio::test]
async fn plex_counts_episodes_without_leaf_count() {
    let base = spawn(plex_router()).await;
    let plex = PlexClient::new(&plex_config(&base, Some(TOKEN))).unwrap();
    let seasons = plex.show_seasons("10").await.unwrap();
    assert_eq!(
        seasons,
        vec![
            SeasonCount { season_number: 1, episodes: 8 },
            SeasonCount { season_number: 2, episodes: 3 },
            SeasonCount { season_number: 0, episodes: 1 },
        ]
    );

    let err = plex.show_seasons("missing").await.unwrap_err();
    assert!(matches!(err, ConnectionError::UnexpectedStatus { status: 404, .. }));
}

#[tokio::test]
async fn tvmaze_resolves_season_totals() {
    let (base, _) = tvmaze(0, "0").await;
    let client = tvmaze_client(&base, 2);
    let show = resolve_totals(&client, "Severance", Some(2022)).await.unwrap();
    assert_eq!(show.id, 44933);
    assert_eq!(show.totals, SeasonTotals::from([(1, 9), (2, 10)]));

    let err = resolve_totals(&client, "Nothing Here", None).await.unwrap_err();
    assert_eq!(err, MetadataError::NotFound("Nothing Here".to_string()));
}

#[tokio::test]
async fn tvmaze_retries_after_rate_limit() {
    let (base, searches) = tvmaze(2, "0").await;
    let client = tvmaze_client(&base, 3);
    let hits = client.search_shows("Severance").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].premiered_year, Some(2022));
    assert_eq!(hits[1].premiered_year, None);
    assert_eq!(searches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tvmaze_gives_up_after_max_retries() {
    let (base, searches) = tvmaze(usize::MAX, "0").await;
    let client = tvmaze_client(&base, 2);
    let err = client.search_shows("Severance").await.unwrap_err();
    assert_eq!(err, MetadataError::RateLimited { attempts: 3 });
    assert_eq!(searches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tvmaze_caps_long_retry_after() {
    let (base, searches) = tvmaze(1, "3600").await;
    let client = tvmaze_client(&base, 3);
    let started = std::time::Instant::now();
    let hits = tokio::time::timeout(Duration::from_secs(5), client.search_shows("Severance"))
        .await
        .expect("retry delay should be capped at max_delay")
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(searches.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_secs(5));
}
