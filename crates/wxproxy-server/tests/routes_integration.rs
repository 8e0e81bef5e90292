//! End-to-end route tests: warp test requests against a wiremock provider
//! and a temporary SQLite database.

use std::time::Duration;

use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;
use warp::http::StatusCode;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wxproxy_server::{routes, AppState, SharedState};
use wxproxy_store::{CallRecordStore, ConnectionPool, Database, PoolConfig};
use wxproxy_weather::{CacheProvider, Dispatcher, RetryConfig, UpstreamClient, UpstreamConfig};

const API_KEY: &str = "route-test-key";

struct Harness {
    server: MockServer,
    dir: TempDir,
    state: SharedState,
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("calls.db").to_string_lossy().into_owned()
}

async fn harness_with(api_key: Option<&str>, with_schema: bool) -> Harness {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let db = Database::Pooled(
        ConnectionPool::new(PoolConfig {
            dsn: db_path(&dir),
            min: 1,
            max: 2,
            increment: 1,
            acquire_timeout: Duration::from_secs(1),
        })
        .unwrap(),
    );
    if with_schema {
        db.ensure_schema().await.unwrap();
    }

    let client = UpstreamClient::new(
        UpstreamConfig {
            base_url: Some(format!("{}/v1", server.uri())),
            api_key: api_key.map(str::to_string),
            cache_ttl: Duration::ZERO,
        },
        CacheProvider::Disabled,
    )
    .with_retry_config(RetryConfig::new(2, 10, 50));

    let state = AppState::new(
        Dispatcher::new(client, Duration::from_secs(5)),
        CallRecordStore::new(db),
    );
    Harness { server, dir, state }
}

async fn harness() -> Harness {
    harness_with(Some(API_KEY), true).await
}

async fn get(state: &SharedState, uri: &str) -> (StatusCode, Value) {
    let response = warp::test::request()
        .method("GET")
        .path(uri)
        .reply(&routes(state.clone()))
        .await;
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    (response.status(), body)
}

async fn mock_ok(server: &MockServer, endpoint: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{}", endpoint)))
        .and(query_param("key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn stored(dir: &TempDir) -> Vec<(String, String, Option<String>, Option<String>)> {
    let conn = Connection::open(db_path(dir)).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT location, api_type, params_json, request_url
             FROM weather_api_response ORDER BY id",
        )
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

async fn upstream_calls(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_health_reports_pool() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_pool"]["pool_initialized"], true);
    assert_eq!(body["db_connected"], true);
}

#[tokio::test]
async fn test_hello() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Hello from Weather backend");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Not Found"}));
}

#[tokio::test]
async fn test_current_without_location_is_400() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/weather/current").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "missing 'location' query parameter");
    assert_eq!(upstream_calls(&h.server).await, 0);
}

#[tokio::test]
async fn test_current_success_is_recorded() {
    let h = harness().await;
    mock_ok(&h.server, "current.json", json!({"current": {"temp_c": 31.0}})).await;

    let (status, body) = get(&h.state, "/weather/current?location=Delhi").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["api"], "current");
    assert_eq!(body["data"]["current"]["temp_c"], 31.0);
    assert!(body.get("db_saved").is_none());

    let rows = stored(&h.dir);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "Delhi");
    assert_eq!(rows[0].1, "current");
    assert_eq!(rows[0].2.as_deref(), Some(r#"{"q":"Delhi"}"#));
    let url = rows[0].3.clone().unwrap();
    assert!(!url.contains(API_KEY));
}

#[tokio::test]
async fn test_forecast_records_location_and_days() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast.json"))
        .and(query_param("q", "Delhi"))
        .and(query_param("days", "3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"forecast": {"fake": true}})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = get(&h.state, "/weather/forecast?q=Delhi&days=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "success", "api": "forecast", "data": {"forecast": {"fake": true}}})
    );

    let rows = stored(&h.dir);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "Delhi");
    assert_eq!(rows[0].1, "forecast");
    assert_eq!(rows[0].2.as_deref(), Some(r#"{"days":3,"q":"Delhi"}"#));
}

#[tokio::test]
async fn test_forecast_days_out_of_range_is_400() {
    let h = harness().await;
    let (status, _) = get(&h.state, "/weather/forecast?q=Delhi&days=11").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(upstream_calls(&h.server).await, 0);
}

#[tokio::test]
async fn test_history_invalid_date_never_calls_upstream() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/weather/history?q=Delhi&dt=2024-13-45").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "dt must be in YYYY-MM-DD format");
    assert_eq!(upstream_calls(&h.server).await, 0);
}

#[tokio::test]
async fn test_marine_coordinates_become_q() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/v1/marine.json"))
        .and(query_param("q", "12.3,45.6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"forecast": {}})))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, _) = get(&h.state, "/weather/marine?lat=12.3&lon=45.6").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored(&h.dir)[0].0, "12.3,45.6");
}

#[tokio::test]
async fn test_generic_unknown_api_is_400() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/weather/api/weather?q=Delhi").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid api_name: weather");
    assert_eq!(upstream_calls(&h.server).await, 0);
}

#[tokio::test]
async fn test_generic_success_without_table_flags_db_error() {
    let h = harness_with(Some(API_KEY), false).await;
    mock_ok(&h.server, "current.json", json!({"current": {}})).await;

    let (status, body) = get(&h.state, "/weather/api/current?q=London").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["api"], "current");
    assert_eq!(body["db_saved"], false);
    assert!(body["db_error"].as_str().unwrap().contains("no such table"));
}

#[tokio::test]
async fn test_generic_success_is_recorded_without_flag() {
    let h = harness().await;
    mock_ok(&h.server, "ip.json", json!({"ip": "8.8.8.8"})).await;

    let (status, body) = get(&h.state, "/weather/api/ip?ip=8.8.8.8").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("db_saved").is_none());
    let rows = stored(&h.dir);
    assert_eq!(rows[0].0, "N/A");
    assert_eq!(rows[0].2.as_deref(), Some(r#"{"q":"8.8.8.8"}"#));
}

#[tokio::test]
async fn test_generic_records_caller_q_not_override() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/v1/ip.json"))
        .and(query_param("q", "8.8.8.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "8.8.8.8"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, _) = get(&h.state, "/weather/api/ip?q=London&ip=8.8.8.8").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored(&h.dir)[0].0, "London");
}

#[tokio::test]
async fn test_upstream_error_is_502() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/v1/search.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 1006, "message": "No matching location found."}
        })))
        .mount(&h.server)
        .await;

    let (status, body) = get(&h.state, "/weather/search?q=zzzz").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("No matching location found."));
    assert!(stored(&h.dir).is_empty());
}

#[tokio::test]
async fn test_missing_api_key_is_generic_500() {
    let h = harness_with(None, true).await;
    let (status, body) = get(&h.state, "/weather/current?location=Delhi").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Internal Server Error");
    assert_eq!(upstream_calls(&h.server).await, 0);
}

#[tokio::test]
async fn test_db_test_connection() {
    let h = harness().await;
    let (status, body) = get(&h.state, "/db/test-connection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_db_test_connection_unconfigured_is_500() {
    let h = harness().await;
    let state = AppState::new(h.state.dispatcher.clone(), CallRecordStore::new(Database::Unconfigured));

    let (status, body) = get(&state, "/db/test-connection").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Database connectivity error");
}
