//! HTTP control surface tests driven through the router with `oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helios::store::{NewChargeStatus, RuntimeConfig, RuntimeConfigHandle, TelemetryStore};
use helios::web::{build_router, AppState};
use http_body_util::BodyExt;
use tower::ServiceExt;

const API_TOKEN: &str = "test-token";

async fn test_state(api_token: &str) -> AppState {
    let store = TelemetryStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store");
    let runtime = RuntimeConfigHandle::load_or_seed(
        store.clone(),
        RuntimeConfig {
            enabled: true,
            max_grid_draw_watts: 0.0,
        },
    )
    .await
    .expect("runtime config");
    AppState {
        runtime,
        store,
        api_token: api_token.to_string(),
    }
}

async fn test_router() -> (Router, AppState) {
    let state = test_state(API_TOKEN).await;
    (build_router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn update_request(token: Option<&str>, key: &str, value: &str) -> Request<Body> {
    let body = serde_json::json!({"key": key, "value": value}).to_string();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/config")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (router, _) = test_router().await;
    let response = router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn config_lists_the_runtime_entries() {
    let (router, _) = test_router().await;
    let response = router
        .oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = body_json(response).await;
    let keys: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"enabled"));
    assert!(keys.contains(&"max_grid_draw_watts"));
}

#[tokio::test]
async fn update_without_token_is_unauthorized() {
    let (router, state) = test_router().await;
    let response = router
        .oneshot(update_request(None, "enabled", "OFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.runtime.get().await.enabled);
}

#[tokio::test]
async fn update_with_wrong_token_is_unauthorized() {
    let (router, _) = test_router().await;
    let response = router
        .oneshot(update_request(Some("wrong"), "enabled", "OFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_configured_token_refuses_updates() {
    let state = test_state("").await;
    let router = build_router(state);
    let response = router
        .oneshot(update_request(Some(""), "enabled", "OFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_value_is_a_bad_request() {
    let (router, state) = test_router().await;
    let response = router
        .oneshot(update_request(Some(API_TOKEN), "enabled", "maybe"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["field"], "enabled");
    assert!(state.runtime.get().await.enabled);
}

#[tokio::test]
async fn authorized_update_applies_and_persists() {
    let (router, state) = test_router().await;
    let response = router
        .clone()
        .oneshot(update_request(Some(API_TOKEN), "max_grid_draw_watts", "300"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["max_grid_draw_watts"], serde_json::json!(300.0));

    let persisted = state.store.load_runtime_config().await.unwrap().unwrap();
    assert!((persisted.max_grid_draw_watts - 300.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn status_reports_the_latest_telemetry() {
    let (router, state) = test_router().await;
    state
        .store
        .append_charge_status(&NewChargeStatus {
            charging_amps: 8,
            latitude: Some(45.46),
            longitude: Some(9.18),
            battery_level: Some(64),
        })
        .await
        .unwrap();
    state
        .store
        .append_energy_balance(4000.0, -2000.0, 2000.0)
        .await
        .unwrap();

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["charging_amps"], serde_json::json!(8));
    assert_eq!(body["battery_level"], serde_json::json!(64));
    assert_eq!(body["average_surplus_w_5min"], serde_json::json!(2000.0));
}

#[tokio::test]
async fn status_reports_store_failures() {
    let (router, state) = test_router().await;
    state.store.close().await;

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn status_on_an_empty_store_is_still_ok() {
    let (router, _) = test_router().await;
    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["average_surplus_w_5min"].is_null());
    assert!(body.get("charging_amps").is_none());
}
