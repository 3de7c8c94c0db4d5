//! Axum-based HTTP control surface
//!
//! Thin operator interface over the runtime configuration and the latest
//! telemetry. Config updates require the configured bearer token and may
//! run concurrently with the control loop; mutual exclusion lives in
//! [`crate::store::RuntimeConfigHandle`].

use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::store::{RuntimeConfigHandle, TelemetryStore};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub runtime: RuntimeConfigHandle,
    pub store: TelemetryStore,
    pub api_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateBody {
    pub key: String,
    pub value: String,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<ConfigEntry> = state
        .runtime
        .entries()
        .await
        .into_iter()
        .map(|(key, value)| ConfigEntry { key, value })
        .collect();
    Json(entries)
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    if state.api_token.is_empty() {
        // No token configured: updates are refused rather than open
        return false;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t == state.api_token)
        .unwrap_or(false)
}

async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConfigUpdateBody>,
) -> Response {
    if !authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"status": "error", "message": "invalid or missing token"})),
        )
            .into_response();
    }

    match state.runtime.update(&body.key, &body.value).await {
        Ok(updated) => Json(serde_json::json!({
            "status": "success",
            "enabled": if updated.enabled { "ON" } else { "OFF" },
            "max_grid_draw_watts": updated.max_grid_draw_watts,
        }))
        .into_response(),
        Err(HeliosError::Validation { field, message }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "status": "error",
                "field": field,
                "message": message,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"status": "error", "message": e.to_string()})),
        )
            .into_response(),
    }
}

async fn status(State(state): State<AppState>) -> Response {
    let latest = match state.store.latest_charge_status().await {
        Ok(row) => row,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
                .into_response();
        }
    };
    let avg_surplus = match state.store.average_surplus(5).await {
        Ok(avg) => avg,
        Err(e) => {
            get_logger("web").warn(&format!("Average surplus unavailable: {}", e));
            None
        }
    };

    let mut root = serde_json::json!({
        "average_surplus_w_5min": avg_surplus,
    });
    if let Some(row) = latest {
        root["charging_amps"] = serde_json::json!(row.charging_amps);
        root["timestamp"] = serde_json::json!(row.timestamp.to_rfc3339());
        if let Some(level) = row.battery_level {
            root["battery_level"] = serde_json::json!(level);
        }
        if let (Some(lat), Some(lon)) = (row.latitude, row.longitude) {
            root["latitude"] = serde_json::json!(lat);
            root["longitude"] = serde_json::json!(lon);
        }
    }
    Json(root).into_response()
}

/// Build the router; split out so tests can drive it with `oneshot`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/status", get(status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct WebServer {
    state: AppState,
    logger: crate::logging::StructuredLogger,
}

impl WebServer {
    pub fn new(runtime: RuntimeConfigHandle, store: TelemetryStore, api_token: String) -> Self {
        Self {
            state: AppState {
                runtime,
                store,
                api_token,
            },
            logger: get_logger("web"),
        }
    }

    /// Bind and serve until the process stops.
    pub async fn start(&self, host: &str, port: u16) -> Result<()> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| HeliosError::config(format!("Invalid web host: {}", host)))?;
        let addr = SocketAddr::new(ip, port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HeliosError::network(format!("Cannot bind {}: {}", addr, e)))?;
        self.logger.info(&format!("Web interface listening on {}", addr));

        axum::serve(listener, build_router(self.state.clone()))
            .await
            .map_err(|e| HeliosError::network(format!("Web server error: {}", e)))
    }
}
