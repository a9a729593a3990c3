//! Operational endpoints: health and metrics

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health` - liveness plus store reachability
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.cache.exists("health:probe").await.is_ok();
    let status = if store_ok { "ok" } else { "degraded" };
    let code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "version": state.version,
            "store": store_ok,
            "websocket_connections": state.fanout.connection_count(),
        })),
    )
}

/// `GET /metrics` - Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}
