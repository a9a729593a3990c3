//! Recbridge Server - HTTP and WebSocket surface
//!
//! Wires the gateway, sync use cases, fan-out, and telemetry into an axum
//! application:
//! - `/rpc/{operation}` and `/rpc/batch` - the RPC gateway
//! - `/sync/*` - delta pull and sync-state management
//! - `/offline-sync/*` - offline push and conflict resolution
//! - `/webhooks/receive` - real-time push ingress from the upstream
//! - `/ws/{user_id}` - WebSocket fan-out channel
//! - `/health`, `/metrics` - operational endpoints

pub mod auth;
pub mod error;
pub mod fanout;
pub mod routes;
pub mod state;

pub use fanout::FanoutManager;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/rpc/batch", post(routes::rpc::batch))
        .route("/rpc/{operation}", post(routes::rpc::execute))
        .route("/sync/pull", post(routes::sync::pull))
        .route("/sync/state", get(routes::sync::state))
        .route("/sync/reset", post(routes::sync::reset))
        .route("/offline-sync/push", post(routes::offline::push))
        .route(
            "/offline-sync/resolve-conflicts",
            post(routes::offline::resolve_conflicts),
        )
        .route("/webhooks/receive", post(routes::webhook::receive))
        .route("/ws/{user_id}", get(routes::ws::upgrade))
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
