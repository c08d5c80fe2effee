use axum::{extract::State, Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Snapshot of relay load returned by `GET /api/stats`.
#[derive(Debug, Serialize)]
pub struct RelayStats {
    pub connections: usize,
    pub rooms: usize,
}

/// GET /api/stats: public endpoint returning live connection and room counts.
async fn relay_stats(State(state): State<AppState>) -> Json<RelayStats> {
    Json(RelayStats {
        connections: state.gateway.connections().len(),
        rooms: state.gateway.rooms().room_count(),
    })
}

/// Build the axum Router: the relay WebSocket at `ws_path` plus health and stats.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    // WebSocket endpoint
    let ws_routes = Router::new().route(ws_path, axum::routing::get(ws_handler::ws_upgrade));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/api/stats", axum::routing::get(relay_stats));

    Router::new()
        .merge(ws_routes)
        .merge(public_routes)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
