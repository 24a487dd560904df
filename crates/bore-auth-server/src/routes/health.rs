//! Health check endpoint.

use axum::{Router, routing::get};

use crate::state::AppState;

/// Liveness check. Does not touch upstreams.
pub async fn health() -> &'static str {
    "ok"
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(health))
}
