//! Route definitions.

use super::{
    handlers::{health_handler, metrics_handler, AppState},
    websocket::websocket_handler,
};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Game channel
        .route("/ws", get(websocket_handler))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Attach shared state
        .with_state(state)
}
