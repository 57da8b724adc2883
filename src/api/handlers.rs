//! Request handlers and shared application state.

use crate::bets::engine::BettingEngine;
use crate::game::round::GameLobby;
use crate::metrics::MetricsRegistry;
use crate::session::{AccountService, SessionStore};
use crate::store::GameStore;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub lobby: Arc<GameLobby>,
    pub betting: Arc<BettingEngine>,
    pub sessions: SessionStore,
    pub accounts: Arc<dyn AccountService>,
    pub store: Arc<dyn GameStore>,
    pub metrics: Arc<MetricsRegistry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /metrics - Prometheus exposition format
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.to_prometheus_format()
}
