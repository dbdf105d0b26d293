//! Health check handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use gatehouse_realtime::metrics::MetricsSnapshot;

use crate::state::AppState;

/// Basic liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Liveness plus hub and session counters.
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub ws_connections: usize,
    pub online_users: usize,
    pub active_sessions: usize,
    pub shared_sessions: usize,
    pub realtime: MetricsSnapshot,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// GET /api/health/detailed
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let connections = &state.hub.connections;
    Json(DetailedHealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        ws_connections: connections.connection_count(),
        online_users: connections.user_count(),
        active_sessions: state.engine.registry.len().await,
        shared_sessions: state.engine.collaboration.session_count(),
        realtime: state.hub.metrics_snapshot(),
    })
}
