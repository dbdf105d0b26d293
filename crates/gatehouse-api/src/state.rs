//! Shared application state passed to all handlers.

use std::sync::Arc;
use std::time::Instant;

use gatehouse_core::config::AppConfig;
use gatehouse_realtime::RealtimeHub;
use gatehouse_session::CoordinationEngine;

/// Application state available to every handler via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Realtime hub.
    pub hub: RealtimeHub,
    /// Session coordination core.
    pub engine: CoordinationEngine,
    /// When the server started.
    pub started_at: Instant,
}

impl AppState {
    /// Creates state around a wired engine; the hub is taken from it.
    pub fn new(config: Arc<AppConfig>, engine: CoordinationEngine) -> Self {
        Self {
            config,
            hub: engine.hub().clone(),
            engine,
            started_at: Instant::now(),
        }
    }
}
