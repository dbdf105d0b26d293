//! # gatehouse-api
//!
//! HTTP layer for Gatehouse built on Axum.
//!
//! Exposes the token-authenticated WebSocket upgrade that feeds the realtime
//! hub, health endpoints, and the mapping from domain errors to responses.

pub mod app;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
