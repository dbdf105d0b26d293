//! Ping/pong liveness for hub connections.

use std::time::Duration;

use gatehouse_core::config::RealtimeConfig;

use super::handle::ConnectionHandle;

/// Heartbeat configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead
    pub pong_timeout: Duration,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

/// Returns whether the connection has been silent for the full pong timeout.
pub async fn pong_overdue(handle: &ConnectionHandle, config: &HeartbeatConfig) -> bool {
    handle.last_pong().await.elapsed() >= config.pong_timeout
}
