//! Realtime hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Realtime (WebSocket) hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each connection's outbound envelope queue.
    ///
    /// A broadcast that finds the queue full disconnects the connection.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue_capacity: usize,
    /// Interval between server pings in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Seconds without a pong before the connection is closed.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_seconds: u64,
    /// Maximum simultaneous connections per user (browser tabs).
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    /// Maximum stream subscriptions per connection.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,
    /// Capacity of the connection lifecycle event channel.
    #[serde(default = "default_lifecycle_buffer")]
    pub lifecycle_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue(),
            ping_interval_seconds: default_ping_interval(),
            pong_timeout_seconds: default_pong_timeout(),
            max_connections_per_user: default_max_connections_per_user(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            lifecycle_buffer_size: default_lifecycle_buffer(),
        }
    }
}

impl RealtimeConfig {
    /// Ping interval as a [`Duration`], never shorter than one second.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds.max(1))
    }

    /// Pong timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_seconds)
    }
}

fn default_outbound_queue() -> usize {
    64
}

fn default_ping_interval() -> u64 {
    54
}

fn default_pong_timeout() -> u64 {
    60
}

fn default_max_connections_per_user() -> usize {
    8
}

fn default_max_subscriptions() -> usize {
    128
}

fn default_lifecycle_buffer() -> usize {
    1024
}
