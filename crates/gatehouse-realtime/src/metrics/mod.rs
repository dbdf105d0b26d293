//! Realtime hub metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hub-level metrics counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Connections currently registered
    pub connections_active: AtomicU64,
    /// Envelopes enqueued to a connection
    pub messages_sent: AtomicU64,
    /// Envelopes dropped because a queue was full or closed
    pub messages_dropped: AtomicU64,
    /// Text frames received from clients
    pub messages_received: AtomicU64,
    /// Inbound frames ignored as malformed
    pub frames_ignored: AtomicU64,
    /// Connections torn down for a full outbound queue
    pub slow_consumer_disconnects: AtomicU64,
    /// Connections torn down for a missing pong
    pub pong_timeouts: AtomicU64,
    /// Successful subscribe operations
    pub subscriptions_total: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection
    pub fn record_connect(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnection
    pub fn record_disconnect(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an envelope enqueued for a client
    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope that could not be enqueued
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame received from a client
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an ignored inbound frame
    pub fn record_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a slow-consumer disconnect
    pub fn record_slow_consumer(&self) {
        self.slow_consumer_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pong timeout
    pub fn record_pong_timeout(&self) {
        self.pong_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a subscribe operation
    pub fn record_subscribe(&self) {
        self.subscriptions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            slow_consumer_disconnects: self.slow_consumer_disconnects.load(Ordering::Relaxed),
            pong_timeouts: self.pong_timeouts.load(Ordering::Relaxed),
            subscriptions_total: self.subscriptions_total.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total connections ever established
    pub connections_total: u64,
    /// Currently active connections
    pub connections_active: u64,
    /// Envelopes enqueued
    pub messages_sent: u64,
    /// Envelopes dropped
    pub messages_dropped: u64,
    /// Frames received
    pub messages_received: u64,
    /// Frames ignored
    pub frames_ignored: u64,
    /// Slow-consumer disconnects
    pub slow_consumer_disconnects: u64,
    /// Pong timeouts
    pub pong_timeouts: u64,
    /// Subscribe operations
    pub subscriptions_total: u64,
}
