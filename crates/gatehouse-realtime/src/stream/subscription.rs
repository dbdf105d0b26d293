//! Subscription tracking: which streams each connection is subscribed to.

use std::collections::HashSet;

use dashmap::DashMap;

use gatehouse_core::types::SocketId;

use super::types::StreamName;

/// Tracks connection-to-stream subscription mappings (reverse index).
#[derive(Debug)]
pub struct SubscriptionTracker {
    /// Socket ID → set of stream names.
    socket_to_streams: DashMap<SocketId, HashSet<StreamName>>,
}

impl SubscriptionTracker {
    /// Creates a new subscription tracker.
    pub fn new() -> Self {
        Self {
            socket_to_streams: DashMap::new(),
        }
    }

    /// Records a subscription.
    pub fn add(&self, socket_id: SocketId, stream: StreamName) {
        self.socket_to_streams
            .entry(socket_id)
            .or_default()
            .insert(stream);
    }

    /// Removes a subscription.
    pub fn remove(&self, socket_id: SocketId, stream: &StreamName) {
        if let Some(mut streams) = self.socket_to_streams.get_mut(&socket_id) {
            streams.remove(stream);
        }
    }

    /// Returns whether the connection is subscribed to the stream.
    pub fn contains(&self, socket_id: SocketId, stream: &StreamName) -> bool {
        self.socket_to_streams
            .get(&socket_id)
            .is_some_and(|entry| entry.value().contains(stream))
    }

    /// Returns the number of subscriptions for a connection.
    pub fn count(&self, socket_id: SocketId) -> usize {
        self.socket_to_streams
            .get(&socket_id)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Removes all subscriptions for a connection.
    pub fn remove_all(&self, socket_id: SocketId) -> HashSet<StreamName> {
        self.socket_to_streams
            .remove(&socket_id)
            .map(|(_, streams)| streams)
            .unwrap_or_default()
    }
}

impl Default for SubscriptionTracker {
    fn default() -> Self {
        Self::new()
    }
}
