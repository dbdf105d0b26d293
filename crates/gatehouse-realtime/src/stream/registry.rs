//! Stream registry: the set of live streams and their subscribers.

use std::collections::HashSet;

use dashmap::DashMap;

use gatehouse_core::types::SocketId;

use super::subscription::SubscriptionTracker;
use super::types::StreamName;

/// Registry of all streams with at least one subscriber.
///
/// Streams are created lazily on first subscribe and dropped when their
/// last subscriber leaves.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// Stream → subscribed sockets.
    streams: DashMap<StreamName, HashSet<SocketId>>,
    /// Reverse index.
    subscriptions: SubscriptionTracker,
}

impl StreamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection to a stream. Returns `false` if it already was.
    pub fn subscribe(&self, stream: StreamName, socket_id: SocketId) -> bool {
        let inserted = self
            .streams
            .entry(stream.clone())
            .or_default()
            .insert(socket_id);
        if inserted {
            self.subscriptions.add(socket_id, stream);
        }
        inserted
    }

    /// Unsubscribes a connection from a stream. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, stream: &StreamName, socket_id: SocketId) -> bool {
        let removed = self.detach(stream, socket_id);
        self.subscriptions.remove(socket_id, stream);
        removed
    }

    /// Unsubscribes a connection from every stream it holds.
    pub fn unsubscribe_all(&self, socket_id: SocketId) -> HashSet<StreamName> {
        let streams = self.subscriptions.remove_all(socket_id);
        for stream in &streams {
            self.detach(stream, socket_id);
        }
        streams
    }

    /// Drops a stream entirely, returning the sockets that were subscribed.
    pub fn close_stream(&self, stream: &StreamName) -> Vec<SocketId> {
        let sockets: Vec<SocketId> = self
            .streams
            .remove(stream)
            .map(|(_, subscribers)| subscribers.into_iter().collect())
            .unwrap_or_default();
        for socket_id in &sockets {
            self.subscriptions.remove(*socket_id, stream);
        }
        sockets
    }

    /// Returns all subscriber sockets of a stream.
    pub fn subscribers(&self, stream: &StreamName) -> Vec<SocketId> {
        self.streams
            .get(stream)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns whether a connection is subscribed to a stream.
    pub fn is_subscribed(&self, stream: &StreamName, socket_id: SocketId) -> bool {
        self.subscriptions.contains(socket_id, stream)
    }

    /// Returns the subscription count for a connection.
    pub fn subscription_count(&self, socket_id: SocketId) -> usize {
        self.subscriptions.count(socket_id)
    }

    /// Returns the subscriber count for a stream.
    pub fn subscriber_count(&self, stream: &StreamName) -> usize {
        self.streams
            .get(stream)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Returns the number of live streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn detach(&self, stream: &StreamName, socket_id: SocketId) -> bool {
        let mut removed = false;
        let mut now_empty = false;
        if let Some(mut subscribers) = self.streams.get_mut(stream) {
            removed = subscribers.remove(&socket_id);
            now_empty = subscribers.is_empty();
        }
        if now_empty {
            self.streams.remove_if(stream, |_, subscribers| subscribers.is_empty());
        }
        removed
    }
}
