//! Connection manager: connection lifecycle, subscriptions and message routing.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use gatehouse_core::config::RealtimeConfig;
use gatehouse_core::types::{SocketId, UserId};

use crate::error::HubError;
use crate::message::serializer::deserialize_control;
use crate::message::validator::{validate_inbound, validate_stream_name};
use crate::message::{ControlAction, HubEvent, MessageEnvelope};
use crate::metrics::RealtimeMetrics;
use crate::stream::{StreamAccess, StreamName, StreamPolicy, StreamRegistry};

use super::handle::{AuthenticatedClient, ConnectionHandle};
use super::pool::ConnectionPool;

/// Why a connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The client closed the socket.
    ClientClosed,
    /// The outbound queue overflowed.
    Saturated,
    /// No pong arrived within the pong timeout.
    PongTimeout,
    /// Evicted to make room under the per-user connection cap.
    Replaced,
    /// Reading from or writing to the transport failed.
    TransportError,
    /// The hub is shutting down.
    Shutdown,
    /// Closed by the server for any other reason.
    ServerClosed,
}

impl DisconnectReason {
    /// Return the reason identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Saturated => "saturated",
            Self::PongTimeout => "pong_timeout",
            Self::Replaced => "replaced",
            Self::TransportError => "transport_error",
            Self::Shutdown => "shutdown",
            Self::ServerClosed => "server_closed",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle notifications for presence-aware components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection was registered.
    Connected {
        /// Socket ID.
        socket_id: SocketId,
        /// Owning user.
        user_id: UserId,
    },
    /// A connection was torn down.
    Disconnected {
        /// Socket ID.
        socket_id: SocketId,
        /// Owning user.
        user_id: UserId,
        /// Why it was torn down.
        reason: DisconnectReason,
        /// Whether the user has no connections left.
        last_for_user: bool,
    },
}

/// A stream a subscribe request could not be granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedStream {
    /// The stream name as sent by the client.
    pub stream: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Result of a subscribe request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOutcome {
    /// Streams now subscribed (including ones that already were).
    pub confirmed: Vec<StreamName>,
    /// Streams refused.
    pub rejected: Vec<RejectedStream>,
}

/// Manages all live hub connections.
pub struct ConnectionManager {
    /// Connection pool.
    pool: ConnectionPool,
    /// Stream registry.
    streams: Arc<StreamRegistry>,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
    /// Authorizes delegated streams, registered once at startup.
    access: OnceLock<Arc<dyn StreamAccess>>,
    /// Lifecycle event channel.
    lifecycle: broadcast::Sender<ConnectionEvent>,
    /// Configuration.
    config: RealtimeConfig,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.pool.connection_count())
            .field("streams", &self.streams.stream_count())
            .field("access_registered", &self.access.get().is_some())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        streams: Arc<StreamRegistry>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let (lifecycle, _) = broadcast::channel(config.lifecycle_buffer_size.max(1));
        Self {
            pool: ConnectionPool::new(),
            streams,
            metrics,
            access: OnceLock::new(),
            lifecycle,
            config,
        }
    }

    /// Registers the hook that authorizes `session:` and `chat:` streams.
    pub fn set_stream_access(&self, access: Arc<dyn StreamAccess>) {
        if self.access.set(access).is_err() {
            warn!("Stream access hook already registered, ignoring replacement");
        }
    }

    /// Subscribes to connection lifecycle events.
    pub fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.lifecycle.subscribe()
    }

    /// Registers a new authenticated connection.
    ///
    /// Returns the connection handle and the receiver its writer task drains.
    /// Initial streams the client may not see are skipped.
    pub async fn connect(
        &self,
        client: AuthenticatedClient,
        initial_streams: &[StreamName],
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<MessageEnvelope>>) {
        let existing = self.pool.get_user_connections(&client.user_id);
        if existing.len() >= self.config.max_connections_per_user {
            warn!(
                user_id = %client.user_id,
                count = existing.len(),
                max = self.config.max_connections_per_user,
                "User at max connections, oldest will be replaced"
            );
            let excess = existing.len() + 1 - self.config.max_connections_per_user.max(1);
            for oldest in existing.iter().take(excess) {
                self.disconnect(oldest.id, DisconnectReason::Replaced);
            }
        }

        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity.max(1));
        let handle = Arc::new(ConnectionHandle::new(client, tx));

        self.pool.add(handle.clone());
        self.metrics.record_connect();
        let _ = self.lifecycle.send(ConnectionEvent::Connected {
            socket_id: handle.id,
            user_id: handle.user_id(),
        });

        info!(
            conn_id = %handle.id,
            user_id = %handle.user_id(),
            username = %handle.client.username,
            "Hub connection registered"
        );

        for stream in initial_streams {
            if let Err(e) = self.subscribe_handle(&handle, stream.clone()).await {
                warn!(
                    conn_id = %handle.id,
                    stream = %stream,
                    error = %e,
                    "Skipping initial stream"
                );
            }
        }

        (handle, rx)
    }

    /// Tears a connection down. Idempotent; returns `false` if it was already gone.
    pub fn disconnect(&self, socket_id: SocketId, reason: DisconnectReason) -> bool {
        let Some((handle, remaining)) = self.pool.remove(&socket_id) else {
            return false;
        };

        handle.close();
        self.streams.unsubscribe_all(socket_id);
        self.metrics.record_disconnect();
        match reason {
            DisconnectReason::Saturated => self.metrics.record_slow_consumer(),
            DisconnectReason::PongTimeout => self.metrics.record_pong_timeout(),
            _ => {}
        }

        let _ = self.lifecycle.send(ConnectionEvent::Disconnected {
            socket_id,
            user_id: handle.user_id(),
            reason,
            last_for_user: remaining == 0,
        });

        info!(
            conn_id = %socket_id,
            user_id = %handle.user_id(),
            reason = %reason,
            "Hub connection unregistered"
        );
        true
    }

    /// Processes an inbound text frame from a client.
    ///
    /// Malformed frames are logged and ignored; they never close the connection.
    pub async fn handle_inbound(&self, socket_id: SocketId, raw: &str) {
        self.metrics.record_received();

        let Some(handle) = self.pool.get(&socket_id) else {
            warn!(conn_id = %socket_id, "Frame from unknown connection");
            return;
        };

        if let Err(e) = validate_inbound(raw) {
            self.metrics.record_ignored();
            warn!(conn_id = %socket_id, error = %e, "Ignoring inbound frame");
            return;
        }

        let frame = match deserialize_control(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_ignored();
                warn!(conn_id = %socket_id, error = %e, "Ignoring malformed control frame");
                return;
            }
        };

        match frame.action {
            ControlAction::Subscribe => {
                let outcome = self.subscribe(socket_id, &frame.streams).await;
                self.acknowledge(&handle, &outcome);
            }
            ControlAction::Unsubscribe => {
                self.unsubscribe(socket_id, &frame.streams);
            }
            ControlAction::Ping => {
                handle.record_pong().await;
                let pong = MessageEnvelope::system(
                    "pong",
                    json!({ "ts": chrono::Utc::now().timestamp_millis() }),
                );
                self.deliver(&handle, Arc::new(pong));
            }
        }
    }

    /// Subscribes a connection to the named streams, checking policy for each.
    pub async fn subscribe(&self, socket_id: SocketId, streams: &[String]) -> SubscriptionOutcome {
        let mut outcome = SubscriptionOutcome::default();
        let Some(handle) = self.pool.get(&socket_id) else {
            outcome.rejected = streams
                .iter()
                .map(|stream| RejectedStream {
                    stream: stream.clone(),
                    reason: HubError::UnknownConnection(socket_id).to_string(),
                })
                .collect();
            return outcome;
        };

        for raw in streams {
            let result = match validate_stream_name(raw) {
                Ok(()) => {
                    let stream = StreamName::parse(raw);
                    self.subscribe_handle(&handle, stream.clone())
                        .await
                        .map(|_| stream)
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(stream) => outcome.confirmed.push(stream),
                Err(e) => {
                    debug!(conn_id = %socket_id, stream = %raw, error = %e, "Subscription rejected");
                    outcome.rejected.push(RejectedStream {
                        stream: raw.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Unsubscribes a connection from the named streams.
    pub fn unsubscribe(&self, socket_id: SocketId, streams: &[String]) {
        for raw in streams {
            let stream = StreamName::parse(raw);
            if self.streams.unsubscribe(&stream, socket_id) {
                debug!(conn_id = %socket_id, stream = %stream, "Unsubscribed from stream");
            }
        }
    }

    /// Subscribes every live connection of a user to the given streams.
    ///
    /// Used for server-side grants (e.g. a share invite) where the caller
    /// has already authorized the user. Returns the number of new subscriptions.
    pub fn subscribe_user(&self, user_id: UserId, streams: &[StreamName]) -> usize {
        let mut added = 0;
        for handle in self.pool.get_user_connections(&user_id) {
            for stream in streams {
                if self.streams.subscription_count(handle.id)
                    >= self.config.max_subscriptions_per_connection
                {
                    warn!(
                        conn_id = %handle.id,
                        stream = %stream,
                        "Subscription limit reached, skipping server-side grant"
                    );
                    continue;
                }
                if self.streams.subscribe(stream.clone(), handle.id) {
                    self.metrics.record_subscribe();
                    added += 1;
                }
            }
            if !handle.is_alive() {
                self.streams.unsubscribe_all(handle.id);
            }
        }
        added
    }

    /// Removes the given streams from every connection of a user.
    pub fn unsubscribe_user(&self, user_id: UserId, streams: &[StreamName]) -> usize {
        let mut removed = 0;
        for handle in self.pool.get_user_connections(&user_id) {
            for stream in streams {
                if self.streams.unsubscribe(stream, handle.id) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drops every subscriber of a stream and tells them the stream is gone.
    pub fn close_stream(&self, stream: &StreamName) -> usize {
        let sockets = self.streams.close_stream(stream);
        if sockets.is_empty() {
            return 0;
        }
        let notice = Arc::new(MessageEnvelope::system(
            "stream.closed",
            json!({ "stream": stream.to_string() }),
        ));
        for socket_id in &sockets {
            if let Some(handle) = self.pool.get(socket_id) {
                self.deliver(&handle, notice.clone());
            }
        }
        debug!(stream = %stream, subscribers = sockets.len(), "Stream closed");
        sockets.len()
    }

    /// Sends an event to a user's connections subscribed to `stream`.
    ///
    /// Never blocks. Returns the number of connections the event was queued to.
    pub fn broadcast_to_user(&self, stream: &StreamName, user_id: UserId, event: HubEvent) -> usize {
        let envelope = Arc::new(MessageEnvelope::new(stream.clone(), event));
        self.deliver_to_user(stream, user_id, &envelope)
    }

    /// Sends an event to each listed user's connections subscribed to `stream`.
    pub fn broadcast_to_users(
        &self,
        stream: &StreamName,
        user_ids: &[UserId],
        event: HubEvent,
    ) -> usize {
        let envelope = Arc::new(MessageEnvelope::new(stream.clone(), event));
        let mut seen = HashSet::new();
        user_ids
            .iter()
            .filter(|user_id| seen.insert(**user_id))
            .map(|user_id| self.deliver_to_user(stream, *user_id, &envelope))
            .sum()
    }

    /// Sends an event to every subscriber of `stream`.
    pub fn broadcast_stream(&self, stream: &StreamName, event: HubEvent) -> usize {
        let subscribers = self.streams.subscribers(stream);
        if subscribers.is_empty() {
            return 0;
        }
        let envelope = Arc::new(MessageEnvelope::new(stream.clone(), event));
        subscribers
            .iter()
            .filter_map(|socket_id| self.pool.get(socket_id))
            .filter(|handle| self.deliver(handle, envelope.clone()))
            .count()
    }

    /// Closes all connections.
    pub fn close_all(&self, reason: DisconnectReason) -> usize {
        let all = self.pool.all_connections();
        let closed = all
            .iter()
            .filter(|handle| self.disconnect(handle.id, reason))
            .count();
        info!(count = closed, reason = %reason, "All hub connections closed");
        closed
    }

    /// Returns a connection by socket ID.
    pub fn get(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        self.pool.get(socket_id)
    }

    /// Returns a user's live connections, oldest first.
    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.pool.get_user_connections(user_id)
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Returns the number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.pool.user_count()
    }

    /// Checks if a user is currently connected.
    pub fn is_user_connected(&self, user_id: &UserId) -> bool {
        !self.pool.get_user_connections(user_id).is_empty()
    }

    /// Returns the stream registry.
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &Arc<RealtimeMetrics> {
        &self.metrics
    }

    /// Returns the hub configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Checks whether a client may subscribe to a stream.
    async fn authorize(&self, client: &AuthenticatedClient, stream: &StreamName) -> bool {
        match stream.policy() {
            StreamPolicy::Open => true,
            StreamPolicy::AdminOnly => client.role.is_admin(),
            StreamPolicy::Delegated => match self.access.get() {
                Some(access) => access.may_subscribe(client.user_id, stream).await,
                None => false,
            },
        }
    }

    async fn subscribe_handle(
        &self,
        handle: &Arc<ConnectionHandle>,
        stream: StreamName,
    ) -> Result<(), HubError> {
        if self.streams.is_subscribed(&stream, handle.id) {
            return Ok(());
        }
        if self.streams.subscription_count(handle.id) >= self.config.max_subscriptions_per_connection
        {
            return Err(HubError::SubscriptionLimit(
                self.config.max_subscriptions_per_connection,
            ));
        }
        if !self.authorize(&handle.client, &stream).await {
            return Err(HubError::StreamForbidden(stream.to_string()));
        }

        self.streams.subscribe(stream.clone(), handle.id);
        // The connection may have been torn down while authorization was pending.
        if !handle.is_alive() {
            self.streams.unsubscribe(&stream, handle.id);
            return Err(HubError::UnknownConnection(handle.id));
        }
        self.metrics.record_subscribe();
        debug!(conn_id = %handle.id, stream = %stream, "Subscribed to stream");
        Ok(())
    }

    fn acknowledge(&self, handle: &Arc<ConnectionHandle>, outcome: &SubscriptionOutcome) {
        if !outcome.confirmed.is_empty() {
            let ack = MessageEnvelope::system(
                "subscription.confirmed",
                json!({ "streams": outcome.confirmed }),
            );
            self.deliver(handle, Arc::new(ack));
        }
        if !outcome.rejected.is_empty() {
            let nack = MessageEnvelope::system(
                "subscription.rejected",
                json!({ "streams": outcome.rejected }),
            );
            self.deliver(handle, Arc::new(nack));
        }
    }

    fn deliver_to_user(
        &self,
        stream: &StreamName,
        user_id: UserId,
        envelope: &Arc<MessageEnvelope>,
    ) -> usize {
        self.pool
            .get_user_connections(&user_id)
            .iter()
            .filter(|handle| self.streams.is_subscribed(stream, handle.id))
            .filter(|handle| self.deliver(handle, envelope.clone()))
            .count()
    }

    /// Enqueues one envelope; a full or closed queue tears the connection down.
    fn deliver(&self, handle: &Arc<ConnectionHandle>, envelope: Arc<MessageEnvelope>) -> bool {
        match handle.try_deliver(envelope) {
            Ok(()) => {
                self.metrics.record_sent();
                true
            }
            Err(HubError::ConnectionSaturated(socket_id)) => {
                self.metrics.record_dropped();
                warn!(
                    conn_id = %socket_id,
                    user_id = %handle.user_id(),
                    capacity = self.config.outbound_queue_capacity,
                    "Outbound queue full, disconnecting slow consumer"
                );
                self.disconnect(socket_id, DisconnectReason::Saturated);
                false
            }
            Err(e) => {
                self.metrics.record_dropped();
                debug!(conn_id = %handle.id, error = %e, "Dropping envelope for closed connection");
                self.disconnect(handle.id, DisconnectReason::TransportError);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatehouse_core::types::{SessionId, UserRole};

    fn manager_with(capacity: usize) -> ConnectionManager {
        let config = RealtimeConfig {
            outbound_queue_capacity: capacity,
            max_connections_per_user: 2,
            ..RealtimeConfig::default()
        };
        ConnectionManager::new(
            config,
            Arc::new(StreamRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        )
    }

    fn client(role: UserRole) -> AuthenticatedClient {
        AuthenticatedClient {
            user_id: UserId::new(),
            username: "erin".to_string(),
            role,
        }
    }

    fn event(name: &str) -> HubEvent {
        HubEvent::new(name, serde_json::Value::Null)
    }

    struct OnlySession(SessionId);

    #[async_trait]
    impl StreamAccess for OnlySession {
        async fn may_subscribe(&self, _user_id: UserId, stream: &StreamName) -> bool {
            stream.session_id() == Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_slow_consumer_is_disconnected_without_blocking() {
        let manager = manager_with(2);
        let mut events = manager.lifecycle_events();
        let (slow, _slow_rx) = manager.connect(client(UserRole::User), &[StreamName::Sessions]).await;
        let (fast, mut fast_rx) = manager.connect(client(UserRole::User), &[StreamName::Sessions]).await;

        // Two fit in each queue; the third overflows the slow consumer.
        assert_eq!(manager.broadcast_stream(&StreamName::Sessions, event("a")), 2);
        assert_eq!(manager.broadcast_stream(&StreamName::Sessions, event("b")), 2);
        fast_rx.recv().await.unwrap();
        fast_rx.recv().await.unwrap();
        assert_eq!(manager.broadcast_stream(&StreamName::Sessions, event("c")), 1);

        assert!(manager.get(&slow.id).is_none());
        assert!(!slow.is_alive());
        assert!(slow.cancellation().is_cancelled());
        assert!(manager.get(&fast.id).is_some());
        assert_eq!(fast_rx.recv().await.unwrap().event, "c");
        assert_eq!(manager.metrics().snapshot().slow_consumer_disconnects, 1);

        let mut saw_saturated = false;
        while let Ok(evt) = events.try_recv() {
            if let ConnectionEvent::Disconnected { socket_id, reason, last_for_user, .. } = evt {
                assert_eq!(socket_id, slow.id);
                assert_eq!(reason, DisconnectReason::Saturated);
                assert!(last_for_user);
                saw_saturated = true;
            }
        }
        assert!(saw_saturated);
    }

    #[tokio::test]
    async fn test_user_broadcast_only_reaches_subscribed_connections() {
        let manager = manager_with(8);
        let user = client(UserRole::User);
        let (_tab_a, mut rx_a) = manager.connect(user.clone(), &[StreamName::Sessions]).await;
        let (_tab_b, mut rx_b) = manager.connect(user.clone(), &[]).await;

        let sent = manager.broadcast_to_user(&StreamName::Sessions, user.user_id, event("session.opened"));
        assert_eq!(sent, 1);
        assert_eq!(rx_a.recv().await.unwrap().event, "session.opened");
        assert!(rx_b.try_recv().is_err());

        assert_eq!(
            manager.broadcast_to_user(&StreamName::Sessions, UserId::new(), event("x")),
            0
        );
    }

    #[tokio::test]
    async fn test_multi_user_broadcast_dedupes_users() {
        let manager = manager_with(8);
        let alice = client(UserRole::User);
        let bob = client(UserRole::User);
        let (_alice_a, mut rx_alice_a) = manager.connect(alice.clone(), &[StreamName::Sessions]).await;
        let (_alice_b, mut rx_alice_b) = manager.connect(alice.clone(), &[StreamName::Sessions]).await;
        let (_bob_tab, mut rx_bob) = manager.connect(bob.clone(), &[StreamName::Sessions]).await;
        let (_bob_idle, mut rx_bob_idle) = manager.connect(bob.clone(), &[]).await;

        let stranger = UserId::new();
        let sent = manager.broadcast_to_users(
            &StreamName::Sessions,
            &[alice.user_id, bob.user_id, alice.user_id, stranger, bob.user_id],
            event("session.shared"),
        );
        assert_eq!(sent, 3);

        for rx in [&mut rx_alice_a, &mut rx_alice_b, &mut rx_bob] {
            assert_eq!(rx.recv().await.unwrap().event, "session.shared");
            assert!(rx.try_recv().is_err());
        }
        assert!(rx_bob_idle.try_recv().is_err());

        assert_eq!(
            manager.broadcast_to_users(&StreamName::Sessions, &[stranger], event("x")),
            0
        );
        assert_eq!(manager.broadcast_to_users(&StreamName::Sessions, &[], event("x")), 0);
        assert_eq!(manager.connection_count(), 4);
    }

    #[tokio::test]
    async fn test_admin_stream_requires_admin() {
        let manager = manager_with(8);
        let (user, _rx) = manager.connect(client(UserRole::User), &[]).await;
        let (admin, _admin_rx) = manager.connect(client(UserRole::Admin), &[]).await;

        let outcome = manager
            .subscribe(user.id, &["admin:sessions".to_string(), "sessions".to_string()])
            .await;
        assert_eq!(outcome.confirmed, vec![StreamName::Sessions]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].stream, "admin:sessions");

        let outcome = manager.subscribe(admin.id, &["admin:sessions".to_string()]).await;
        assert_eq!(outcome.confirmed, vec![StreamName::AdminSessions]);
    }

    #[tokio::test]
    async fn test_session_streams_are_delegated() {
        let manager = manager_with(8);
        let (handle, _rx) = manager.connect(client(UserRole::User), &[]).await;
        let allowed = SessionId::new();
        let stream = format!("session:{allowed}");

        // No hook registered yet: refused.
        let outcome = manager.subscribe(handle.id, &[stream.clone()]).await;
        assert!(outcome.confirmed.is_empty());

        manager.set_stream_access(Arc::new(OnlySession(allowed)));
        let outcome = manager
            .subscribe(handle.id, &[stream, format!("chat:{}", SessionId::new())])
            .await;
        assert_eq!(outcome.confirmed, vec![StreamName::Session(allowed)]);
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_reports_last_connection() {
        let manager = manager_with(8);
        let user = client(UserRole::User);
        let mut events = manager.lifecycle_events();
        let (first, _rx1) = manager.connect(user.clone(), &[]).await;
        let (second, _rx2) = manager.connect(user.clone(), &[]).await;

        assert!(manager.disconnect(first.id, DisconnectReason::ClientClosed));
        assert!(!manager.disconnect(first.id, DisconnectReason::ClientClosed));
        assert!(manager.disconnect(second.id, DisconnectReason::ClientClosed));

        let last_flags: Vec<bool> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|evt| match evt {
                ConnectionEvent::Disconnected { last_for_user, .. } => Some(last_for_user),
                ConnectionEvent::Connected { .. } => None,
            })
            .collect();
        assert_eq!(last_flags, vec![false, true]);
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_cap_replaces_oldest() {
        let manager = manager_with(8);
        let user = client(UserRole::User);
        let (first, _rx1) = manager.connect(user.clone(), &[]).await;
        let (_second, _rx2) = manager.connect(user.clone(), &[]).await;
        let (third, _rx3) = manager.connect(user.clone(), &[]).await;

        assert!(!first.is_alive());
        let ids: Vec<_> = manager.user_connections(&user.user_id).iter().map(|h| h.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&third.id));
    }

    #[tokio::test]
    async fn test_server_side_grants_and_stream_close() {
        let manager = manager_with(8);
        let user = client(UserRole::User);
        let (handle, mut rx) = manager.connect(user.clone(), &[]).await;
        let stream = StreamName::Chat(SessionId::new());

        assert_eq!(manager.subscribe_user(user.user_id, &[stream.clone()]), 1);
        assert_eq!(manager.broadcast_stream(&stream, event("chat.posted")), 1);
        assert_eq!(rx.recv().await.unwrap().event, "chat.posted");

        assert_eq!(manager.close_stream(&stream), 1);
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.stream, StreamName::System);
        assert_eq!(notice.event, "stream.closed");
        assert!(!manager.streams().is_subscribed(&stream, handle.id));
    }

    #[tokio::test]
    async fn test_inbound_frames() {
        let manager = manager_with(8);
        let (handle, mut rx) = manager.connect(client(UserRole::User), &[]).await;

        manager
            .handle_inbound(handle.id, r#"{"action":"subscribe","streams":["notifications"]}"#)
            .await;
        let ack = rx.recv().await.unwrap();
        assert_eq!(ack.event, "subscription.confirmed");
        assert_eq!(ack.data["streams"][0], "notifications");

        manager.handle_inbound(handle.id, "{not json").await;
        manager.handle_inbound(handle.id, r#"{"action":"dance"}"#).await;
        assert!(rx.try_recv().is_err());
        assert!(handle.is_alive());
        assert_eq!(manager.metrics().snapshot().frames_ignored, 2);

        manager.handle_inbound(handle.id, r#"{"action":"ping"}"#).await;
        assert_eq!(rx.recv().await.unwrap().event, "pong");

        manager
            .handle_inbound(handle.id, r#"{"action":"unsubscribe","streams":["notifications"]}"#)
            .await;
        assert_eq!(manager.streams().subscription_count(handle.id), 0);
    }
}
