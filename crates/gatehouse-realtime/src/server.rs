//! Top-level realtime hub that ties the subsystems together.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gatehouse_core::config::{AuthConfig, RealtimeConfig};

use crate::connection::authenticator::WsAuthenticator;
use crate::connection::driver::{WsFrame, serve_connection};
use crate::connection::handle::{AuthenticatedClient, ConnectionHandle};
use crate::connection::heartbeat::HeartbeatConfig;
use crate::connection::manager::{ConnectionManager, DisconnectReason};
use crate::error::HubError;
use crate::message::MessageEnvelope;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::stream::{StreamName, StreamRegistry};

/// A connection accepted by the hub, ready to be driven over a socket.
#[derive(Debug)]
pub struct AcceptedConnection {
    /// The registered connection.
    pub handle: Arc<ConnectionHandle>,
    /// Queue the writer task drains.
    pub outbound: mpsc::Receiver<Arc<MessageEnvelope>>,
}

/// Central realtime hub shared by the HTTP layer and event producers.
#[derive(Clone)]
pub struct RealtimeHub {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Stream registry.
    pub streams: Arc<StreamRegistry>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    /// Token verification.
    authenticator: Arc<WsAuthenticator>,
    /// Liveness settings for every driven connection.
    heartbeat: HeartbeatConfig,
    /// Cancelled on shutdown.
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RealtimeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeHub")
            .field("connections", &self.connections.connection_count())
            .finish()
    }
}

impl RealtimeHub {
    /// Creates a hub with all subsystems.
    pub fn new(config: &RealtimeConfig, auth: &AuthConfig) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let streams = Arc::new(StreamRegistry::new());
        let connections = Arc::new(ConnectionManager::new(
            config.clone(),
            streams.clone(),
            metrics.clone(),
        ));

        info!(
            queue_capacity = config.outbound_queue_capacity,
            ping_interval_secs = config.ping_interval_seconds,
            "Realtime hub initialized"
        );

        Self {
            connections,
            streams,
            metrics,
            authenticator: Arc::new(WsAuthenticator::new(auth)),
            heartbeat: HeartbeatConfig::from(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Verifies an upgrade token. Nothing is registered.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedClient, HubError> {
        self.authenticator.authenticate(token)
    }

    /// Authenticates and registers a connection in one step.
    ///
    /// A bad token leaves no trace in the hub.
    pub async fn accept(
        &self,
        token: &str,
        initial_streams: &[StreamName],
    ) -> Result<AcceptedConnection, HubError> {
        let client = self.authenticate(token)?;
        self.admit(client, initial_streams).await
    }

    /// Registers a client whose token was already verified, e.g. before an
    /// HTTP upgrade completed.
    pub async fn admit(
        &self,
        client: AuthenticatedClient,
        initial_streams: &[StreamName],
    ) -> Result<AcceptedConnection, HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::AuthFailed("hub is shutting down".to_string()));
        }
        let (handle, outbound) = self.connections.connect(client, initial_streams).await;
        Ok(AcceptedConnection { handle, outbound })
    }

    /// Drives an accepted connection over a socket until it ends.
    pub async fn serve<S, R, E>(&self, accepted: AcceptedConnection, sink: S, stream: R)
    where
        S: Sink<WsFrame> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<WsFrame, E>> + Unpin,
        E: Display,
    {
        serve_connection(
            self.connections.clone(),
            accepted.handle,
            accepted.outbound,
            sink,
            stream,
            self.heartbeat,
        )
        .await;
    }

    /// Returns a metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Token cancelled when the hub shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Closes every connection and refuses new ones.
    pub fn shutdown(&self) {
        info!("Shutting down realtime hub");
        self.shutdown.cancel();
        self.connections.close_all(DisconnectReason::Shutdown);
        info!("Realtime hub shut down");
    }
}
