//! Shared helpers for session coordination integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gatehouse_core::config::AppConfig;
use gatehouse_core::types::{UserId, UserRole};
use gatehouse_realtime::{AuthenticatedClient, MessageEnvelope, RealtimeHub, StreamName};
use gatehouse_session::{CoordinationEngine, GrantTable, StaticTeamDirectory};

/// A running coordination core with its collaborators exposed.
pub struct TestCore {
    pub engine: CoordinationEngine,
    pub grants: Arc<GrantTable>,
    pub teams: Arc<StaticTeamDirectory>,
    pub cancel: CancellationToken,
}

impl TestCore {
    /// Builds and starts a core with default configuration.
    pub fn start() -> Self {
        Self::start_with(AppConfig::default())
    }

    /// Builds and starts a core with the given configuration.
    pub fn start_with(config: AppConfig) -> Self {
        let hub = RealtimeHub::new(&config.realtime, &config.auth);
        let grants = Arc::new(GrantTable::new());
        let teams = Arc::new(StaticTeamDirectory::new());
        let engine = CoordinationEngine::new(&config, hub, grants.clone(), teams.clone());
        let cancel = CancellationToken::new();
        engine.start(cancel.clone());
        Self {
            engine,
            grants,
            teams,
            cancel,
        }
    }

    /// Opens a hub connection for a user.
    pub async fn connect(&self, user_id: UserId, streams: &[StreamName]) -> Client {
        let client = AuthenticatedClient {
            user_id,
            username: format!("user-{user_id}"),
            role: UserRole::User,
        };
        let (handle, outbound) = self
            .engine
            .hub()
            .connections
            .connect(client, streams)
            .await;
        Client {
            socket_id: handle.id,
            outbound,
        }
    }
}

impl Drop for TestCore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The receiving end of one hub connection.
pub struct Client {
    pub socket_id: gatehouse_core::types::SocketId,
    outbound: mpsc::Receiver<Arc<MessageEnvelope>>,
}

impl Client {
    /// Waits for the next envelope named `event`, skipping others.
    pub async fn expect(&mut self, event: &str) -> Arc<MessageEnvelope> {
        let deadline = Duration::from_secs(2);
        loop {
            let envelope = tokio::time::timeout(deadline, self.outbound.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
                .unwrap_or_else(|| panic!("connection closed while waiting for {event}"));
            if envelope.event == event {
                return envelope;
            }
        }
    }

    /// Drains everything queued so far.
    pub fn drain(&mut self) -> Vec<Arc<MessageEnvelope>> {
        let mut envelopes = Vec::new();
        while let Ok(envelope) = self.outbound.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }
}
