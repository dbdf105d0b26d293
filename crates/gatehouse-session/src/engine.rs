//! Wires the registry, the collaboration manager and the realtime hub.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gatehouse_core::config::AppConfig;
use gatehouse_core::traits::{PermissionOracle, TeamDirectory};
use gatehouse_core::types::SessionId;
use gatehouse_realtime::RealtimeHub;

use crate::collaboration::CollaborationManager;
use crate::error::SessionError;
use crate::registry::{ActiveSessionRecord, CloseReason, HeartbeatSweeper, SessionRegistry};

/// The session-coordination core.
///
/// Drivers talk to [`registry`](Self::registry), share and chat requests go
/// to [`collaboration`](Self::collaboration), and clients receive the
/// resulting events through the hub.
#[derive(Debug, Clone)]
pub struct CoordinationEngine {
    /// Active-session registry.
    pub registry: Arc<SessionRegistry>,
    /// Share, write delegation and chat.
    pub collaboration: Arc<CollaborationManager>,
    hub: RealtimeHub,
    sweeper: HeartbeatSweeper,
}

impl CoordinationEngine {
    /// Builds the core on top of an existing hub.
    pub fn new(
        config: &AppConfig,
        hub: RealtimeHub,
        oracle: Arc<dyn PermissionOracle>,
        teams: Arc<dyn TeamDirectory>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(hub.connections.clone()));
        let collaboration = Arc::new(CollaborationManager::new(
            hub.connections.clone(),
            oracle,
            teams,
            config.collaboration.clone(),
        ));

        registry.set_lifecycle_hook(collaboration.clone());
        hub.connections.set_stream_access(collaboration.clone());

        let sweeper = HeartbeatSweeper::new(registry.clone(), &config.session);

        Self {
            registry,
            collaboration,
            hub,
            sweeper,
        }
    }

    /// The hub events are published through.
    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    /// Starts the heartbeat sweeper and the disconnect listener.
    ///
    /// Both stop when `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let sweeper = tokio::spawn(self.sweeper.clone().run(cancel.clone()));
        let listener = tokio::spawn(
            self.collaboration
                .clone()
                .run_disconnect_listener(self.hub.connections.lifecycle_events(), cancel),
        );
        info!("Session coordination started");
        vec![sweeper, listener]
    }

    /// Ends a session on behalf of its driver: announces `session.closing`,
    /// then removes it.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<Option<ActiveSessionRecord>, SessionError> {
        match self.registry.mark_closing(session_id).await {
            Ok(_) | Err(SessionError::SessionNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.registry.unregister(session_id, reason).await
    }
}
