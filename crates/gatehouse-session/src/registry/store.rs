//! The active-session registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use gatehouse_core::types::{ConnectionId, SessionId, UserId};
use gatehouse_realtime::{ConnectionManager, HubEvent, StreamName};

use crate::error::SessionError;
use crate::events::{self, SessionClosed, SessionClosing};

use super::record::{
    ActiveSessionRecord, CloseReason, SessionLaunch, SessionScope, SessionStatus, SessionSummary,
};

/// Callbacks into the component that tracks per-session collaboration.
///
/// Invoked while the registry's write lock is held, so implementations
/// must not call back into the registry.
#[async_trait]
pub trait SessionLifecycleHook: Send + Sync + 'static {
    /// A session was registered; create its owner participant.
    fn session_opened(&self, record: &ActiveSessionRecord, chat_enabled: Option<bool>);
    /// A session left the registry; discard its collaboration state and
    /// publish `closed` as the last event on the session's stream.
    async fn session_closed(&self, session_id: SessionId, closed: HubEvent);
    /// Current participant count, owner included.
    fn participant_count(&self, session_id: SessionId) -> usize;
}

struct SessionEntry {
    record: ActiveSessionRecord,
    /// Monotonic twin of `record.last_heartbeat_at`, used for staleness.
    last_seen: Instant,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionEntry>,
    /// One non-closed session per (owner, connection).
    by_owner: HashMap<(UserId, ConnectionId), SessionId>,
}

impl RegistryState {
    fn remove(&mut self, session_id: SessionId) -> Option<ActiveSessionRecord> {
        let entry = self.sessions.remove(&session_id)?;
        let key = (entry.record.user_id, entry.record.connection_id);
        if self.by_owner.get(&key) == Some(&session_id) {
            self.by_owner.remove(&key);
        }
        let mut record = entry.record;
        record.status = SessionStatus::Closed;
        Some(record)
    }
}

/// In-memory registry of every live remote session.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    hub: Arc<ConnectionManager>,
    hook: OnceLock<Arc<dyn SessionLifecycleHook>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("hook_registered", &self.hook.get().is_some())
            .finish()
    }
}

impl SessionRegistry {
    /// Creates an empty registry publishing through `hub`.
    pub fn new(hub: Arc<ConnectionManager>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            hub,
            hook: OnceLock::new(),
        }
    }

    /// Registers the collaboration hook. Only the first registration takes effect.
    pub fn set_lifecycle_hook(&self, hook: Arc<dyn SessionLifecycleHook>) {
        if self.hook.set(hook).is_err() {
            warn!("Session lifecycle hook already registered, ignoring replacement");
        }
    }

    /// Registers a launched session.
    ///
    /// Fails with [`SessionError::ActiveSessionExists`] if the owner already
    /// has a non-closed session on the same connection.
    pub async fn register(&self, launch: SessionLaunch) -> Result<ActiveSessionRecord, SessionError> {
        let chat_enabled = launch.chat_enabled;
        let record = {
            let mut state = self.state.write().await;
            let key = (launch.user_id, launch.connection_id);
            if let Some(existing) = state.by_owner.get(&key) {
                return Err(SessionError::ActiveSessionExists {
                    user_id: launch.user_id,
                    connection_id: launch.connection_id,
                    session_id: *existing,
                });
            }

            let record = ActiveSessionRecord::from_launch(launch);
            state.by_owner.insert(key, record.id);
            state.sessions.insert(
                record.id,
                SessionEntry {
                    record: record.clone(),
                    last_seen: Instant::now(),
                },
            );
            if let Some(hook) = self.hook.get() {
                hook.session_opened(&record, chat_enabled);
            }
            record
        };

        info!(
            session_id = %record.id,
            user_id = %record.user_id,
            connection_id = %record.connection_id,
            protocol = %record.protocol.as_str(),
            "Session registered"
        );

        self.hub.broadcast_to_user(
            &StreamName::Sessions,
            record.user_id,
            HubEvent::with_data(events::SESSION_OPENED, &record),
        );
        let summary = self.summarize(&record, Duration::ZERO);
        self.hub.broadcast_stream(
            &StreamName::AdminSessions,
            HubEvent::with_data(events::SESSION_OPENED, &summary),
        );

        Ok(record)
    }

    /// Refreshes a session's liveness.
    pub async fn heartbeat(&self, session_id: SessionId) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        let entry = state
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;
        entry.record.last_heartbeat_at = Utc::now();
        entry.last_seen = Instant::now();
        debug!(session_id = %session_id, "Session heartbeat");
        Ok(())
    }

    /// Marks a session as shutting down. It stays registered until unregistered.
    pub async fn mark_closing(&self, session_id: SessionId) -> Result<ActiveSessionRecord, SessionError> {
        let record = {
            let mut state = self.state.write().await;
            let entry = state
                .sessions
                .get_mut(&session_id)
                .ok_or(SessionError::SessionNotFound(session_id))?;
            entry.record.status = SessionStatus::Closing;
            entry.record.clone()
        };

        let payload = SessionClosing {
            session_id,
            user_id: record.user_id,
        };
        self.hub.broadcast_to_user(
            &StreamName::Sessions,
            record.user_id,
            HubEvent::with_data(events::SESSION_CLOSING, &payload),
        );
        self.hub.broadcast_stream(
            &StreamName::AdminSessions,
            HubEvent::with_data(events::SESSION_CLOSING, &payload),
        );
        Ok(record)
    }

    /// Removes a session. Idempotent: an unknown ID yields `Ok(None)`.
    pub async fn unregister(
        &self,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<Option<ActiveSessionRecord>, SessionError> {
        let removed = {
            let mut state = self.state.write().await;
            self.remove_locked(&mut state, session_id, reason).await
        };
        match removed {
            Some((record, payload)) => {
                self.publish_closed(&record, &payload);
                Ok(Some(record))
            }
            None => {
                debug!(session_id = %session_id, "Unregister of unknown session ignored");
                Ok(None)
            }
        }
    }

    /// Removes a session only if it is still stale.
    ///
    /// Re-checks under the write lock so a heartbeat that raced the
    /// sweeper's snapshot keeps the session alive.
    pub async fn evict_if_stale(
        &self,
        session_id: SessionId,
        timeout: Duration,
    ) -> Option<ActiveSessionRecord> {
        let removed = {
            let mut state = self.state.write().await;
            let stale = state
                .sessions
                .get(&session_id)
                .is_some_and(|entry| entry.last_seen.elapsed() > timeout);
            if !stale {
                return None;
            }
            self.remove_locked(&mut state, session_id, CloseReason::Timeout)
                .await
        }?;

        let (removed, payload) = removed;
        warn!(
            session_id = %removed.id,
            user_id = %removed.user_id,
            timeout_secs = timeout.as_secs(),
            "Evicting session with silent heartbeat"
        );
        self.publish_closed(&removed, &payload);
        Some(removed)
    }

    /// IDs of sessions whose last heartbeat is older than `timeout`.
    pub async fn stale_sessions(&self, timeout: Duration) -> Vec<SessionId> {
        let state = self.state.read().await;
        state
            .sessions
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the user has a non-closed session on the connection.
    pub async fn has_active_session(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        self.state
            .read()
            .await
            .by_owner
            .contains_key(&(user_id, connection_id))
    }

    /// Returns a session record.
    pub async fn get(&self, session_id: SessionId) -> Option<ActiveSessionRecord> {
        self.state
            .read()
            .await
            .sessions
            .get(&session_id)
            .map(|entry| entry.record.clone())
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lists sessions visible in `scope`, oldest first.
    pub async fn list(&self, scope: SessionScope) -> Vec<SessionSummary> {
        let state = self.state.read().await;
        let mut summaries: Vec<SessionSummary> = state
            .sessions
            .values()
            .filter(|entry| match scope {
                SessionScope::User(user_id) => entry.record.user_id == user_id,
                SessionScope::Admin => true,
            })
            .map(|entry| self.summarize(&entry.record, entry.last_seen.elapsed()))
            .collect();
        summaries.sort_by_key(|summary| summary.record.started_at);
        summaries
    }

    /// Removes the entry and announces `session.closed` on the session's
    /// own stream before the registry lock is released.
    async fn remove_locked(
        &self,
        state: &mut RegistryState,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Option<(ActiveSessionRecord, SessionClosed)> {
        let record = state.remove(session_id)?;
        let payload = SessionClosed {
            session_id: record.id,
            connection_id: record.connection_id,
            user_id: record.user_id,
            reason,
            closed_at: Utc::now(),
        };
        let closed = HubEvent::with_data(events::SESSION_CLOSED, &payload);
        match self.hook.get() {
            Some(hook) => hook.session_closed(session_id, closed).await,
            None => {
                self.hub
                    .broadcast_stream(&StreamName::Session(session_id), closed);
            }
        }
        Some((record, payload))
    }

    fn summarize(&self, record: &ActiveSessionRecord, idle: Duration) -> SessionSummary {
        let participant_count = self
            .hook
            .get()
            .map(|hook| hook.participant_count(record.id))
            .unwrap_or(1);
        SessionSummary {
            record: record.clone(),
            owner_name: record
                .user_name
                .clone()
                .unwrap_or_else(|| record.user_id.to_string()),
            idle_seconds: idle.as_secs(),
            participant_count,
        }
    }

    fn publish_closed(&self, record: &ActiveSessionRecord, payload: &SessionClosed) {
        info!(
            session_id = %record.id,
            user_id = %record.user_id,
            connection = %record.connection_label(),
            reason = %payload.reason,
            "Session closed"
        );

        self.hub.broadcast_to_user(
            &StreamName::Sessions,
            record.user_id,
            HubEvent::with_data(events::SESSION_CLOSED, payload),
        );
        self.hub.broadcast_stream(
            &StreamName::AdminSessions,
            HubEvent::with_data(events::SESSION_CLOSED, payload),
        );
        self.hub.close_stream(&StreamName::Session(record.id));
        self.hub.close_stream(&StreamName::Chat(record.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::config::RealtimeConfig;
    use gatehouse_core::types::{Protocol, UserRole};
    use gatehouse_realtime::metrics::RealtimeMetrics;
    use gatehouse_realtime::{AuthenticatedClient, StreamRegistry};

    fn hub() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            RealtimeConfig::default(),
            Arc::new(StreamRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        ))
    }

    fn launch(user_id: UserId, connection_id: ConnectionId) -> SessionLaunch {
        SessionLaunch::new(connection_id, user_id, Protocol::Ssh)
    }

    #[tokio::test]
    async fn test_register_unregister_round_trip() {
        let registry = SessionRegistry::new(hub());
        let user = UserId::new();
        let connection = ConnectionId::new();

        let record = registry.register(launch(user, connection)).await.unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert!(registry.has_active_session(user, connection).await);
        assert_eq!(registry.len().await, 1);

        let closed = registry
            .unregister(record.id, CloseReason::Explicit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert!(!registry.has_active_session(user, connection).await);
        assert!(registry.is_empty().await);

        assert!(registry.unregister(record.id, CloseReason::Explicit).await.unwrap().is_none());
        assert!(registry.register(launch(user, connection)).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_launch_rejected() {
        let registry = SessionRegistry::new(hub());
        let user = UserId::new();
        let connection = ConnectionId::new();
        let first = registry.register(launch(user, connection)).await.unwrap();

        let err = registry.register(launch(user, connection)).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::ActiveSessionExists {
                user_id: user,
                connection_id: connection,
                session_id: first.id,
            }
        );

        // Another connection, or another user, is fine.
        assert!(registry.register(launch(user, ConnectionId::new())).await.is_ok());
        assert!(registry.register(launch(UserId::new(), connection)).await.is_ok());
    }

    #[tokio::test]
    async fn test_closing_sessions_still_block_relaunch() {
        let registry = SessionRegistry::new(hub());
        let user = UserId::new();
        let connection = ConnectionId::new();
        let record = registry.register(launch(user, connection)).await.unwrap();
        registry.mark_closing(record.id).await.unwrap();

        assert!(registry.register(launch(user, connection)).await.is_err());
        assert_eq!(registry.get(record.id).await.unwrap().status, SessionStatus::Closing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_launches_admit_one() {
        let registry = Arc::new(SessionRegistry::new(hub()));
        let user = UserId::new();
        let connection = ConnectionId::new();

        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.register(launch(user, connection)).await })
            })
            .collect();

        let mut admitted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(SessionError::ActiveSessionExists { .. }) => {}
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_session() {
        let registry = SessionRegistry::new(hub());
        let id = SessionId::new();
        assert_eq!(
            registry.heartbeat(id).await,
            Err(SessionError::SessionNotFound(id))
        );
    }

    #[tokio::test]
    async fn test_list_scopes() {
        let registry = SessionRegistry::new(hub());
        let alice = UserId::new();
        let bob = UserId::new();
        let mut named = launch(alice, ConnectionId::new());
        named.user_name = Some("alice".to_string());
        registry.register(named).await.unwrap();
        registry.register(launch(bob, ConnectionId::new())).await.unwrap();

        let own = registry.list(SessionScope::User(alice)).await;
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].owner_name, "alice");
        assert_eq!(own[0].participant_count, 1);
        assert_eq!(registry.list(SessionScope::Admin).await.len(), 2);
    }

    #[tokio::test]
    async fn test_open_and_close_events_reach_owner_and_admins() {
        let hub = hub();
        let registry = SessionRegistry::new(hub.clone());
        let owner = UserId::new();
        let (_owner_conn, mut owner_rx) = hub
            .connect(
                AuthenticatedClient {
                    user_id: owner,
                    username: "owner".to_string(),
                    role: UserRole::User,
                },
                &[StreamName::Sessions],
            )
            .await;
        let (_admin_conn, mut admin_rx) = hub
            .connect(
                AuthenticatedClient {
                    user_id: UserId::new(),
                    username: "root".to_string(),
                    role: UserRole::Admin,
                },
                &[StreamName::AdminSessions],
            )
            .await;

        let record = registry.register(launch(owner, ConnectionId::new())).await.unwrap();
        let opened = owner_rx.recv().await.unwrap();
        assert_eq!(opened.event, events::SESSION_OPENED);
        assert_eq!(opened.data["id"], record.id.to_string());
        let admin_opened = admin_rx.recv().await.unwrap();
        assert_eq!(admin_opened.stream, StreamName::AdminSessions);
        assert!(admin_opened.data["owner_name"].is_string());

        registry.unregister(record.id, CloseReason::Error).await.unwrap();
        let closed = owner_rx.recv().await.unwrap();
        assert_eq!(closed.event, events::SESSION_CLOSED);
        assert_eq!(closed.data["reason"], "error");
        assert_eq!(admin_rx.recv().await.unwrap().event, events::SESSION_CLOSED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_if_stale_rechecks() {
        let registry = SessionRegistry::new(hub());
        let record = registry
            .register(launch(UserId::new(), ConnectionId::new()))
            .await
            .unwrap();
        let timeout = Duration::from_secs(300);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(registry.stale_sessions(timeout).await, vec![record.id]);

        // A heartbeat lands between snapshot and eviction.
        registry.heartbeat(record.id).await.unwrap();
        assert!(registry.evict_if_stale(record.id, timeout).await.is_none());
        assert_eq!(registry.len().await, 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        let evicted = registry.evict_if_stale(record.id, timeout).await.unwrap();
        assert_eq!(evicted.id, record.id);
        assert!(registry.is_empty().await);
    }
}
