//! Collaboration manager: share invites, write delegation and chat.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{MutexGuard, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gatehouse_core::config::{CollaborationConfig, WriteReleasePolicy};
use gatehouse_core::traits::{Permission, PermissionOracle, TeamDirectory};
use gatehouse_core::types::{MessageId, SessionId, UserId};
use gatehouse_realtime::{ConnectionEvent, ConnectionManager, HubEvent, StreamAccess, StreamName};

use crate::error::SessionError;
use crate::events::{
    self, ParticipantJoined, ParticipantLeft, ShareInvited, WriteChanged,
};
use crate::registry::{ActiveSessionRecord, SessionLifecycleHook};

use super::chat::{self, ChatMessage};
use super::participant::{
    AccessMode, LeaveReason, Participant, ParticipantsSnapshot, ShareTarget,
};
use super::state::{ShareState, SharedSession, WriteTransition};

/// Arbitrates multi-viewer access to live sessions.
///
/// Holds one [`SharedSession`] per registered session. Permission checks go
/// to the oracle before any session lock is taken; events are enqueued on
/// the hub after the state lock is released, in mutation order.
pub struct CollaborationManager {
    sessions: DashMap<SessionId, Arc<SharedSession>>,
    hub: Arc<ConnectionManager>,
    oracle: Arc<dyn PermissionOracle>,
    teams: Arc<dyn TeamDirectory>,
    config: CollaborationConfig,
}

impl std::fmt::Debug for CollaborationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborationManager")
            .field("sessions", &self.sessions.len())
            .field("write_release_policy", &self.config.write_release_policy)
            .finish()
    }
}

impl CollaborationManager {
    /// Creates a manager publishing through `hub`.
    pub fn new(
        hub: Arc<ConnectionManager>,
        oracle: Arc<dyn PermissionOracle>,
        teams: Arc<dyn TeamDirectory>,
        config: CollaborationConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            hub,
            oracle,
            teams,
            config,
        }
    }

    /// Invites a user, or every member of a team, into a session.
    ///
    /// The requester must own the session or hold `session.share` on its
    /// connection. Team invites are read-only and skip members without
    /// `connection.launch`. Inviting a single user with write access hands
    /// write over to them. Existing participants are returned unchanged.
    pub async fn invite(
        &self,
        session_id: SessionId,
        requester: UserId,
        target: ShareTarget,
        access: AccessMode,
    ) -> Result<Vec<Participant>, SessionError> {
        let shared = self.session(session_id)?;
        if !self
            .is_privileged(&shared, requester, Permission::SessionShare)
            .await
        {
            return Err(SessionError::NotOwner(requester));
        }

        let (candidates, access) = match target {
            ShareTarget::User(user_id) => (vec![user_id], access),
            ShareTarget::Team(team_id) => (self.teams.members(team_id).await, AccessMode::Read),
        };

        let mut invitees = Vec::with_capacity(candidates.len());
        for user_id in candidates {
            if user_id == shared.owner
                || self
                    .oracle
                    .authorized(user_id, Permission::ConnectionLaunch, shared.connection_id)
                    .await
            {
                invitees.push(user_id);
            } else if matches!(target, ShareTarget::User(_)) {
                return Err(SessionError::ParticipantNotAuthorized(user_id));
            } else {
                debug!(
                    session_id = %session_id,
                    user_id = %user_id,
                    "Skipping team member without connection access"
                );
            }
        }

        let mut state = shared.state.lock().await;
        if shared.is_closed() {
            return Err(SessionError::SessionNotFound(session_id));
        }

        let joined: Vec<Participant> = invitees
            .iter()
            .filter_map(|user_id| state.add(*user_id, requester))
            .collect();
        let transition = match (target, access, joined.first()) {
            (ShareTarget::User(_), AccessMode::Write, Some(newcomer)) => {
                state.set_writer(Some(newcomer.user_id))
            }
            _ => WriteTransition::default(),
        };
        shared.record_count(state.len());
        let result: Vec<Participant> = invitees
            .iter()
            .filter_map(|user_id| state.get(*user_id).cloned())
            .collect();
        let snapshot = state.snapshot();

        if joined.is_empty() && transition.is_noop() {
            return Ok(result);
        }

        let mut seq = Self::begin_dispatch(&shared, state).await;

        // Invitees must hold the streams before their own join is announced.
        let streams = Self::session_streams(&shared);
        for participant in &joined {
            self.hub.subscribe_user(participant.user_id, &streams);
        }

        let session_stream = StreamName::Session(session_id);
        for participant in &joined {
            let payload = ParticipantJoined {
                session_id,
                participant: snapshot
                    .participants
                    .iter()
                    .find(|p| p.user_id == participant.user_id)
                    .cloned()
                    .unwrap_or_else(|| participant.clone()),
            };
            self.emit(
                &mut seq,
                &session_stream,
                HubEvent::with_data(events::PARTICIPANT_JOINED, &payload),
            );
        }
        for event in Self::write_events(session_id, transition, requester, &snapshot) {
            self.emit(&mut seq, &session_stream, event);
        }
        drop(seq);

        for participant in &result {
            if !joined.iter().any(|j| j.user_id == participant.user_id) {
                continue;
            }
            let invite = ShareInvited {
                session_id,
                connection_id: shared.connection_id,
                invited_by: requester,
                access: participant.access,
            };
            self.hub.broadcast_to_user(
                &StreamName::Notifications,
                participant.user_id,
                HubEvent::with_data(events::SHARE_INVITED, &invite),
            );
        }

        info!(
            session_id = %session_id,
            requester = %requester,
            joined = joined.len(),
            access = %access,
            "Session shared"
        );
        Ok(result)
    }

    /// Changes a participant's access.
    ///
    /// The owner (or a holder of `session.manage`) may promote anyone, which
    /// demotes the previous writer in the same step. Anyone may demote
    /// themselves. A non-owner may claim write for themselves only while
    /// nobody holds it.
    pub async fn update_access(
        &self,
        session_id: SessionId,
        requester: UserId,
        target: UserId,
        mode: AccessMode,
    ) -> Result<ParticipantsSnapshot, SessionError> {
        let shared = self.session(session_id)?;
        let privileged = self
            .is_privileged(&shared, requester, Permission::SessionManage)
            .await;

        let mut state = shared.state.lock().await;
        if shared.is_closed() {
            return Err(SessionError::SessionNotFound(session_id));
        }
        if !state.contains(target) {
            return Err(SessionError::ParticipantNotFound(target));
        }

        let current = state.writer();
        let next = match mode {
            AccessMode::Write => {
                if current == Some(target) {
                    return Ok(state.snapshot());
                }
                if privileged {
                    Some(target)
                } else if requester == target {
                    match current {
                        None => Some(target),
                        Some(holder) => return Err(SessionError::WriteAccessConflict { holder }),
                    }
                } else {
                    return Err(SessionError::NotOwner(requester));
                }
            }
            AccessMode::Read => {
                if requester != target && !privileged {
                    return Err(SessionError::NotOwner(requester));
                }
                if current != Some(target) {
                    return Ok(state.snapshot());
                }
                self.released_writer(&shared, target)
            }
        };

        let transition = state.set_writer(next);
        let snapshot = state.snapshot();
        let mut seq = Self::begin_dispatch(&shared, state).await;
        let session_stream = StreamName::Session(session_id);
        for event in Self::write_events(session_id, transition, requester, &snapshot) {
            self.emit(&mut seq, &session_stream, event);
        }
        drop(seq);

        info!(
            session_id = %session_id,
            requester = %requester,
            target = %target,
            writer = ?snapshot.writer,
            "Write access updated"
        );
        Ok(snapshot)
    }

    /// Removes a participant. The owner (or a `session.manage` holder) may
    /// remove anyone but the owner; anyone may remove themselves.
    pub async fn remove_participant(
        &self,
        session_id: SessionId,
        requester: UserId,
        target: UserId,
    ) -> Result<(), SessionError> {
        let shared = self.session(session_id)?;
        if target == shared.owner {
            return Err(SessionError::CannotRemoveOwner);
        }

        let (reason, removed_by) = if requester == target {
            (LeaveReason::Left, None)
        } else if self
            .is_privileged(&shared, requester, Permission::SessionManage)
            .await
        {
            (LeaveReason::Removed, Some(requester))
        } else {
            return Err(SessionError::NotOwner(requester));
        };

        self.detach(&shared, target, reason, removed_by).await
    }

    /// Posts a chat message from a participant.
    pub async fn post_chat_message(
        &self,
        session_id: SessionId,
        author: UserId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        let shared = self.session(session_id)?;
        if !shared.chat_enabled {
            return Err(SessionError::ChatDisabled);
        }
        let text = chat::prepare(text, self.config.chat.max_message_length)?;

        let mut state = shared.state.lock().await;
        if shared.is_closed() {
            return Err(SessionError::SessionNotFound(session_id));
        }
        if !state.contains(author) {
            return Err(SessionError::ParticipantNotFound(author));
        }

        let message = ChatMessage {
            id: MessageId::new(),
            session_id,
            author_id: author,
            text,
            created_at: Utc::now(),
        };
        state.chat_mut().push(message.clone());

        let mut seq = Self::begin_dispatch(&shared, state).await;
        self.emit(
            &mut seq,
            &StreamName::Chat(session_id),
            HubEvent::with_data(events::CHAT_POSTED, &message),
        );
        Ok(message)
    }

    /// Buffered chat messages, oldest first. Participants only.
    pub async fn chat_history(
        &self,
        session_id: SessionId,
        requester: UserId,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let shared = self.session(session_id)?;
        if !shared.chat_enabled {
            return Err(SessionError::ChatDisabled);
        }
        let state = shared.state.lock().await;
        if !state.contains(requester) {
            return Err(SessionError::ParticipantNotFound(requester));
        }
        Ok(state.chat().history())
    }

    /// A user's current access, or `None` if they are not a participant.
    pub async fn access_mode(&self, session_id: SessionId, user_id: UserId) -> Option<AccessMode> {
        let shared = self.session(session_id).ok()?;
        let state = shared.state.lock().await;
        state.get(user_id).map(|p| p.access)
    }

    /// The current writer.
    pub async fn writer(&self, session_id: SessionId) -> Option<UserId> {
        let shared = self.session(session_id).ok()?;
        let state = shared.state.lock().await;
        state.writer()
    }

    /// All participants and the writer.
    pub async fn participants(
        &self,
        session_id: SessionId,
    ) -> Result<ParticipantsSnapshot, SessionError> {
        let shared = self.session(session_id)?;
        let state = shared.state.lock().await;
        Ok(state.snapshot())
    }

    /// Number of sessions with collaboration state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Removes a user whose last hub connection closed from every session
    /// they joined as a non-owner. Returns the number of sessions left.
    pub async fn handle_user_gone(&self, user_id: UserId) -> usize {
        if self.hub.is_user_connected(&user_id) {
            return 0;
        }

        let candidates: Vec<Arc<SharedSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().owner != user_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut left = 0;
        for shared in candidates {
            let member = shared.state.lock().await.contains(user_id);
            if member
                && self
                    .detach(&shared, user_id, LeaveReason::Disconnected, None)
                    .await
                    .is_ok()
            {
                left += 1;
            }
        }
        left
    }

    /// Follows hub lifecycle events until cancelled, applying
    /// [`handle_user_gone`](Self::handle_user_gone) when a user's last connection closes.
    pub async fn run_disconnect_listener(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ConnectionEvent>,
        cancel: CancellationToken,
    ) {
        if !self.config.remove_on_disconnect {
            debug!("Participant removal on disconnect is disabled");
            return;
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(ConnectionEvent::Disconnected {
                    user_id,
                    last_for_user: true,
                    ..
                }) => {
                    let left = self.handle_user_gone(user_id).await;
                    if left > 0 {
                        info!(user_id = %user_id, sessions = left, "Removed disconnected participant");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Disconnect listener lagged behind hub lifecycle events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Disconnect listener stopped");
    }

    async fn detach(
        &self,
        shared: &Arc<SharedSession>,
        target: UserId,
        reason: LeaveReason,
        removed_by: Option<UserId>,
    ) -> Result<(), SessionError> {
        let session_id = shared.session_id;
        let mut state = shared.state.lock().await;
        if shared.is_closed() {
            return Err(SessionError::SessionNotFound(session_id));
        }

        let was_writer = state.writer() == Some(target);
        state
            .remove(target)
            .ok_or(SessionError::ParticipantNotFound(target))?;
        let transition = if was_writer {
            let mut transition = state.set_writer(self.released_writer(shared, target));
            transition.revoked = Some(target);
            transition
        } else {
            WriteTransition::default()
        };
        shared.record_count(state.len());
        let snapshot = state.snapshot();

        let mut seq = Self::begin_dispatch(shared, state).await;
        let session_stream = StreamName::Session(session_id);
        let payload = ParticipantLeft {
            session_id,
            user_id: target,
            reason,
            removed_by,
        };
        self.emit(
            &mut seq,
            &session_stream,
            HubEvent::with_data(events::PARTICIPANT_LEFT, &payload),
        );
        let changed_by = removed_by.unwrap_or(target);
        for event in Self::write_events(session_id, transition, changed_by, &snapshot) {
            self.emit(&mut seq, &session_stream, event);
        }
        drop(seq);

        self.hub
            .unsubscribe_user(target, &Self::session_streams(shared));

        info!(
            session_id = %session_id,
            user_id = %target,
            reason = ?reason,
            "Participant left session"
        );
        Ok(())
    }

    fn session(&self, session_id: SessionId) -> Result<Arc<SharedSession>, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .filter(|shared| !shared.is_closed())
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    /// Owner, or holder of `permission` on the session's connection.
    async fn is_privileged(
        &self,
        shared: &SharedSession,
        requester: UserId,
        permission: Permission,
    ) -> bool {
        requester == shared.owner
            || self
                .oracle
                .authorized(requester, permission, shared.connection_id)
                .await
    }

    /// Who holds write after `releasing` gives it up.
    fn released_writer(&self, shared: &SharedSession, releasing: UserId) -> Option<UserId> {
        if releasing == shared.owner {
            return None;
        }
        match self.config.write_release_policy {
            WriteReleasePolicy::ReturnToOwner => Some(shared.owner),
            WriteReleasePolicy::LeaveVacant => None,
        }
    }

    fn session_streams(shared: &SharedSession) -> Vec<StreamName> {
        let mut streams = vec![StreamName::Session(shared.session_id)];
        if shared.chat_enabled {
            streams.push(StreamName::Chat(shared.session_id));
        }
        streams
    }

    /// Takes the dispatch lock, then releases the state lock.
    async fn begin_dispatch<'a>(
        shared: &'a SharedSession,
        state: MutexGuard<'a, ShareState>,
    ) -> MutexGuard<'a, u64> {
        let seq = shared.dispatch.lock().await;
        drop(state);
        seq
    }

    fn emit(&self, seq: &mut MutexGuard<'_, u64>, stream: &StreamName, event: HubEvent) {
        **seq += 1;
        self.hub.broadcast_stream(stream, event.with_meta("seq", **seq));
    }

    fn write_events(
        session_id: SessionId,
        transition: WriteTransition,
        changed_by: UserId,
        snapshot: &ParticipantsSnapshot,
    ) -> Vec<HubEvent> {
        let payload = |user_id| WriteChanged {
            session_id,
            user_id,
            changed_by,
            writer: snapshot.writer,
            participants: snapshot.participants.clone(),
        };
        let revoked = transition
            .revoked
            .map(|user_id| HubEvent::with_data(events::WRITE_REVOKED, &payload(user_id)));
        let granted = transition
            .granted
            .map(|user_id| HubEvent::with_data(events::WRITE_GRANTED, &payload(user_id)));
        revoked.into_iter().chain(granted).collect()
    }
}

#[async_trait]
impl StreamAccess for CollaborationManager {
    async fn may_subscribe(&self, user_id: UserId, stream: &StreamName) -> bool {
        let Some(session_id) = stream.session_id() else {
            return false;
        };
        let Ok(shared) = self.session(session_id) else {
            return false;
        };
        if matches!(stream, StreamName::Chat(_)) && !shared.chat_enabled {
            return false;
        }
        shared.state.lock().await.contains(user_id)
    }
}

#[async_trait]
impl SessionLifecycleHook for CollaborationManager {
    fn session_opened(&self, record: &ActiveSessionRecord, chat_enabled: Option<bool>) {
        let chat_enabled = chat_enabled.unwrap_or(self.config.chat.enabled);
        let shared = Arc::new(SharedSession::new(
            record.id,
            record.user_id,
            record.connection_id,
            chat_enabled,
            self.config.chat.buffer_size,
        ));
        self.hub
            .subscribe_user(record.user_id, &Self::session_streams(&shared));
        self.sessions.insert(record.id, shared);
    }

    async fn session_closed(&self, session_id: SessionId, closed: HubEvent) {
        let stream = StreamName::Session(session_id);
        let Some((_, shared)) = self.sessions.remove(&session_id) else {
            self.hub.broadcast_stream(&stream, closed);
            return;
        };
        // Mutations that already hold the state lock dispatch first; later
        // ones observe the closed flag and fail.
        let state = shared.state.lock().await;
        shared.close();
        let mut seq = Self::begin_dispatch(&shared, state).await;
        self.emit(&mut seq, &stream, closed);
    }

    fn participant_count(&self, session_id: SessionId) -> usize {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().participant_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{GrantTable, StaticTeamDirectory};
    use gatehouse_core::config::RealtimeConfig;
    use gatehouse_core::types::{ConnectionId, Protocol, TeamId, UserRole};
    use gatehouse_realtime::metrics::RealtimeMetrics;
    use gatehouse_realtime::{AuthenticatedClient, MessageEnvelope, StreamRegistry};
    use tokio::sync::mpsc;

    use crate::registry::SessionLaunch;

    struct Fixture {
        hub: Arc<ConnectionManager>,
        grants: Arc<GrantTable>,
        teams: Arc<StaticTeamDirectory>,
        manager: Arc<CollaborationManager>,
        owner: UserId,
        connection_id: ConnectionId,
        session_id: SessionId,
    }

    fn fixture_with(config: CollaborationConfig) -> Fixture {
        let hub = Arc::new(ConnectionManager::new(
            RealtimeConfig::default(),
            Arc::new(StreamRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        ));
        let grants = Arc::new(GrantTable::new());
        let teams = Arc::new(StaticTeamDirectory::new());
        let manager = Arc::new(CollaborationManager::new(
            hub.clone(),
            grants.clone(),
            teams.clone(),
            config,
        ));
        hub.set_stream_access(manager.clone());

        let owner = UserId::new();
        let connection_id = ConnectionId::new();
        let record = ActiveSessionRecord::from_launch(SessionLaunch::new(
            connection_id,
            owner,
            Protocol::Ssh,
        ));
        manager.session_opened(&record, None);

        Fixture {
            hub,
            grants,
            teams,
            manager,
            owner,
            connection_id,
            session_id: record.id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CollaborationConfig::default())
    }

    impl Fixture {
        fn launcher(&self) -> UserId {
            let user = UserId::new();
            self.grants
                .grant(user, Permission::ConnectionLaunch, self.connection_id);
            user
        }

        async fn connect(&self, user_id: UserId) -> mpsc::Receiver<Arc<MessageEnvelope>> {
            let (_, rx) = self
                .hub
                .connect(
                    AuthenticatedClient {
                        user_id,
                        username: user_id.to_string(),
                        role: UserRole::User,
                    },
                    &[],
                )
                .await;
            rx
        }
    }

    #[tokio::test]
    async fn test_owner_starts_as_writer() {
        let f = fixture();
        assert_eq!(f.manager.writer(f.session_id).await, Some(f.owner));
        assert_eq!(
            f.manager.access_mode(f.session_id, f.owner).await,
            Some(AccessMode::Write)
        );
        assert_eq!(f.manager.participant_count(f.session_id), 1);
    }

    #[tokio::test]
    async fn test_invite_requires_owner_or_share_permission() {
        let f = fixture();
        let guest = f.launcher();
        let outsider = f.launcher();

        let err = f
            .manager
            .invite(f.session_id, outsider, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotOwner(outsider));

        f.grants
            .grant(outsider, Permission::SessionShare, f.connection_id);
        let invited = f
            .manager
            .invite(f.session_id, outsider, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap();
        assert_eq!(invited.len(), 1);
        assert_eq!(invited[0].granted_by, outsider);
    }

    #[tokio::test]
    async fn test_invitee_needs_launch_permission() {
        let f = fixture();
        let stranger = UserId::new();
        let err = f
            .manager
            .invite(f.session_id, f.owner, ShareTarget::User(stranger), AccessMode::Read)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::ParticipantNotAuthorized(stranger));
        assert_eq!(f.manager.participants(f.session_id).await.unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn test_reinvite_is_idempotent() {
        let f = fixture();
        let guest = f.launcher();
        let first = f
            .manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap();
        let second = f
            .manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Write)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(f.manager.writer(f.session_id).await, Some(f.owner));
    }

    #[tokio::test]
    async fn test_team_invite_is_read_only_and_skips_unauthorized() {
        let f = fixture();
        let team = TeamId::new();
        let member = f.launcher();
        let no_access = UserId::new();
        f.teams.set_members(team, vec![member, no_access, f.owner]);

        let invited = f
            .manager
            .invite(f.session_id, f.owner, ShareTarget::Team(team), AccessMode::Write)
            .await
            .unwrap();
        let ids: Vec<_> = invited.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![member, f.owner]);
        assert_eq!(f.manager.writer(f.session_id).await, Some(f.owner));
        assert_eq!(
            f.manager.access_mode(f.session_id, member).await,
            Some(AccessMode::Read)
        );
    }

    #[tokio::test]
    async fn test_invite_with_write_hands_over() {
        let f = fixture();
        let guest = f.launcher();
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Write)
            .await
            .unwrap();
        assert_eq!(f.manager.writer(f.session_id).await, Some(guest));
        assert_eq!(
            f.manager.access_mode(f.session_id, f.owner).await,
            Some(AccessMode::Read)
        );
    }

    #[tokio::test]
    async fn test_self_claim_only_when_vacant() {
        let f = fixture();
        let guest = f.launcher();
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap();

        let err = f
            .manager
            .update_access(f.session_id, guest, guest, AccessMode::Write)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::WriteAccessConflict { holder: f.owner });

        // Owner steps back; the guest may now claim.
        f.manager
            .update_access(f.session_id, f.owner, f.owner, AccessMode::Read)
            .await
            .unwrap();
        assert_eq!(f.manager.writer(f.session_id).await, None);
        let snapshot = f
            .manager
            .update_access(f.session_id, guest, guest, AccessMode::Write)
            .await
            .unwrap();
        assert_eq!(snapshot.writer, Some(guest));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_promote_others() {
        let f = fixture();
        let a = f.launcher();
        let b = f.launcher();
        for user in [a, b] {
            f.manager
                .invite(f.session_id, f.owner, ShareTarget::User(user), AccessMode::Read)
                .await
                .unwrap();
        }
        let err = f
            .manager
            .update_access(f.session_id, a, b, AccessMode::Write)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotOwner(a));

        f.grants.grant(a, Permission::SessionManage, f.connection_id);
        let snapshot = f
            .manager
            .update_access(f.session_id, a, b, AccessMode::Write)
            .await
            .unwrap();
        assert_eq!(snapshot.writer, Some(b));
    }

    #[tokio::test]
    async fn test_release_policy() {
        for (policy, expected_owner_writes) in [
            (WriteReleasePolicy::ReturnToOwner, true),
            (WriteReleasePolicy::LeaveVacant, false),
        ] {
            let f = fixture_with(CollaborationConfig {
                write_release_policy: policy,
                ..CollaborationConfig::default()
            });
            let guest = f.launcher();
            f.manager
                .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Write)
                .await
                .unwrap();
            f.manager
                .update_access(f.session_id, guest, guest, AccessMode::Read)
                .await
                .unwrap();
            let expected = expected_owner_writes.then_some(f.owner);
            assert_eq!(f.manager.writer(f.session_id).await, expected, "{policy}");
        }
    }

    #[tokio::test]
    async fn test_handoff_observed_atomically() {
        let f = fixture();
        let guest = f.launcher();
        let mut owner_rx = f.connect(f.owner).await;
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap();
        // Re-grant the session streams to the connection opened after the session.
        f.hub.subscribe_user(f.owner, &[StreamName::Session(f.session_id)]);

        f.manager
            .update_access(f.session_id, f.owner, guest, AccessMode::Write)
            .await
            .unwrap();

        let mut write_events = Vec::new();
        while let Ok(envelope) = owner_rx.try_recv() {
            if envelope.event.starts_with("share.write") {
                write_events.push(envelope);
            }
        }
        let names: Vec<_> = write_events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec![events::WRITE_REVOKED, events::WRITE_GRANTED]);

        let mut last_seq = 0;
        for envelope in &write_events {
            let writers = envelope.data["participants"]
                .as_array()
                .unwrap()
                .iter()
                .filter(|p| p["access"] == "write")
                .count();
            assert_eq!(writers, 1);
            assert_eq!(envelope.data["writer"], guest.to_string());
            let seq = envelope.meta.extra["seq"].as_u64().unwrap();
            assert!(seq > last_seq);
            last_seq = seq;
        }
    }

    #[tokio::test]
    async fn test_session_closed_is_last_sequenced_event() {
        let f = fixture();
        let registry = crate::registry::SessionRegistry::new(f.hub.clone());
        registry.set_lifecycle_hook(f.manager.clone());
        let guest = f.launcher();
        let mut owner_rx = f.connect(f.owner).await;

        let record = registry
            .register(SessionLaunch::new(f.connection_id, f.owner, Protocol::Rdp))
            .await
            .unwrap();
        f.manager
            .invite(record.id, f.owner, ShareTarget::User(guest), AccessMode::Write)
            .await
            .unwrap();
        registry
            .unregister(record.id, crate::registry::CloseReason::Explicit)
            .await
            .unwrap();

        let session_stream = StreamName::Session(record.id);
        let on_session: Vec<_> = std::iter::from_fn(|| owner_rx.try_recv().ok())
            .filter(|envelope| envelope.stream == session_stream)
            .collect();
        let names: Vec<_> = on_session.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(
            names,
            vec![
                events::PARTICIPANT_JOINED,
                events::WRITE_REVOKED,
                events::WRITE_GRANTED,
                events::SESSION_CLOSED,
            ]
        );
        let seqs: Vec<u64> = on_session
            .iter()
            .map(|e| e.meta.extra["seq"].as_u64().unwrap())
            .collect();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]), "{seqs:?}");
        assert_eq!(on_session[3].data["reason"], "explicit");

        // Closed sessions reject late mutations.
        let late = f
            .manager
            .update_access(record.id, f.owner, f.owner, AccessMode::Write)
            .await;
        assert!(matches!(late, Err(SessionError::SessionNotFound(id)) if id == record.id));
    }

    #[tokio::test]
    async fn test_concurrent_access_changes_keep_single_writer() {
        let f = fixture();
        let guests: Vec<UserId> = (0..6).map(|_| f.launcher()).collect();
        for guest in &guests {
            f.manager
                .invite(f.session_id, f.owner, ShareTarget::User(*guest), AccessMode::Read)
                .await
                .unwrap();
        }
        f.manager
            .update_access(f.session_id, f.owner, f.owner, AccessMode::Read)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for (i, guest) in guests.iter().copied().enumerate() {
            let manager = f.manager.clone();
            let owner = f.owner;
            let session_id = f.session_id;
            tasks.push(tokio::spawn(async move {
                for round in 0..20 {
                    let _ = match (i + round) % 3 {
                        0 => manager.update_access(session_id, guest, guest, AccessMode::Write).await,
                        1 => manager.update_access(session_id, guest, guest, AccessMode::Read).await,
                        _ => manager.update_access(session_id, owner, guest, AccessMode::Write).await,
                    };
                    let snapshot = manager.participants(session_id).await.unwrap();
                    let writers = snapshot
                        .participants
                        .iter()
                        .filter(|p| p.access == AccessMode::Write)
                        .count();
                    assert!(writers <= 1);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_remove_participant_rules() {
        let f = fixture();
        let a = f.launcher();
        let b = f.launcher();
        for user in [a, b] {
            f.manager
                .invite(f.session_id, f.owner, ShareTarget::User(user), AccessMode::Read)
                .await
                .unwrap();
        }

        assert_eq!(
            f.manager.remove_participant(f.session_id, a, f.owner).await,
            Err(SessionError::CannotRemoveOwner)
        );
        assert_eq!(
            f.manager.remove_participant(f.session_id, a, b).await,
            Err(SessionError::NotOwner(a))
        );
        f.manager.remove_participant(f.session_id, a, a).await.unwrap();
        f.manager.remove_participant(f.session_id, f.owner, b).await.unwrap();
        assert_eq!(
            f.manager.remove_participant(f.session_id, f.owner, b).await,
            Err(SessionError::ParticipantNotFound(b))
        );
        assert_eq!(f.manager.participant_count(f.session_id), 1);
    }

    #[tokio::test]
    async fn test_removing_writer_returns_write_to_owner() {
        let f = fixture();
        let guest = f.launcher();
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Write)
            .await
            .unwrap();
        f.manager
            .remove_participant(f.session_id, f.owner, guest)
            .await
            .unwrap();
        assert_eq!(f.manager.writer(f.session_id).await, Some(f.owner));
    }

    #[tokio::test]
    async fn test_chat_order_bound_and_membership() {
        let f = fixture_with(CollaborationConfig {
            chat: gatehouse_core::config::ChatConfig {
                enabled: true,
                buffer_size: 3,
                max_message_length: 10,
            },
            ..CollaborationConfig::default()
        });
        let outsider = UserId::new();

        for n in 0..5 {
            f.manager
                .post_chat_message(f.session_id, f.owner, &format!("msg {n}"))
                .await
                .unwrap();
        }
        let history = f.manager.chat_history(f.session_id, f.owner).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);

        assert_eq!(
            f.manager.post_chat_message(f.session_id, outsider, "hi").await,
            Err(SessionError::ParticipantNotFound(outsider))
        );
        assert_eq!(
            f.manager
                .post_chat_message(f.session_id, f.owner, "this is far too long")
                .await,
            Err(SessionError::ChatMessageTooLong { length: 20, max: 10 })
        );
        assert_eq!(
            f.manager.post_chat_message(f.session_id, f.owner, "\u{7}").await,
            Err(SessionError::EmptyChatMessage)
        );
    }

    #[tokio::test]
    async fn test_chat_disabled_per_session() {
        let f = fixture();
        let record = ActiveSessionRecord::from_launch(SessionLaunch::new(
            ConnectionId::new(),
            f.owner,
            Protocol::Rdp,
        ));
        f.manager.session_opened(&record, Some(false));
        assert_eq!(
            f.manager.post_chat_message(record.id, f.owner, "hello").await,
            Err(SessionError::ChatDisabled)
        );
        assert!(!f.manager.may_subscribe(f.owner, &StreamName::Chat(record.id)).await);
        assert!(f.manager.may_subscribe(f.owner, &StreamName::Session(record.id)).await);
    }

    #[tokio::test]
    async fn test_stream_access_follows_membership() {
        let f = fixture();
        let guest = f.launcher();
        let stream = StreamName::Session(f.session_id);
        assert!(!f.manager.may_subscribe(guest, &stream).await);
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Read)
            .await
            .unwrap();
        assert!(f.manager.may_subscribe(guest, &stream).await);
        assert!(!f.manager.may_subscribe(guest, &StreamName::Sessions).await);
    }

    #[tokio::test]
    async fn test_session_close_discards_state() {
        let f = fixture();
        f.manager
            .post_chat_message(f.session_id, f.owner, "bye")
            .await
            .unwrap();
        f.manager
            .session_closed(f.session_id, HubEvent::new(events::SESSION_CLOSED, serde_json::Value::Null))
            .await;
        assert_eq!(f.manager.session_count(), 0);
        assert_eq!(
            f.manager.chat_history(f.session_id, f.owner).await,
            Err(SessionError::SessionNotFound(f.session_id))
        );
        assert_eq!(f.manager.participant_count(f.session_id), 0);
    }

    #[tokio::test]
    async fn test_disconnected_participant_is_removed() {
        let f = fixture();
        let guest = f.launcher();
        f.manager
            .invite(f.session_id, f.owner, ShareTarget::User(guest), AccessMode::Write)
            .await
            .unwrap();

        // Still connected elsewhere: nothing happens.
        let _guest_rx = f.connect(guest).await;
        assert_eq!(f.manager.handle_user_gone(guest).await, 0);

        for handle in f.hub.user_connections(&guest) {
            f.hub
                .disconnect(handle.id, gatehouse_realtime::DisconnectReason::ClientClosed);
        }
        assert_eq!(f.manager.handle_user_gone(guest).await, 1);
        assert_eq!(f.manager.access_mode(f.session_id, guest).await, None);
        assert_eq!(f.manager.writer(f.session_id).await, Some(f.owner));
        // Owners are never removed this way.
        assert_eq!(f.manager.handle_user_gone(f.owner).await, 0);
    }
}
