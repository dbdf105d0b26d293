//! Per-session collaboration state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;

use gatehouse_core::types::{ConnectionId, SessionId, UserId};

use super::chat::ChatBuffer;
use super::participant::{AccessMode, Participant, ParticipantRole, ParticipantsSnapshot};

/// What a write-access change did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteTransition {
    /// Who lost write access.
    pub revoked: Option<UserId>,
    /// Who gained write access.
    pub granted: Option<UserId>,
}

impl WriteTransition {
    /// Whether anything changed.
    pub fn is_noop(&self) -> bool {
        self.revoked.is_none() && self.granted.is_none()
    }
}

/// Mutable collaboration state of one session.
///
/// All write-access changes go through [`ShareState::set_writer`], which
/// leaves at most one participant holding [`AccessMode::Write`].
#[derive(Debug)]
pub struct ShareState {
    session_id: SessionId,
    /// Participants in join order.
    participants: Vec<Participant>,
    chat: ChatBuffer,
}

impl ShareState {
    /// State with the owner as the only participant, holding write access.
    pub fn new(session_id: SessionId, owner: UserId, chat_capacity: usize) -> Self {
        Self {
            session_id,
            participants: vec![Participant {
                session_id,
                user_id: owner,
                role: ParticipantRole::Owner,
                access: AccessMode::Write,
                granted_by: owner,
                joined_at: Utc::now(),
            }],
            chat: ChatBuffer::new(chat_capacity),
        }
    }

    /// Looks up a participant.
    pub fn get(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Whether the user is a participant.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.get(user_id).is_some()
    }

    /// The current writer.
    pub fn writer(&self) -> Option<UserId> {
        self.participants
            .iter()
            .find(|p| p.access == AccessMode::Write)
            .map(|p| p.user_id)
    }

    /// Adds a read-only participant. Returns `None` if they already were one.
    pub fn add(&mut self, user_id: UserId, granted_by: UserId) -> Option<Participant> {
        if self.contains(user_id) {
            return None;
        }
        let participant = Participant {
            session_id: self.session_id,
            user_id,
            role: ParticipantRole::Participant,
            access: AccessMode::Read,
            granted_by,
            joined_at: Utc::now(),
        };
        self.participants.push(participant.clone());
        Some(participant)
    }

    /// Removes a participant.
    pub fn remove(&mut self, user_id: UserId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.user_id == user_id)?;
        Some(self.participants.remove(index))
    }

    /// Makes `writer` the only write holder, or clears write access with `None`.
    ///
    /// Unknown users are ignored, so the result is always a valid state.
    pub fn set_writer(&mut self, writer: Option<UserId>) -> WriteTransition {
        let writer = writer.filter(|user_id| self.contains(*user_id));
        let current = self.writer();
        if current == writer {
            return WriteTransition::default();
        }
        for participant in &mut self.participants {
            participant.access = if Some(participant.user_id) == writer {
                AccessMode::Write
            } else {
                AccessMode::Read
            };
        }
        WriteTransition {
            revoked: current,
            granted: writer,
        }
    }

    /// Number of participants, owner included.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether there are no participants.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// The chat buffer.
    pub fn chat(&self) -> &ChatBuffer {
        &self.chat
    }

    /// The chat buffer, mutably.
    pub fn chat_mut(&mut self) -> &mut ChatBuffer {
        &mut self.chat
    }

    /// Point-in-time view.
    pub fn snapshot(&self) -> ParticipantsSnapshot {
        ParticipantsSnapshot {
            session_id: self.session_id,
            writer: self.writer(),
            participants: self.participants.clone(),
        }
    }
}

/// A session's collaboration handle, shared between callers.
#[derive(Debug)]
pub struct SharedSession {
    /// Session ID.
    pub session_id: SessionId,
    /// Owner.
    pub owner: UserId,
    /// Connection the session runs on (the permission resource).
    pub connection_id: ConnectionId,
    /// Whether the session carries a chat.
    pub chat_enabled: bool,
    closed: AtomicBool,
    participant_count: AtomicUsize,
    /// Participants and chat.
    pub(crate) state: Mutex<ShareState>,
    /// Per-session event sequence. Taken before `state` is released so
    /// events are enqueued in the order their mutations happened.
    pub(crate) dispatch: Mutex<u64>,
}

impl SharedSession {
    /// Creates the handle for a freshly registered session.
    pub fn new(
        session_id: SessionId,
        owner: UserId,
        connection_id: ConnectionId,
        chat_enabled: bool,
        chat_capacity: usize,
    ) -> Self {
        Self {
            session_id,
            owner,
            connection_id,
            chat_enabled,
            closed: AtomicBool::new(false),
            participant_count: AtomicUsize::new(1),
            state: Mutex::new(ShareState::new(session_id, owner, chat_capacity)),
            dispatch: Mutex::new(0),
        }
    }

    /// Whether the session has left the registry.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the session closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Participant count as of the last mutation.
    pub fn participant_count(&self) -> usize {
        self.participant_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_count(&self, count: usize) {
        self.participant_count.store(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Add(usize),
        Remove(usize),
        Grant(usize),
        Clear,
    }

    fn writers(state: &ShareState) -> usize {
        state
            .snapshot()
            .participants
            .iter()
            .filter(|p| p.access == AccessMode::Write)
            .count()
    }

    #[test]
    fn test_owner_starts_as_writer() {
        let owner = UserId::new();
        let state = ShareState::new(SessionId::new(), owner, 10);
        assert_eq!(state.writer(), Some(owner));
        assert!(state.get(owner).unwrap().is_owner());
    }

    #[test]
    fn test_handoff_is_single_transition() {
        let owner = UserId::new();
        let guest = UserId::new();
        let mut state = ShareState::new(SessionId::new(), owner, 10);
        state.add(guest, owner);

        let transition = state.set_writer(Some(guest));
        assert_eq!(
            transition,
            WriteTransition {
                revoked: Some(owner),
                granted: Some(guest),
            }
        );
        assert_eq!(state.writer(), Some(guest));
        assert_eq!(state.get(owner).unwrap().access, AccessMode::Read);
        assert!(state.set_writer(Some(guest)).is_noop());
        assert!(state.set_writer(Some(UserId::new())).granted.is_none());
    }

    #[test]
    fn test_at_most_one_writer_over_all_short_sequences() {
        let ops: Vec<Op> = (0..3)
            .flat_map(|i| [Op::Add(i), Op::Remove(i), Op::Grant(i)])
            .chain([Op::Clear])
            .collect();

        // Every sequence of four operations over three users (plus the owner).
        let total = ops.len().pow(4);
        for code in 0..total {
            let owner = UserId::new();
            let users = [UserId::new(), UserId::new(), UserId::new()];
            let mut state = ShareState::new(SessionId::new(), owner, 4);
            let mut rest = code;
            for _ in 0..4 {
                match ops[rest % ops.len()] {
                    Op::Add(i) => {
                        state.add(users[i], owner);
                    }
                    Op::Remove(i) => {
                        state.remove(users[i]);
                    }
                    Op::Grant(i) => {
                        state.set_writer(Some(users[i]));
                    }
                    Op::Clear => {
                        state.set_writer(None);
                    }
                }
                rest /= ops.len();
                assert!(writers(&state) <= 1, "two writers after sequence {code}");
                if let Some(writer) = state.writer() {
                    assert!(state.contains(writer));
                }
            }
        }
    }
}
