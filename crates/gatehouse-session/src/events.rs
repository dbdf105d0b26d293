//! Client-visible events published through the realtime hub.
//!
//! Event names are stable wire identifiers; payloads serialize into the
//! envelope's `data` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::types::{ConnectionId, SessionId, UserId};

use crate::collaboration::participant::{AccessMode, LeaveReason, Participant};
use crate::registry::record::CloseReason;

/// A session was registered.
pub const SESSION_OPENED: &str = "session.opened";
/// A session is shutting down.
pub const SESSION_CLOSING: &str = "session.closing";
/// A session left the registry.
pub const SESSION_CLOSED: &str = "session.closed";
/// A participant joined a shared session.
pub const PARTICIPANT_JOINED: &str = "session.participant_joined";
/// A participant left a shared session.
pub const PARTICIPANT_LEFT: &str = "session.participant_left";
/// A participant lost write access.
pub const WRITE_REVOKED: &str = "share.write_revoked";
/// A participant gained write access.
pub const WRITE_GRANTED: &str = "share.write_granted";
/// A user was invited into a session (sent on their `notifications` stream).
pub const SHARE_INVITED: &str = "share.invited";
/// A chat message was posted.
pub const CHAT_POSTED: &str = "chat.posted";

/// Payload of [`SESSION_CLOSED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClosed {
    /// Session ID.
    pub session_id: SessionId,
    /// Connection the session ran on.
    pub connection_id: ConnectionId,
    /// Owner.
    pub user_id: UserId,
    /// Why it closed.
    pub reason: CloseReason,
    /// When it closed.
    pub closed_at: DateTime<Utc>,
}

/// Payload of [`SESSION_CLOSING`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClosing {
    /// Session ID.
    pub session_id: SessionId,
    /// Owner.
    pub user_id: UserId,
}

/// Payload of [`PARTICIPANT_JOINED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantJoined {
    /// Session ID.
    pub session_id: SessionId,
    /// The new participant.
    pub participant: Participant,
}

/// Payload of [`PARTICIPANT_LEFT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantLeft {
    /// Session ID.
    pub session_id: SessionId,
    /// The departed participant.
    pub user_id: UserId,
    /// Why they left.
    pub reason: LeaveReason,
    /// Who removed them, when someone did.
    pub removed_by: Option<UserId>,
}

/// Payload of [`WRITE_REVOKED`] and [`WRITE_GRANTED`].
///
/// Both carry the state after the whole transition, so an observer never
/// sees two writers (or a transient gap) during a handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteChanged {
    /// Session ID.
    pub session_id: SessionId,
    /// Whose access changed.
    pub user_id: UserId,
    /// Who triggered the change.
    pub changed_by: UserId,
    /// Writer after the transition.
    pub writer: Option<UserId>,
    /// Participants after the transition.
    pub participants: Vec<Participant>,
}

/// Payload of [`SHARE_INVITED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareInvited {
    /// Session ID.
    pub session_id: SessionId,
    /// Connection the session runs on.
    pub connection_id: ConnectionId,
    /// Who invited.
    pub invited_by: UserId,
    /// Granted access.
    pub access: AccessMode,
}
