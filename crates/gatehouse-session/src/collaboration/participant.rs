//! Collaboration participants and access modes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::types::{SessionId, TeamId, UserId};

/// A participant's relationship to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Launched the session.
    Owner,
    /// Joined through an invite.
    Participant,
}

/// Whether a participant may send input to the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// View only.
    Read,
    /// May send input. At most one participant per session.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
        }
    }
}

/// One user's membership in a shared session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Session ID.
    pub session_id: SessionId,
    /// Participant.
    pub user_id: UserId,
    /// Owner or invited participant.
    pub role: ParticipantRole,
    /// Current access.
    pub access: AccessMode,
    /// Who granted membership (the owner grants themselves).
    pub granted_by: UserId,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Whether this participant launched the session.
    pub fn is_owner(&self) -> bool {
        self.role == ParticipantRole::Owner
    }
}

/// Who a share invite targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ShareTarget {
    /// A single user.
    User(UserId),
    /// Every current member of a team (read-only).
    Team(TeamId),
}

/// Why a participant left a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// They left on their own.
    Left,
    /// The owner or a manager removed them.
    Removed,
    /// Their last realtime connection closed.
    Disconnected,
}

/// Point-in-time view of a session's participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantsSnapshot {
    /// Session ID.
    pub session_id: SessionId,
    /// Current writer, if any.
    pub writer: Option<UserId>,
    /// Participants in join order.
    pub participants: Vec<Participant>,
}
