//! Session coordination errors.

use thiserror::Error;

use gatehouse_core::error::{AppError, ErrorKind};
use gatehouse_core::types::{ConnectionId, SessionId, UserId};

/// Errors raised by the session registry and collaboration manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The user already has a live session on this connection.
    #[error(
        "user {user_id} already has an active session ({session_id}) on connection {connection_id}; close it before launching another"
    )]
    ActiveSessionExists {
        /// The launching user.
        user_id: UserId,
        /// The connection they tried to launch on.
        connection_id: ConnectionId,
        /// The session already running there.
        session_id: SessionId,
    },
    /// No live session has this ID.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    /// The requester is neither the owner nor holds the needed permission.
    #[error("user {0} is not allowed to manage this session")]
    NotOwner(UserId),
    /// The invitee may not launch sessions on the connection.
    #[error("user {0} is not authorized to use this connection")]
    ParticipantNotAuthorized(UserId),
    /// The user is not a participant of the session.
    #[error("user {0} is not a participant of this session")]
    ParticipantNotFound(UserId),
    /// The session owner cannot be removed from their own session.
    #[error("the session owner cannot be removed")]
    CannotRemoveOwner,
    /// Another participant currently holds write access.
    #[error("write access is currently held by user {holder}")]
    WriteAccessConflict {
        /// The current writer.
        holder: UserId,
    },
    /// The chat message exceeds the configured length.
    #[error("chat message is {length} characters long; the maximum is {max}")]
    ChatMessageTooLong {
        /// Length in characters.
        length: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The chat message is empty once control characters are removed.
    #[error("chat message is empty")]
    EmptyChatMessage,
    /// Chat is turned off for this session.
    #[error("chat is disabled for this session")]
    ChatDisabled,
}

impl SessionError {
    /// The [`ErrorKind`] this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ActiveSessionExists { .. } | Self::WriteAccessConflict { .. } => {
                ErrorKind::Conflict
            }
            Self::SessionNotFound(_) | Self::ParticipantNotFound(_) => ErrorKind::NotFound,
            Self::NotOwner(_) | Self::ParticipantNotAuthorized(_) => ErrorKind::Authorization,
            Self::CannotRemoveOwner
            | Self::ChatMessageTooLong { .. }
            | Self::EmptyChatMessage
            | Self::ChatDisabled => ErrorKind::Validation,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}
