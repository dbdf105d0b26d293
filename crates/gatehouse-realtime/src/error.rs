//! Realtime hub errors.

use thiserror::Error;

use gatehouse_core::error::{AppError, ErrorKind};
use gatehouse_core::types::SocketId;

/// Errors raised by the realtime hub.
///
/// Transport failures (`ConnectionSaturated`, pong timeouts, malformed
/// frames) are handled inside the hub by tearing the affected connection
/// down; they are never returned to broadcasters.
#[derive(Debug, Error)]
pub enum HubError {
    /// The upgrade token was missing, malformed, expired, or badly signed.
    #[error("realtime authentication failed: {0}")]
    AuthFailed(String),
    /// The connection's outbound queue is full. Internal only.
    #[error("connection {0} outbound queue is full")]
    ConnectionSaturated(SocketId),
    /// The connection is not (or no longer) registered.
    #[error("connection {0} is not registered")]
    UnknownConnection(SocketId),
    /// The client may not subscribe to the stream.
    #[error("not allowed to subscribe to stream '{0}'")]
    StreamForbidden(String),
    /// The connection already holds the maximum number of subscriptions.
    #[error("subscription limit of {0} streams reached")]
    SubscriptionLimit(usize),
    /// An inbound frame could not be accepted.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        let kind = match &err {
            HubError::AuthFailed(_) => ErrorKind::Authentication,
            HubError::ConnectionSaturated(_) => ErrorKind::ServiceUnavailable,
            HubError::UnknownConnection(_) => ErrorKind::NotFound,
            HubError::StreamForbidden(_) => ErrorKind::Authorization,
            HubError::SubscriptionLimit(_) | HubError::InvalidFrame(_) => ErrorKind::Validation,
        };
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}
