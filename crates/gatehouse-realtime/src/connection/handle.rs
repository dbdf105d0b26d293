//! Individual hub connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gatehouse_core::types::{SocketId, UserId, UserRole};

use crate::error::HubError;
use crate::message::MessageEnvelope;

/// Identity established when the connection's token was verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedClient {
    /// User ID.
    pub user_id: UserId,
    /// Username (cached for display).
    pub username: String,
    /// User's role (cached for stream policy checks).
    pub role: UserRole,
}

/// A handle to a single hub connection.
///
/// Holds the bounded sender feeding the connection's writer task plus
/// metadata about the connected client. Subscriptions live in the
/// stream registry, not here.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique socket ID
    pub id: SocketId,
    /// Authenticated client identity
    pub client: AuthenticatedClient,
    /// Sender for outbound envelopes
    sender: mpsc::Sender<Arc<MessageEnvelope>>,
    /// Last pong (or application ping) received
    last_pong: RwLock<Instant>,
    /// Whether the connection is still registered
    alive: AtomicBool,
    /// Cancels the reader and writer tasks
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(client: AuthenticatedClient, sender: mpsc::Sender<Arc<MessageEnvelope>>) -> Self {
        Self {
            id: SocketId::new(),
            client,
            sender,
            last_pong: RwLock::new(Instant::now()),
            alive: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        }
    }

    /// Owning user.
    pub fn user_id(&self) -> UserId {
        self.client.user_id
    }

    /// Enqueue an envelope without waiting.
    ///
    /// A full queue yields [`HubError::ConnectionSaturated`]; the caller is
    /// expected to tear the connection down.
    pub fn try_deliver(&self, envelope: Arc<MessageEnvelope>) -> Result<(), HubError> {
        if !self.is_alive() {
            return Err(HubError::UnknownConnection(self.id));
        }
        match self.sender.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(HubError::ConnectionSaturated(self.id)),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                Err(HubError::UnknownConnection(self.id))
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Mark the connection dead and stop its tasks.
    pub fn close(&self) {
        self.mark_dead();
        self.cancel.cancel();
    }

    /// Token cancelled when the connection is torn down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record a pong response
    pub async fn record_pong(&self) {
        let mut last = self.last_pong.write().await;
        *last = Instant::now();
    }

    /// Instant of the last pong.
    pub async fn last_pong(&self) -> Instant {
        *self.last_pong.read().await
    }
}
