//! Connection pool: tracks all live connections indexed by socket and user.

use std::sync::Arc;

use dashmap::DashMap;

use gatehouse_core::types::{SocketId, UserId};

use super::handle::ConnectionHandle;

/// Thread-safe pool of all live hub connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// User ID → connection handles in connect order (one per browser tab).
    by_user: DashMap<UserId, Vec<Arc<ConnectionHandle>>>,
    /// Socket ID → connection handle for direct lookup.
    by_id: DashMap<SocketId, Arc<ConnectionHandle>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the pool.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, handle.clone());
        self.by_user.entry(handle.user_id()).or_default().push(handle);
    }

    /// Removes a connection from the pool.
    ///
    /// Returns the handle and the number of connections the user still
    /// holds, or `None` if the socket was not registered.
    pub fn remove(&self, socket_id: &SocketId) -> Option<(Arc<ConnectionHandle>, usize)> {
        let (_, handle) = self.by_id.remove(socket_id)?;
        let mut remaining = 0;
        if let Some(mut connections) = self.by_user.get_mut(&handle.user_id()) {
            connections.retain(|c| c.id != *socket_id);
            remaining = connections.len();
        }
        if remaining == 0 {
            self.by_user
                .remove_if(&handle.user_id(), |_, connections| connections.is_empty());
        }
        Some((handle, remaining))
    }

    /// Gets all connections for a user, oldest first.
    pub fn get_user_connections(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(socket_id).map(|entry| entry.value().clone())
    }

    /// Returns total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Returns all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
