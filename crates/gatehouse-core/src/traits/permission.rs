//! Permission oracle trait.
//!
//! The session-coordination core never decides authorization policy
//! itself. It asks the platform's RBAC engine yes/no questions through
//! this trait, always outside of any of its own locks.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::id::{ConnectionId, UserId};

/// Permissions the coordination core asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Base access: may launch a session on the connection.
    #[serde(rename = "connection.launch")]
    ConnectionLaunch,
    /// May invite other users into sessions on the connection.
    #[serde(rename = "session.share")]
    SessionShare,
    /// May manage participants (promote, demote, remove) in sessions on the connection.
    #[serde(rename = "session.manage")]
    SessionManage,
}

impl Permission {
    /// Return the permission identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionLaunch => "connection.launch",
            Self::SessionShare => "session.share",
            Self::SessionManage => "session.manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yes/no authorization oracle backed by the platform's RBAC engine.
#[async_trait]
pub trait PermissionOracle: Send + Sync + 'static {
    /// Return whether `user_id` holds `permission` on the given connection.
    async fn authorized(
        &self,
        user_id: UserId,
        permission: Permission,
        resource_id: ConnectionId,
    ) -> bool;
}
