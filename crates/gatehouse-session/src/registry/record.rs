//! Active session records and the launch data drivers hand in.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gatehouse_core::types::{ConnectionId, Protocol, SessionId, TeamId, UserId};

/// What a protocol driver reports when a remote session comes up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLaunch {
    /// Saved connection the session runs on.
    pub connection_id: ConnectionId,
    /// Launching user (the owner).
    pub user_id: UserId,
    /// Remote protocol.
    pub protocol: Protocol,
    /// Connection display name.
    #[serde(default)]
    pub connection_name: Option<String>,
    /// Owner display name.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Owner's team.
    #[serde(default)]
    pub team_id: Option<TeamId>,
    /// Remote host.
    #[serde(default)]
    pub host: Option<String>,
    /// Remote port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Free-form driver metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Whether the session carries a chat; `None` uses the configured default.
    #[serde(default)]
    pub chat_enabled: Option<bool>,
}

impl SessionLaunch {
    /// A launch with only the required fields set.
    pub fn new(connection_id: ConnectionId, user_id: UserId, protocol: Protocol) -> Self {
        Self {
            connection_id,
            user_id,
            protocol,
            connection_name: None,
            user_name: None,
            team_id: None,
            host: None,
            port: None,
            metadata: HashMap::new(),
            chat_enabled: None,
        }
    }
}

/// Lifecycle state of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Running and heartbeating.
    Active,
    /// Shutting down; still counts towards the one-session rule.
    Closing,
    /// Removed from the registry.
    Closed,
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The driver or user closed it.
    Explicit,
    /// The driver failed.
    Error,
    /// The heartbeat went silent.
    Timeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Explicit => write!(f, "explicit"),
            CloseReason::Error => write!(f, "error"),
            CloseReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// A live remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSessionRecord {
    /// Session ID.
    pub id: SessionId,
    /// Saved connection the session runs on.
    pub connection_id: ConnectionId,
    /// Owner.
    pub user_id: UserId,
    /// Remote protocol.
    pub protocol: Protocol,
    /// Connection display name.
    pub connection_name: Option<String>,
    /// Owner display name.
    pub user_name: Option<String>,
    /// Owner's team.
    pub team_id: Option<TeamId>,
    /// Remote host.
    pub host: Option<String>,
    /// Remote port.
    pub port: Option<u16>,
    /// Free-form driver metadata.
    pub metadata: HashMap<String, Value>,
    /// When the session was registered.
    pub started_at: DateTime<Utc>,
    /// Last heartbeat (or registration) time.
    pub last_heartbeat_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: SessionStatus,
}

impl ActiveSessionRecord {
    /// Builds a fresh active record from a launch.
    pub fn from_launch(launch: SessionLaunch) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            connection_id: launch.connection_id,
            user_id: launch.user_id,
            protocol: launch.protocol,
            connection_name: launch.connection_name,
            user_name: launch.user_name,
            team_id: launch.team_id,
            host: launch.host,
            port: launch.port,
            metadata: launch.metadata,
            started_at: now,
            last_heartbeat_at: now,
            status: SessionStatus::Active,
        }
    }

    /// Label used in logs and messages: the connection name, or its ID.
    pub fn connection_label(&self) -> String {
        self.connection_name
            .clone()
            .unwrap_or_else(|| self.connection_id.to_string())
    }
}

/// Which records a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    /// Only sessions owned by this user.
    User(UserId),
    /// Every session (admin view).
    Admin,
}

/// A record annotated for listings and admin dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// The record itself.
    #[serde(flatten)]
    pub record: ActiveSessionRecord,
    /// Owner display name, falling back to the user ID.
    pub owner_name: String,
    /// Seconds since the last heartbeat.
    pub idle_seconds: u64,
    /// Current collaboration participants, owner included.
    pub participant_count: usize,
}
