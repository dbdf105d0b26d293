//! Stream name definitions and parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use gatehouse_core::types::SessionId;

/// Typed stream identifiers.
///
/// Every name a client can send parses into exactly one variant; names
/// this build does not know are kept in [`StreamName::Custom`] so newer
/// producers can introduce streams without a hub upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamName {
    /// The subscriber's own session lifecycle events.
    Sessions,
    /// Every session's lifecycle events, enriched for admins.
    AdminSessions,
    /// Per-user notifications.
    Notifications,
    /// Hub control replies (subscription acks, pongs).
    System,
    /// Participant and write-delegation events of one shared session.
    Session(SessionId),
    /// Chat messages of one shared session.
    Chat(SessionId),
    /// A stream this build does not know.
    Custom(String),
}

/// Who may subscribe to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPolicy {
    /// Any authenticated client.
    Open,
    /// Admin clients only.
    AdminOnly,
    /// Decided per client by the registered [`StreamAccess`](super::StreamAccess) hook.
    Delegated,
}

impl StreamName {
    /// Parses a stream string into a typed stream.
    pub fn parse(name: &str) -> Self {
        let parts: Vec<&str> = name.splitn(2, ':').collect();
        match parts.as_slice() {
            ["sessions"] => StreamName::Sessions,
            ["admin", "sessions"] => StreamName::AdminSessions,
            ["notifications"] => StreamName::Notifications,
            ["system"] => StreamName::System,
            ["session", id] => match id.parse::<SessionId>() {
                Ok(id) => StreamName::Session(id),
                Err(_) => StreamName::Custom(name.to_string()),
            },
            ["chat", id] => match id.parse::<SessionId>() {
                Ok(id) => StreamName::Chat(id),
                Err(_) => StreamName::Custom(name.to_string()),
            },
            _ => StreamName::Custom(name.to_string()),
        }
    }

    /// Returns the subscription policy for this stream.
    pub fn policy(&self) -> StreamPolicy {
        match self {
            StreamName::Sessions | StreamName::Notifications | StreamName::System => {
                StreamPolicy::Open
            }
            StreamName::AdminSessions => StreamPolicy::AdminOnly,
            StreamName::Session(_) | StreamName::Chat(_) => StreamPolicy::Delegated,
            StreamName::Custom(name) if name.starts_with("admin:") => StreamPolicy::AdminOnly,
            // Unparseable session-scoped names never reach a producer.
            StreamName::Custom(name) if name.starts_with("session:") || name.starts_with("chat:") => {
                StreamPolicy::Delegated
            }
            StreamName::Custom(_) => StreamPolicy::Open,
        }
    }

    /// Returns the session this stream belongs to, if it is session-scoped.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            StreamName::Session(id) | StreamName::Chat(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamName::Sessions => f.write_str("sessions"),
            StreamName::AdminSessions => f.write_str("admin:sessions"),
            StreamName::Notifications => f.write_str("notifications"),
            StreamName::System => f.write_str("system"),
            StreamName::Session(id) => write!(f, "session:{id}"),
            StreamName::Chat(id) => write!(f, "chat:{id}"),
            StreamName::Custom(name) => f.write_str(name),
        }
    }
}

impl From<String> for StreamName {
    fn from(value: String) -> Self {
        StreamName::parse(&value)
    }
}

impl From<&str> for StreamName {
    fn from(value: &str) -> Self {
        StreamName::parse(value)
    }
}

impl From<StreamName> for String {
    fn from(value: StreamName) -> Self {
        value.to_string()
    }
}
