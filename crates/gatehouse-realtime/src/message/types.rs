//! Inbound control frames.

use serde::{Deserialize, Serialize};

/// Actions a client may request over its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Subscribe to the listed streams.
    Subscribe,
    /// Unsubscribe from the listed streams.
    Unsubscribe,
    /// Application-level liveness probe.
    Ping,
}

/// A client → server control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Requested action.
    pub action: ControlAction,
    /// Stream names the action applies to.
    #[serde(default)]
    pub streams: Vec<String>,
}
