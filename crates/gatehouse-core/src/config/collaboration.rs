//! Shared-session collaboration configuration.

use serde::{Deserialize, Serialize};

/// Collaboration (session sharing) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    /// What happens to write access when a non-owner writer gives it up.
    #[serde(default)]
    pub write_release_policy: WriteReleasePolicy,
    /// Remove a non-owner participant from every shared session when their
    /// last realtime connection closes.
    #[serde(default = "default_true")]
    pub remove_on_disconnect: bool,
    /// Ephemeral chat settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            write_release_policy: WriteReleasePolicy::default(),
            remove_on_disconnect: true,
            chat: ChatConfig::default(),
        }
    }
}

/// Policy applied when a non-owner write holder loses write access by
/// demoting themselves, being demoted, leaving, or disconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteReleasePolicy {
    /// Write access returns to the session owner in the same transition.
    #[default]
    ReturnToOwner,
    /// The session stays writer-less until someone is granted write.
    LeaveVacant,
}

impl std::fmt::Display for WriteReleasePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteReleasePolicy::ReturnToOwner => write!(f, "return_to_owner"),
            WriteReleasePolicy::LeaveVacant => write!(f, "leave_vacant"),
        }
    }
}

/// Ephemeral per-session chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Default for sessions whose driver does not say whether chat is on.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Messages kept per session (oldest dropped first).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum message length in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: default_buffer_size(),
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    200
}

fn default_max_message_length() -> usize {
    2000
}
