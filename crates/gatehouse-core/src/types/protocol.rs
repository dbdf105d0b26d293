//! Remote protocol identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The protocol a remote session speaks.
///
/// Known protocols get their own variant; anything else a newer driver
/// reports is kept verbatim in [`Protocol::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    /// Secure shell.
    Ssh,
    /// Remote desktop protocol.
    Rdp,
    /// VNC remote framebuffer.
    Vnc,
    /// Telnet.
    Telnet,
    /// Docker container exec/attach.
    Docker,
    /// Kubernetes pod exec.
    Kubernetes,
    /// Database console.
    Database,
    /// A protocol this build does not know about.
    Other(String),
}

impl Protocol {
    /// Return the protocol identifier string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ssh => "ssh",
            Self::Rdp => "rdp",
            Self::Vnc => "vnc",
            Self::Telnet => "telnet",
            Self::Docker => "docker",
            Self::Kubernetes => "kubernetes",
            Self::Database => "database",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Protocol {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "ssh" => Self::Ssh,
            "rdp" => Self::Rdp,
            "vnc" => Self::Vnc,
            "telnet" => Self::Telnet,
            "docker" => Self::Docker,
            "kubernetes" | "k8s" => Self::Kubernetes,
            "database" | "db" => Self::Database,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Protocol {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
