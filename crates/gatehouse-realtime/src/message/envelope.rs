//! Outbound envelope framing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::stream::StreamName;

/// An event a producer hands to the hub, before it is framed for a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    /// Event name, e.g. `session.opened`.
    pub event: String,
    /// Event payload.
    pub data: Value,
    /// Extra `meta` fields (e.g. per-session `seq`).
    pub meta: Map<String, Value>,
}

impl HubEvent {
    /// Create an event from an already-built JSON payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            meta: Map::new(),
        }
    }

    /// Create an event from any serializable payload.
    ///
    /// A payload that fails to serialize is logged and sent as `null`.
    pub fn with_data<T: Serialize>(event: impl Into<String>, data: &T) -> Self {
        let event = event.into();
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::error!(event = %event, error = %e, "Failed to serialize event payload");
            Value::Null
        });
        Self::new(event, data)
    }

    /// Attach an extra `meta` field.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Metadata stamped onto every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// Unique envelope ID.
    pub id: Uuid,
    /// When the hub framed the envelope.
    pub sent_at: DateTime<Utc>,
    /// Producer-supplied extras.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The JSON object written to the socket for every outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Stream the message was published on.
    pub stream: StreamName,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
    /// Envelope metadata.
    pub meta: EnvelopeMeta,
}

impl MessageEnvelope {
    /// Frame an event for a stream.
    pub fn new(stream: StreamName, event: HubEvent) -> Self {
        Self {
            stream,
            event: event.event,
            data: event.data,
            meta: EnvelopeMeta {
                id: Uuid::new_v4(),
                sent_at: Utc::now(),
                extra: event.meta,
            },
        }
    }

    /// Frame a hub control reply on the `system` stream.
    pub fn system(event: &str, data: Value) -> Self {
        Self::new(StreamName::System, HubEvent::new(event, data))
    }
}
