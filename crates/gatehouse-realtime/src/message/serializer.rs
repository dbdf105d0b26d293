//! JSON codec for hub frames.

use super::envelope::MessageEnvelope;
use super::types::ControlFrame;

/// Serialize an outbound envelope to a text frame.
pub fn serialize_envelope(envelope: &MessageEnvelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Deserialize an inbound control frame.
pub fn deserialize_control(text: &str) -> Result<ControlFrame, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::ControlAction;

    #[test]
    fn test_parse_subscribe_frame() {
        let frame = deserialize_control(r#"{"action":"subscribe","streams":["sessions","system"]}"#)
            .unwrap();
        assert_eq!(frame.action, ControlAction::Subscribe);
        assert_eq!(frame.streams, vec!["sessions", "system"]);
    }

    #[test]
    fn test_parse_ping_without_streams() {
        let frame = deserialize_control(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(frame.action, ControlAction::Ping);
        assert!(frame.streams.is_empty());
    }

    #[test]
    fn test_reject_unknown_action() {
        assert!(deserialize_control(r#"{"action":"publish","streams":["x"]}"#).is_err());
        assert!(deserialize_control("not json").is_err());
        assert!(deserialize_control(r#"{"streams":["x"]}"#).is_err());
    }
}
