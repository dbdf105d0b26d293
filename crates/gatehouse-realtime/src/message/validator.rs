//! Inbound frame validation rules.

use crate::error::HubError;

/// Maximum allowed inbound frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Maximum length of a stream name.
const MAX_STREAM_NAME_LEN: usize = 256;

/// Validates a raw inbound text frame.
pub fn validate_inbound(raw: &str) -> Result<(), HubError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(HubError::InvalidFrame(format!(
            "frame exceeds maximum size of {MAX_FRAME_SIZE} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(HubError::InvalidFrame("empty frame".to_string()));
    }

    Ok(())
}

/// Validates stream name format.
pub fn validate_stream_name(stream: &str) -> Result<(), HubError> {
    if stream.is_empty() || stream.len() > MAX_STREAM_NAME_LEN {
        return Err(HubError::InvalidFrame(format!(
            "invalid stream name length: {}",
            stream.len()
        )));
    }

    if !stream
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'))
    {
        return Err(HubError::InvalidFrame(format!(
            "stream name '{stream}' contains invalid characters"
        )));
    }

    Ok(())
}
