//! Ephemeral per-session chat.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::types::{MessageId, SessionId, UserId};

use crate::error::SessionError;

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID.
    pub id: MessageId,
    /// Session ID.
    pub session_id: SessionId,
    /// Author.
    pub author_id: UserId,
    /// Sanitized text.
    pub text: String,
    /// When the message was posted.
    pub created_at: DateTime<Utc>,
}

/// Removes control characters other than newline and tab.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Checks length and emptiness, returning the sanitized text.
///
/// Length is measured in characters on the raw input.
pub fn prepare(text: &str, max_length: usize) -> Result<String, SessionError> {
    let length = text.chars().count();
    if length > max_length {
        return Err(SessionError::ChatMessageTooLong {
            length,
            max: max_length,
        });
    }
    let clean = sanitize(text);
    if clean.trim().is_empty() {
        return Err(SessionError::EmptyChatMessage);
    }
    Ok(clean)
}

/// Bounded ring of the most recent messages.
#[derive(Debug, Clone)]
pub struct ChatBuffer {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ChatBuffer {
    /// Creates an empty buffer keeping at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
        }
    }

    /// Appends a message, dropping the oldest when full.
    pub fn push(&mut self, message: ChatMessage) {
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Messages in post order.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(session_id: SessionId, n: usize) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(),
            session_id,
            author_id: UserId::new(),
            text: format!("message {n}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ring_keeps_most_recent_in_order() {
        let session_id = SessionId::new();
        let mut buffer = ChatBuffer::new(3);
        for n in 0..5 {
            buffer.push(message(session_id, n));
        }
        let texts: Vec<_> = buffer.history().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn test_sanitize_keeps_newlines_and_tabs() {
        assert_eq!(sanitize("a\u{7}b\nc\td\u{1b}[0m"), "ab\nc\td[0m");
    }

    #[test]
    fn test_prepare_limits() {
        assert_eq!(prepare("hello", 5).unwrap(), "hello");
        assert_eq!(
            prepare("héllo!", 5),
            Err(SessionError::ChatMessageTooLong { length: 6, max: 5 })
        );
        assert_eq!(prepare("\u{0}\u{1}", 5), Err(SessionError::EmptyChatMessage));
        assert_eq!(prepare("  \n ", 5), Err(SessionError::EmptyChatMessage));
    }
}
