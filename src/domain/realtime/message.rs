//! Chat message types and the offline delivery record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{MessageId, RoomId, Timestamp, UserId};

/// Types of real-time messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Image,
    System,
    Typing,
    Error,
}

/// A chat message retained in the per-room ring buffer.
///
/// Immutable once created except for the soft-edit fields and reactions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Emoji -> reacting user ids.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, Vec<UserId>>,
}

impl ChatMessage {
    /// Creates a new message with a fresh id and current timestamp.
    pub fn new(
        room_id: RoomId,
        user_id: UserId,
        content: impl Into<String>,
        message_type: MessageType,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            user_id,
            content: content.into(),
            message_type,
            timestamp: Timestamp::now(),
            metadata: metadata.unwrap_or(serde_json::Value::Null),
            edited: false,
            edited_at: None,
            reply_to: None,
            reactions: HashMap::new(),
        }
    }
}

/// A message buffered for a user that was offline at broadcast time.
///
/// Deleted after delivery; the per-user queue is bounded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: Uuid,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub message: ChatMessage,
    pub created_at: Timestamp,
    pub delivered: bool,
}

impl QueuedMessage {
    /// Wraps a message for offline delivery to `user_id`.
    pub fn new(user_id: UserId, room_id: RoomId, message: ChatMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            room_id,
            message,
            created_at: Timestamp::now(),
            delivered: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> ChatMessage {
        ChatMessage::new(
            RoomId::new("chat_1").unwrap(),
            UserId::new("alice").unwrap(),
            "hello",
            MessageType::Text,
            None,
        )
    }

    #[test]
    fn new_message_is_unedited() {
        let msg = test_message();
        assert!(!msg.edited);
        assert!(msg.edited_at.is_none());
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = test_message();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""roomId":"chat_1""#));
        assert!(json.contains(r#""messageType":"text""#));
        // Null metadata and empty reactions are omitted from the wire.
        assert!(!json.contains("metadata"));
        assert!(!json.contains("reactions"));
    }

    #[test]
    fn queued_message_starts_undelivered() {
        let msg = test_message();
        let queued = QueuedMessage::new(
            UserId::new("bob").unwrap(),
            RoomId::new("chat_1").unwrap(),
            msg,
        );
        assert!(!queued.delivered);
    }
}
