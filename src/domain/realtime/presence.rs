//! Ephemeral per-user presence state scoped to a room.

use serde::Serialize;

use crate::domain::foundation::{RoomId, Timestamp, UserId};

/// A user's typing state inside a room.
///
/// Overwritten on each update; removed on leave/disconnect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub started_at: Timestamp,
}

impl TypingIndicator {
    /// Marks `user_id` as typing in `room_id` now.
    pub fn new(user_id: UserId, room_id: RoomId) -> Self {
        Self {
            user_id,
            room_id,
            started_at: Timestamp::now(),
        }
    }
}

/// A user's cursor position in collaborative editing.
///
/// Last write wins per (room, user); updates from the same user apply in
/// transport order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_end: Option<u32>,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_serializes_without_empty_selection() {
        let cursor = CursorPosition {
            user_id: UserId::new("alice").unwrap(),
            room_id: RoomId::new("planning_1").unwrap(),
            x: 10.5,
            y: 20.0,
            element_id: None,
            selection_start: None,
            selection_end: None,
            timestamp: Timestamp::now(),
        };
        let json = serde_json::to_string(&cursor).unwrap();
        assert!(json.contains(r#""userId":"alice""#));
        assert!(!json.contains("selectionStart"));
    }
}
