//! Typing indicators and cursor positions, scoped per room.
//!
//! Last write wins per (room, user). State for a user is cleared whenever
//! they leave the room or their last connection closes; the messaging
//! core drives that cleanup so the §3 invariants hold.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::foundation::{RoomId, Timestamp, UserId};
use crate::domain::realtime::{CursorPosition, TypingIndicator};

/// Fields of one cursor update.
#[derive(Debug, Clone)]
pub struct CursorUpdate {
    pub x: f64,
    pub y: f64,
    pub element_id: Option<String>,
    pub selection_start: Option<u32>,
    pub selection_end: Option<u32>,
}

#[derive(Default)]
struct PresenceState {
    typing: HashMap<RoomId, HashMap<UserId, TypingIndicator>>,
    cursors: HashMap<RoomId, HashMap<UserId, CursorPosition>>,
}

/// Tracks ephemeral presence per (room, user).
pub struct PresenceTracker {
    state: RwLock<PresenceState>,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PresenceState::default()),
        }
    }

    /// Sets or clears the typing flag, returning the room's current
    /// typing users.
    pub async fn set_typing(&self, room_id: &RoomId, user_id: &UserId, is_typing: bool) -> Vec<UserId> {
        let mut state = self.state.write().await;
        if is_typing {
            state
                .typing
                .entry(room_id.clone())
                .or_default()
                .insert(
                    user_id.clone(),
                    TypingIndicator::new(user_id.clone(), room_id.clone()),
                );
        } else if let Some(room_typing) = state.typing.get_mut(room_id) {
            room_typing.remove(user_id);
            if room_typing.is_empty() {
                state.typing.remove(room_id);
            }
        }
        state
            .typing
            .get(room_id)
            .map(|room_typing| room_typing.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces the user's cursor position, returning the stored value.
    pub async fn set_cursor(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        update: CursorUpdate,
    ) -> CursorPosition {
        let cursor = CursorPosition {
            user_id: user_id.clone(),
            room_id: room_id.clone(),
            x: update.x,
            y: update.y,
            element_id: update.element_id,
            selection_start: update.selection_start,
            selection_end: update.selection_end,
            timestamp: Timestamp::now(),
        };
        let mut state = self.state.write().await;
        state
            .cursors
            .entry(room_id.clone())
            .or_default()
            .insert(user_id.clone(), cursor.clone());
        cursor
    }

    /// Users currently typing in a room.
    pub async fn typing_users(&self, room_id: &RoomId) -> Vec<UserId> {
        self.state
            .read()
            .await
            .typing
            .get(room_id)
            .map(|room_typing| room_typing.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Cursor positions in a room.
    pub async fn cursors(&self, room_id: &RoomId) -> Vec<CursorPosition> {
        self.state
            .read()
            .await
            .cursors
            .get(room_id)
            .map(|room_cursors| room_cursors.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops all presence for a user in one room (leave/disconnect).
    pub async fn clear_user(&self, room_id: &RoomId, user_id: &UserId) {
        let mut state = self.state.write().await;
        if let Some(room_typing) = state.typing.get_mut(room_id) {
            room_typing.remove(user_id);
            if room_typing.is_empty() {
                state.typing.remove(room_id);
            }
        }
        if let Some(room_cursors) = state.cursors.get_mut(room_id) {
            room_cursors.remove(user_id);
            if room_cursors.is_empty() {
                state.cursors.remove(room_id);
            }
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn cursor_at(x: f64, y: f64) -> CursorUpdate {
        CursorUpdate {
            x,
            y,
            element_id: None,
            selection_start: None,
            selection_end: None,
        }
    }

    #[tokio::test]
    async fn typing_list_tracks_start_and_stop() {
        let tracker = PresenceTracker::new();
        let r = room("chat_1");

        let typing = tracker.set_typing(&r, &uid("alice"), true).await;
        assert_eq!(typing, vec![uid("alice")]);

        tracker.set_typing(&r, &uid("bob"), true).await;
        assert_eq!(tracker.typing_users(&r).await.len(), 2);

        let typing = tracker.set_typing(&r, &uid("alice"), false).await;
        assert_eq!(typing, vec![uid("bob")]);
    }

    #[tokio::test]
    async fn typing_stop_without_start_is_noop() {
        let tracker = PresenceTracker::new();
        let typing = tracker.set_typing(&room("chat_1"), &uid("alice"), false).await;
        assert!(typing.is_empty());
    }

    #[tokio::test]
    async fn cursor_updates_are_last_write_wins() {
        let tracker = PresenceTracker::new();
        let r = room("planning_1");

        tracker.set_cursor(&r, &uid("alice"), cursor_at(1.0, 1.0)).await;
        tracker.set_cursor(&r, &uid("alice"), cursor_at(5.0, 9.0)).await;

        let cursors = tracker.cursors(&r).await;
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].x, 5.0);
        assert_eq!(cursors[0].y, 9.0);
    }

    #[tokio::test]
    async fn presence_is_scoped_per_room() {
        let tracker = PresenceTracker::new();
        tracker.set_typing(&room("chat_1"), &uid("alice"), true).await;
        assert!(tracker.typing_users(&room("chat_2")).await.is_empty());
    }

    #[tokio::test]
    async fn clear_user_removes_typing_and_cursor() {
        let tracker = PresenceTracker::new();
        let r = room("planning_1");
        tracker.set_typing(&r, &uid("alice"), true).await;
        tracker.set_cursor(&r, &uid("alice"), cursor_at(2.0, 3.0)).await;

        tracker.clear_user(&r, &uid("alice")).await;
        assert!(tracker.typing_users(&r).await.is_empty());
        assert!(tracker.cursors(&r).await.is_empty());
    }
}
