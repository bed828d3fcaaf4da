//! Per-user FIFO of messages missed while disconnected.
//!
//! Messages are queued when a broadcast targets a room member with zero
//! live connections and drained, in order, when that user next joins any
//! room. Each queue is bounded; the oldest entry is dropped on overflow
//! so a permanently offline user cannot grow memory without bound.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::domain::foundation::{RoomId, UserId};
use crate::domain::realtime::{ChatMessage, QueuedMessage};

/// Bounded offline message queues, one per user.
pub struct OfflineQueue {
    capacity: usize,
    queues: Mutex<HashMap<UserId, VecDeque<QueuedMessage>>>,
}

impl OfflineQueue {
    /// Creates a queue store retaining at most `capacity` entries per user.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Buffers a message for an offline user.
    pub fn enqueue(&self, user_id: UserId, room_id: RoomId, message: ChatMessage) {
        let mut queues = self.queues.lock().expect("offline queue lock poisoned");
        let queue = queues.entry(user_id.clone()).or_default();
        queue.push_back(QueuedMessage::new(user_id.clone(), room_id, message));
        if queue.len() > self.capacity {
            queue.pop_front();
            tracing::warn!(user_id = %user_id, "Offline queue full, oldest message dropped");
        }
    }

    /// Removes and returns all queued messages for a user, oldest first,
    /// marked delivered.
    pub fn drain(&self, user_id: &UserId) -> Vec<QueuedMessage> {
        let mut queues = self.queues.lock().expect("offline queue lock poisoned");
        let Some(queue) = queues.remove(user_id) else {
            return Vec::new();
        };
        queue
            .into_iter()
            .map(|mut queued| {
                queued.delivered = true;
                queued
            })
            .collect()
    }

    /// Number of messages waiting for a user.
    pub fn len(&self, user_id: &UserId) -> usize {
        self.queues
            .lock()
            .expect("offline queue lock poisoned")
            .get(user_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// True if no messages are waiting for a user.
    pub fn is_empty(&self, user_id: &UserId) -> bool {
        self.len(user_id) == 0
    }

    /// Queue depth per user, for the stats surface.
    pub fn depths(&self) -> HashMap<UserId, usize> {
        self.queues
            .lock()
            .expect("offline queue lock poisoned")
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(user_id, queue)| (user_id.clone(), queue.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::realtime::MessageType;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage::new(room("chat_1"), uid("alice"), content, MessageType::Text, None)
    }

    #[test]
    fn drain_returns_messages_in_fifo_order() {
        let queue = OfflineQueue::new(10);
        let bob = uid("bob");
        queue.enqueue(bob.clone(), room("chat_1"), message("first"));
        queue.enqueue(bob.clone(), room("chat_1"), message("second"));

        let drained = queue.drain(&bob);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message.content, "first");
        assert_eq!(drained[1].message.content, "second");
        assert!(drained.iter().all(|entry| entry.delivered));
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = OfflineQueue::new(10);
        let bob = uid("bob");
        queue.enqueue(bob.clone(), room("chat_1"), message("hello"));

        assert_eq!(queue.drain(&bob).len(), 1);
        assert!(queue.drain(&bob).is_empty());
        assert!(queue.is_empty(&bob));
    }

    #[test]
    fn overflow_drops_oldest_entry() {
        let queue = OfflineQueue::new(2);
        let bob = uid("bob");
        queue.enqueue(bob.clone(), room("chat_1"), message("first"));
        queue.enqueue(bob.clone(), room("chat_1"), message("second"));
        queue.enqueue(bob.clone(), room("chat_1"), message("third"));

        let drained = queue.drain(&bob);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message.content, "second");
        assert_eq!(drained[1].message.content, "third");
    }

    #[test]
    fn queues_are_per_user() {
        let queue = OfflineQueue::new(10);
        queue.enqueue(uid("bob"), room("chat_1"), message("for bob"));

        assert_eq!(queue.len(&uid("bob")), 1);
        assert_eq!(queue.len(&uid("carol")), 0);

        let depths = queue.depths();
        assert_eq!(depths.get(&uid("bob")), Some(&1));
    }
}
