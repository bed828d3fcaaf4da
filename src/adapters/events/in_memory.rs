//! In-memory event sink for tests.
//!
//! Captures every audit record synchronously so tests can assert on the
//! fire-and-forget stream. Not intended for production use; methods
//! panic on poisoned locks, which is acceptable for test code.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::ports::{AuditEvent, AuditKind, EventSink};

/// Capturing [`EventSink`].
///
/// # Example
///
/// ```ignore
/// let sink = Arc::new(InMemoryEventSink::new());
/// // ... drive the core ...
/// assert_eq!(sink.count_of(AuditKind::MessageSent), 1);
/// ```
pub struct InMemoryEventSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryEventSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Returns all recorded events (for test assertions).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn recorded(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .expect("InMemoryEventSink: lock poisoned")
            .clone()
    }

    /// Returns events of a specific kind.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn of_kind(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.recorded()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }

    /// Returns the count of events of a specific kind.
    pub fn count_of(&self, kind: AuditKind) -> usize {
        self.of_kind(kind).len()
    }

    /// Clears recorded events (for test isolation).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.events
            .write()
            .expect("InMemoryEventSink: lock poisoned")
            .clear();
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn record(&self, event: AuditEvent) {
        self.events
            .write()
            .expect("InMemoryEventSink: lock poisoned")
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn event(kind: AuditKind) -> AuditEvent {
        AuditEvent::new(kind, UserId::new("alice").unwrap(), None)
    }

    #[tokio::test]
    async fn sink_captures_events_in_order() {
        let sink = InMemoryEventSink::new();
        sink.record(event(AuditKind::Connect)).await;
        sink.record(event(AuditKind::RoomJoined)).await;

        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].kind, AuditKind::Connect);
        assert_eq!(recorded[1].kind, AuditKind::RoomJoined);
    }

    #[tokio::test]
    async fn of_kind_filters_events() {
        let sink = InMemoryEventSink::new();
        sink.record(event(AuditKind::Connect)).await;
        sink.record(event(AuditKind::Disconnect)).await;
        sink.record(event(AuditKind::Connect)).await;

        assert_eq!(sink.count_of(AuditKind::Connect), 2);
        assert_eq!(sink.count_of(AuditKind::Disconnect), 1);
        assert_eq!(sink.count_of(AuditKind::MessageSent), 0);
    }

    #[tokio::test]
    async fn clear_resets_the_sink() {
        let sink = InMemoryEventSink::new();
        sink.record(event(AuditKind::Connect)).await;
        sink.clear();
        assert!(sink.recorded().is_empty());
    }
}
