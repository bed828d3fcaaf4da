//! EventSink port - fire-and-forget audit/analytics copies.
//!
//! The core keeps only a bounded in-memory message history; anything
//! longer-lived (audit trails, durable history, cross-process fan-out)
//! hangs off this port. Delivery failures are logged and never propagate
//! into the originating operation.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{RoomId, Timestamp, UserId};

/// Kind of lifecycle event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Connect,
    Disconnect,
    RoomJoined,
    RoomLeft,
    MessageSent,
    PlanUpdated,
}

/// One audit record, a flattened copy of a realtime lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl AuditEvent {
    /// Creates an audit event stamped with the current time.
    pub fn new(kind: AuditKind, user_id: UserId, room_id: Option<RoomId>) -> Self {
        Self {
            kind,
            user_id,
            room_id,
            timestamp: Timestamp::now(),
            detail: serde_json::Value::Null,
        }
    }

    /// Attaches structured detail to the event.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Port for recording realtime lifecycle events.
///
/// Implementations must be cheap and non-blocking from the caller's
/// perspective; the core awaits `record` but ignores its outcome.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record one event. Errors are the sink's problem, not the caller's.
    async fn record(&self, event: AuditEvent);
}

/// Sink that discards everything (default when no analytics backend is
/// configured).
#[derive(Debug, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn record(&self, _event: AuditEvent) {}
}
