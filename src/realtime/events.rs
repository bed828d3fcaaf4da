//! Transport-agnostic event protocol.
//!
//! Every frame is a JSON envelope `{type, data, roomId?, userId?,
//! timestamp, eventId}`. Client events deserialize into a tagged enum so
//! dispatch is exhaustive at compile time; unknown event names fail at
//! the parse boundary rather than deep in a handler.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ErrorCode, EventId, MessageId, RoomId, SessionId, SocketId, Timestamp, UserId,
};
use crate::domain::realtime::{
    ChatMessage, CursorPosition, MessageType, PlanOperation, PlanUpdate, ResourceLock, RoomInfo,
    RoomMember,
};
use crate::ports::AuthCredentials;

use super::rate_limit::EventKind;

// ============================================
// Client → Core Events
// ============================================

/// All events a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Authentication handshake; must be the first event on a transport.
    Connect(ConnectRequest),
    JoinRoom(JoinRoomRequest),
    LeaveRoom(LeaveRoomRequest),
    SendMessage(SendMessageRequest),
    TypingStart(TypingRequest),
    TypingStop(TypingRequest),
    CursorMoved(CursorMovedRequest),
    PlanUpdated(PlanUpdateRequest),
    LockResource(LockRequest),
    UnlockResource(LockRequest),
    Ping,
}

impl ClientEvent {
    /// The rate-limit class this event consumes from, if any.
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            ClientEvent::Connect(_) => Some(EventKind::Connection),
            ClientEvent::SendMessage(_) => Some(EventKind::Message),
            ClientEvent::TypingStart(_) | ClientEvent::TypingStop(_) => Some(EventKind::Typing),
            ClientEvent::CursorMoved(_) => Some(EventKind::Cursor),
            ClientEvent::PlanUpdated(_) => Some(EventKind::PlanUpdate),
            ClientEvent::LockResource(_) | ClientEvent::UnlockResource(_) => Some(EventKind::Lock),
            ClientEvent::JoinRoom(_) | ClientEvent::LeaveRoom(_) | ClientEvent::Ping => None,
        }
    }
}

/// Payload of the `connect` handshake event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(flatten)]
    pub credentials: AuthCredentials,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedRequest {
    pub room_id: RoomId,
    pub x: f64,
    pub y: f64,
    pub element_id: Option<String>,
    pub selection_start: Option<u32>,
    pub selection_end: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdateRequest {
    pub session_id: SessionId,
    /// Validated in the handler so bad values map to `INVALID_OPERATION`
    /// rather than a parse failure.
    pub operation: String,
    pub target_type: String,
    pub target_id: String,
    #[serde(default)]
    pub changes: serde_json::Value,
}

impl PlanUpdateRequest {
    /// Parses the operation name, if valid.
    pub fn parsed_operation(&self) -> Option<PlanOperation> {
        match self.operation.as_str() {
            "create" => Some(PlanOperation::Create),
            "update" => Some(PlanOperation::Update),
            "delete" => Some(PlanOperation::Delete),
            "move" => Some(PlanOperation::Move),
            "reorder" => Some(PlanOperation::Reorder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub session_id: SessionId,
    pub resource_type: String,
    pub resource_id: String,
}

// ============================================
// Core → Client Events
// ============================================

/// All events the core may emit to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionEstablished(ConnectionEstablishedData),
    RoomJoined(RoomJoinedData),
    RoomLeft(RoomLeftData),
    UserJoined(UserJoinedData),
    UserLeft(UserLeftData),
    MessageSent(MessageSentData),
    MessageReceived(MessageReceivedData),
    TypingStart(TypingData),
    TypingStop(TypingData),
    CursorMoved(CursorMovedData),
    PlanUpdateProcessed(PlanUpdateProcessedData),
    PlanUpdated(PlanUpdatedData),
    ResourceLocked(ResourceLockedData),
    ResourceUnlocked(ResourceUnlockedData),
    ResourceLockFailed(ResourceLockFailedData),
    Pong(PongData),
    Error(ErrorData),
}

impl ServerEvent {
    /// Wire name of this event, for logging and assertions.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionEstablished(_) => "connection_established",
            ServerEvent::RoomJoined(_) => "room_joined",
            ServerEvent::RoomLeft(_) => "room_left",
            ServerEvent::UserJoined(_) => "user_joined",
            ServerEvent::UserLeft(_) => "user_left",
            ServerEvent::MessageSent(_) => "message_sent",
            ServerEvent::MessageReceived(_) => "message_received",
            ServerEvent::TypingStart(_) => "typing_start",
            ServerEvent::TypingStop(_) => "typing_stop",
            ServerEvent::CursorMoved(_) => "cursor_moved",
            ServerEvent::PlanUpdateProcessed(_) => "plan_update_processed",
            ServerEvent::PlanUpdated(_) => "plan_updated",
            ServerEvent::ResourceLocked(_) => "resource_locked",
            ServerEvent::ResourceUnlocked(_) => "resource_unlocked",
            ServerEvent::ResourceLockFailed(_) => "resource_lock_failed",
            ServerEvent::Pong(_) => "pong",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablishedData {
    pub user_id: UserId,
    pub socket_id: SocketId,
    pub available_rooms: Vec<RoomInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedData {
    pub room_id: RoomId,
    pub room_info: RoomInfo,
    pub message_history: Vec<ChatMessage>,
    pub active_users: Vec<RoomMember>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeftData {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedData {
    pub user: RoomMember,
    pub room_id: RoomId,
    pub user_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftData {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub remaining_users: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentData {
    pub message_id: MessageId,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceivedData {
    pub message: ChatMessage,
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub typing_users: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedData {
    pub cursor: CursorPosition,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdateProcessedData {
    pub session_id: SessionId,
    pub operation: PlanOperation,
    pub target_type: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdatedData {
    pub update: PlanUpdate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLockedData {
    pub resource_type: String,
    pub resource_id: String,
    pub locked_by: UserId,
    pub locked_by_name: String,
    pub locked_at: Timestamp,
}

impl ResourceLockedData {
    /// Builds the payload from a domain lock.
    pub fn from_lock(lock: &ResourceLock) -> Self {
        Self {
            resource_type: lock.resource_type.clone(),
            resource_id: lock.resource_id.clone(),
            locked_by: lock.user_id.clone(),
            locked_by_name: lock.user_name.clone(),
            locked_at: lock.locked_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUnlockedData {
    pub resource_type: String,
    pub resource_id: String,
    pub unlocked_by: UserId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLockFailedData {
    pub resource_type: String,
    pub resource_id: String,
    pub locked_by: UserId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongData {
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

// ============================================
// Envelope
// ============================================

/// Outbound frame: a server event plus routing metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub timestamp: Timestamp,
    pub event_id: EventId,
}

impl EventEnvelope {
    /// Wraps a server event with a fresh id and timestamp.
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            room_id: None,
            user_id: None,
            timestamp: Timestamp::now(),
            event_id: EventId::new(),
        }
    }

    /// Attaches the room this event concerns.
    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    /// Attaches the user that caused this event.
    pub fn from_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Builds an `error` envelope.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ServerEvent::Error(ErrorData {
            message: message.into(),
            code,
            retry_after_secs: None,
        }))
    }

    /// Builds a rate-limit `error` envelope carrying the retry hint.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(ServerEvent::Error(ErrorData {
            message: format!("Rate limit exceeded. Retry after {} seconds.", retry_after_secs),
            code: ErrorCode::RateLimit,
            retry_after_secs: Some(retry_after_secs),
        }))
    }

    /// Wire name of the wrapped event.
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_deserializes_send_message() {
        let json = r#"{
            "type": "send_message",
            "roomId": "chat_1",
            "content": "hello",
            "messageType": "text"
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage(req) => {
                assert_eq!(req.room_id.as_str(), "chat_1");
                assert_eq!(req.content, "hello");
                assert_eq!(req.message_type, MessageType::Text);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn client_event_deserializes_ping() {
        let event: ClientEvent = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
    }

    #[test]
    fn client_event_deserializes_connect_with_flattened_credentials() {
        let json = r#"{"type": "connect", "token": "abc", "sessionId": "week-3"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Connect(req) => {
                assert_eq!(req.credentials.token.as_deref(), Some("abc"));
                assert_eq!(req.credentials.session_id.as_deref(), Some("week-3"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type": "shout"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn message_type_defaults_to_text() {
        let json = r#"{"type": "send_message", "roomId": "chat_1", "content": "hi"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage(req) => assert_eq!(req.message_type, MessageType::Text),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn invalid_plan_operation_is_deferred_to_handler() {
        let json = r#"{
            "type": "plan_updated",
            "sessionId": "s1",
            "operation": "rename",
            "targetType": "activity",
            "targetId": "42"
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::PlanUpdated(req) => assert!(req.parsed_operation().is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn envelope_serializes_type_data_and_metadata() {
        let envelope = EventEnvelope::new(ServerEvent::Pong(PongData {
            timestamp: Timestamp::now(),
        }))
        .from_user(UserId::new("alice").unwrap());

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""type":"pong""#));
        assert!(json.contains(r#""data":{"#));
        assert!(json.contains(r#""userId":"alice""#));
        assert!(json.contains(r#""eventId""#));
        assert!(!json.contains(r#""roomId""#));
    }

    #[test]
    fn error_envelope_carries_code_and_retry() {
        let envelope = EventEnvelope::rate_limited(12);
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""code":"RATE_LIMIT""#));
        assert!(json.contains(r#""retryAfterSecs":12"#));
    }

    #[test]
    fn rate_limit_kinds_cover_limited_events() {
        let typing: ClientEvent =
            serde_json::from_str(r#"{"type": "typing_start", "roomId": "chat_1"}"#).unwrap();
        assert_eq!(typing.kind(), Some(EventKind::Typing));

        let ping: ClientEvent = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(ping.kind(), None);
    }
}
