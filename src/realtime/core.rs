//! Messaging core: orchestrates connections, rooms, presence, rate
//! limiting, and offline delivery.
//!
//! This is the only component the transport layer talks to. Every client
//! event flows through the same pipeline:
//!
//! ```text
//! resolve connection → rate limit → authorize → handle → broadcast
//! ```
//!
//! Broadcasts deliver to every live connection of every room member;
//! members with no live connection get chat messages routed to the
//! offline queue instead. A single failed delivery is logged and skipped,
//! never aborting the rest of the fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::RealtimeConfig;
use crate::domain::foundation::{
    ErrorCode, RoomId, SessionId, SocketId, Timestamp, UserId,
};
use crate::domain::realtime::{
    ChatMessage, Connection, ConnectionMeta, LockOutcome, Permission, PlanUpdate, UnlockOutcome,
};
use crate::ports::{AuditEvent, AuditKind, AuthCredentials, AuthProvider, EventSink};

use super::connections::{ConnectionRegistry, OutboundSender};
use super::events::{
    ClientEvent, ConnectionEstablishedData, CursorMovedData, CursorMovedRequest, EventEnvelope,
    JoinRoomRequest, LockRequest, MessageReceivedData, MessageSentData, PlanUpdateProcessedData,
    PlanUpdateRequest, PlanUpdatedData, PongData, ResourceLockFailedData, ResourceLockedData,
    ResourceUnlockedData, RoomJoinedData, RoomLeftData, SendMessageRequest, ServerEvent,
    TypingData, UserJoinedData, UserLeftData,
};
use super::offline::OfflineQueue;
use super::presence::{CursorUpdate, PresenceTracker};
use super::rate_limit::{EventKind, RateDecision, RateLimiter};
use super::rooms::{RoomError, RoomRegistry, RoomStats};

/// A connect attempt rejected before a connection was registered.
///
/// The transport must emit the error and terminate.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectRejection {
    pub code: ErrorCode,
    pub message: String,
}

impl ConnectRejection {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error frame to send before closing the transport.
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope::error(self.code, self.message.clone())
    }
}

/// Aggregate statistics for the health surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreStats {
    pub total_connections: usize,
    pub total_users: usize,
    pub total_rooms: usize,
    pub rooms: Vec<RoomStats>,
    pub queued_messages: HashMap<UserId, usize>,
}

/// Recipients excluded from a room broadcast.
#[derive(Clone, Copy)]
enum Exclude<'a> {
    None,
    /// Skip every connection of this user (typing/cursor/lock fan-out).
    User(&'a UserId),
    /// Skip one connection only (message fan-out: the sender's other
    /// tabs still receive the message; the originating socket gets the
    /// ack instead).
    Socket(&'a SocketId),
}

/// The realtime engine facade.
pub struct MessagingCore {
    config: RealtimeConfig,
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    presence: PresenceTracker,
    limiter: RateLimiter,
    offline: OfflineQueue,
    auth: Arc<dyn AuthProvider>,
    sink: Arc<dyn EventSink>,
}

impl MessagingCore {
    /// Builds the engine with its collaborators.
    pub fn new(
        config: RealtimeConfig,
        auth: Arc<dyn AuthProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            rooms: RoomRegistry::new(config.history_capacity),
            presence: PresenceTracker::new(),
            limiter: RateLimiter::new(&config),
            offline: OfflineQueue::new(config.queue_capacity),
            auth,
            sink,
            config,
        }
    }

    /// The connection registry (read-mostly surface for composition).
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// The room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// The presence tracker.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    // ─── Connection lifecycle ────────────────────────────────────────

    /// Admits a new transport: origin gate, authentication, connection
    /// rate limit, then registration. Emits `connection_established` on
    /// success.
    pub async fn connect(
        &self,
        credentials: AuthCredentials,
        origin: Option<&str>,
        meta: ConnectionMeta,
        sender: OutboundSender,
    ) -> Result<Connection, ConnectRejection> {
        if !self.auth.origin_allowed(origin) {
            tracing::warn!(origin = origin.unwrap_or("<none>"), "Rejected origin");
            return Err(ConnectRejection::new(ErrorCode::InvalidOrigin, "Invalid origin"));
        }

        let user = self.auth.authenticate(&credentials).await.map_err(|err| {
            tracing::warn!("Authentication failed: {}", err);
            ConnectRejection::new(ErrorCode::AuthFailed, err.to_string())
        })?;

        if let RateDecision::Limited { retry_after_secs } =
            self.limiter.check_and_consume(&user.id, EventKind::Connection)
        {
            return Err(ConnectRejection::new(
                ErrorCode::RateLimit,
                format!("Rate limit exceeded. Retry after {} seconds.", retry_after_secs),
            ));
        }

        let session_id = SessionId::new(credentials.session_id.clone().unwrap_or_default());
        let socket_id = SocketId::new();
        let connection = self
            .connections
            .add(socket_id, user.clone(), session_id, meta, sender)
            .await;

        let available_rooms = self.rooms.rooms_for_user(&user.id).await;
        self.emit_to_socket(
            &socket_id,
            EventEnvelope::new(ServerEvent::ConnectionEstablished(ConnectionEstablishedData {
                user_id: user.id.clone(),
                socket_id,
                available_rooms,
            }))
            .from_user(user.id.clone()),
        )
        .await;

        self.sink
            .record(AuditEvent::new(AuditKind::Connect, user.id.clone(), None))
            .await;
        Ok(connection)
    }

    /// Tears a connection down from any state and cascades cleanup:
    /// room membership, presence, held locks, `user_left` broadcasts.
    pub async fn disconnect(&self, socket_id: &SocketId) {
        let Some(connection) = self.connections.remove(socket_id).await else {
            return; // Already gone; removal is idempotent.
        };

        let departures = self
            .rooms
            .detach_socket_everywhere(&connection.user_id, socket_id)
            .await;
        for departure in departures {
            self.presence
                .clear_user(&departure.room_id, &connection.user_id)
                .await;
            self.broadcast_room(
                &departure.room_id,
                EventEnvelope::new(ServerEvent::UserLeft(UserLeftData {
                    user_id: connection.user_id.clone(),
                    room_id: departure.room_id.clone(),
                    remaining_users: departure.remaining_users,
                }))
                .in_room(departure.room_id.clone())
                .from_user(connection.user_id.clone()),
                Exclude::None,
            )
            .await;

            for lock in departure.released_locks {
                self.broadcast_room(
                    &departure.room_id,
                    EventEnvelope::new(ServerEvent::ResourceUnlocked(ResourceUnlockedData {
                        resource_type: lock.resource_type,
                        resource_id: lock.resource_id,
                        unlocked_by: connection.user_id.clone(),
                    }))
                    .in_room(departure.room_id.clone()),
                    Exclude::None,
                )
                .await;
            }
        }

        self.sink
            .record(AuditEvent::new(
                AuditKind::Disconnect,
                connection.user_id.clone(),
                None,
            ))
            .await;
        tracing::info!(user_id = %connection.user_id, socket_id = %socket_id, "Disconnected");
    }

    /// Disconnects every connection idle longer than the configured
    /// timeout. Returns the number swept.
    pub async fn sweep_idle(&self) -> usize {
        let cutoff = Timestamp::now().minus_secs(self.config.idle_timeout_secs);
        let idle = self.connections.idle_sockets(&cutoff).await;
        let count = idle.len();
        for socket_id in idle {
            self.disconnect(&socket_id).await;
        }
        if count > 0 {
            tracing::info!(count, "Swept idle connections");
        }
        count
    }

    // ─── Event dispatch ──────────────────────────────────────────────

    /// Routes one client event through rate limiting, authorization, and
    /// its handler. All failures are reported to the sending socket as
    /// `error` events; none of them terminate the transport.
    pub async fn dispatch(&self, socket_id: &SocketId, event: ClientEvent) {
        let Some(connection) = self.connections.get(socket_id).await else {
            tracing::warn!(socket_id = %socket_id, "Event for unknown connection dropped");
            return;
        };
        self.connections.update_activity(socket_id).await;

        if matches!(event, ClientEvent::Connect(_)) {
            tracing::debug!(socket_id = %socket_id, "Duplicate connect event ignored");
            return;
        }

        if let Some(kind) = event.kind() {
            if let RateDecision::Limited { retry_after_secs } =
                self.limiter.check_and_consume(&connection.user_id, kind)
            {
                self.emit_to_socket(socket_id, EventEnvelope::rate_limited(retry_after_secs))
                    .await;
                return;
            }
        }

        match event {
            // Duplicate connects were filtered before rate limiting.
            ClientEvent::Connect(_) => {}
            ClientEvent::JoinRoom(req) => self.handle_join_room(&connection, req).await,
            ClientEvent::LeaveRoom(req) => self.handle_leave_room(&connection, req.room_id).await,
            ClientEvent::SendMessage(req) => self.handle_send_message(&connection, req).await,
            ClientEvent::TypingStart(req) => {
                self.handle_typing(&connection, req.room_id, true).await
            }
            ClientEvent::TypingStop(req) => {
                self.handle_typing(&connection, req.room_id, false).await
            }
            ClientEvent::CursorMoved(req) => self.handle_cursor(&connection, req).await,
            ClientEvent::PlanUpdated(req) => self.handle_plan_update(&connection, req).await,
            ClientEvent::LockResource(req) => self.handle_lock(&connection, req).await,
            ClientEvent::UnlockResource(req) => self.handle_unlock(&connection, req).await,
            ClientEvent::Ping => {
                self.emit_to_socket(
                    socket_id,
                    EventEnvelope::new(ServerEvent::Pong(PongData {
                        timestamp: Timestamp::now(),
                    })),
                )
                .await;
            }
        }
    }

    // ─── Handlers ────────────────────────────────────────────────────

    async fn handle_join_room(&self, connection: &Connection, req: JoinRoomRequest) {
        let Some(user) = self.connections.profile(&connection.socket_id).await else {
            return;
        };

        let outcome = match self
            .rooms
            .join(
                &req.room_id,
                req.room_name.as_deref(),
                &user,
                connection.session_id.clone(),
                connection.socket_id,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                let (code, message) = match err {
                    RoomError::NotFound => (ErrorCode::RoomNotFound, "Room not found"),
                    RoomError::AccessDenied => (ErrorCode::AccessDenied, "Access denied to room"),
                    _ => (ErrorCode::JoinFailed, "Failed to join room"),
                };
                self.emit_error(&connection.socket_id, code, message).await;
                return;
            }
        };

        let user_count = outcome.members.len();
        self.emit_to_socket(
            &connection.socket_id,
            EventEnvelope::new(ServerEvent::RoomJoined(RoomJoinedData {
                room_id: req.room_id.clone(),
                room_info: outcome.info,
                message_history: outcome.history,
                active_users: outcome.members,
            }))
            .in_room(req.room_id.clone())
            .from_user(connection.user_id.clone()),
        )
        .await;

        // Only the user's first socket in the room announces a join;
        // further tabs are invisible to other members.
        if outcome.newly_joined {
            self.broadcast_room(
                &req.room_id,
                EventEnvelope::new(ServerEvent::UserJoined(UserJoinedData {
                    user: outcome.member,
                    room_id: req.room_id.clone(),
                    user_count,
                }))
                .in_room(req.room_id.clone())
                .from_user(connection.user_id.clone()),
                Exclude::User(&connection.user_id),
            )
            .await;
        }

        self.deliver_queued(connection).await;
        self.sink
            .record(AuditEvent::new(
                AuditKind::RoomJoined,
                connection.user_id.clone(),
                Some(req.room_id.clone()),
            ))
            .await;
        tracing::info!(user_id = %connection.user_id, room_id = %req.room_id, "Joined room");
    }

    async fn handle_leave_room(&self, connection: &Connection, room_id: RoomId) {
        let outcome = match self.rooms.leave(&room_id, &connection.user_id).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.emit_error(
                    &connection.socket_id,
                    ErrorCode::LeaveFailed,
                    "Failed to leave room",
                )
                .await;
                return;
            }
        };

        self.presence.clear_user(&room_id, &connection.user_id).await;
        self.emit_to_socket(
            &connection.socket_id,
            EventEnvelope::new(ServerEvent::RoomLeft(RoomLeftData {
                room_id: room_id.clone(),
            }))
            .in_room(room_id.clone())
            .from_user(connection.user_id.clone()),
        )
        .await;
        self.broadcast_room(
            &room_id,
            EventEnvelope::new(ServerEvent::UserLeft(UserLeftData {
                user_id: connection.user_id.clone(),
                room_id: room_id.clone(),
                remaining_users: outcome.remaining_users,
            }))
            .in_room(room_id.clone())
            .from_user(connection.user_id.clone()),
            Exclude::None,
        )
        .await;

        for lock in outcome.released_locks {
            self.broadcast_room(
                &room_id,
                EventEnvelope::new(ServerEvent::ResourceUnlocked(ResourceUnlockedData {
                    resource_type: lock.resource_type,
                    resource_id: lock.resource_id,
                    unlocked_by: connection.user_id.clone(),
                }))
                .in_room(room_id.clone()),
                Exclude::None,
            )
            .await;
        }

        self.sink
            .record(AuditEvent::new(
                AuditKind::RoomLeft,
                connection.user_id.clone(),
                Some(room_id.clone()),
            ))
            .await;
        tracing::info!(user_id = %connection.user_id, room_id = %room_id, "Left room");
    }

    async fn handle_send_message(&self, connection: &Connection, req: SendMessageRequest) {
        let content = req.content.trim();
        if content.is_empty() {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::MissingData,
                "Room ID and content required",
            )
            .await;
            return;
        }
        if content.chars().count() > self.config.max_message_chars {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::MessageTooLong,
                format!(
                    "Message too long (max {} characters)",
                    self.config.max_message_chars
                ),
            )
            .await;
            return;
        }
        if !self.rooms.is_member(&req.room_id, &connection.user_id).await {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::SendFailed,
                "Not a member of the room",
            )
            .await;
            return;
        }
        if !self
            .rooms
            .has_permission(&req.room_id, &connection.user_id, Permission::Write)
            .await
        {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::NoWritePermission,
                "No write permission for room",
            )
            .await;
            return;
        }

        let message = ChatMessage::new(
            req.room_id.clone(),
            connection.user_id.clone(),
            content,
            req.message_type,
            req.metadata,
        );
        if self
            .rooms
            .push_message(&req.room_id, message.clone())
            .await
            .is_err()
        {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::SendFailed,
                "Failed to send message",
            )
            .await;
            return;
        }

        self.emit_to_socket(
            &connection.socket_id,
            EventEnvelope::new(ServerEvent::MessageSent(MessageSentData {
                message_id: message.id,
                timestamp: message.timestamp,
            }))
            .in_room(req.room_id.clone())
            .from_user(connection.user_id.clone()),
        )
        .await;

        self.broadcast_room(
            &req.room_id,
            EventEnvelope::new(ServerEvent::MessageReceived(MessageReceivedData {
                message: message.clone(),
                queued: false,
                queued_at: None,
            }))
            .in_room(req.room_id.clone())
            .from_user(connection.user_id.clone()),
            Exclude::Socket(&connection.socket_id),
        )
        .await;

        // Members known to the room but with zero live connections get
        // the message queued for their next visit.
        for holder in self.rooms.permission_holders(&req.room_id).await {
            if holder != connection.user_id && !self.connections.is_user_online(&holder).await {
                self.offline
                    .enqueue(holder, req.room_id.clone(), message.clone());
            }
        }

        self.sink
            .record(
                AuditEvent::new(
                    AuditKind::MessageSent,
                    connection.user_id.clone(),
                    Some(req.room_id.clone()),
                )
                .with_detail(serde_json::json!({"messageId": message.id})),
            )
            .await;
        tracing::debug!(message_id = %message.id, room_id = %req.room_id, "Message sent");
    }

    async fn handle_typing(&self, connection: &Connection, room_id: RoomId, is_typing: bool) {
        if !self.rooms.is_member(&room_id, &connection.user_id).await {
            self.emit_error(&connection.socket_id, ErrorCode::AccessDenied, "Not in room")
                .await;
            return;
        }

        let typing_users = self
            .presence
            .set_typing(&room_id, &connection.user_id, is_typing)
            .await;
        let data = TypingData {
            user_id: connection.user_id.clone(),
            room_id: room_id.clone(),
            typing_users,
        };
        let event = if is_typing {
            ServerEvent::TypingStart(data)
        } else {
            ServerEvent::TypingStop(data)
        };
        self.broadcast_room(
            &room_id,
            EventEnvelope::new(event)
                .in_room(room_id.clone())
                .from_user(connection.user_id.clone()),
            Exclude::User(&connection.user_id),
        )
        .await;
    }

    async fn handle_cursor(&self, connection: &Connection, req: CursorMovedRequest) {
        if !self.rooms.is_member(&req.room_id, &connection.user_id).await {
            self.emit_error(&connection.socket_id, ErrorCode::AccessDenied, "Not in room")
                .await;
            return;
        }

        let cursor = self
            .presence
            .set_cursor(
                &req.room_id,
                &connection.user_id,
                CursorUpdate {
                    x: req.x,
                    y: req.y,
                    element_id: req.element_id,
                    selection_start: req.selection_start,
                    selection_end: req.selection_end,
                },
            )
            .await;

        self.broadcast_room(
            &req.room_id,
            EventEnvelope::new(ServerEvent::CursorMoved(CursorMovedData { cursor }))
                .in_room(req.room_id.clone())
                .from_user(connection.user_id.clone()),
            Exclude::User(&connection.user_id),
        )
        .await;
    }

    async fn handle_plan_update(&self, connection: &Connection, req: PlanUpdateRequest) {
        let room_id = RoomId::for_planning_session(&req.session_id);
        if !self.rooms.is_member(&room_id, &connection.user_id).await {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::NotInSession,
                "Not in planning session",
            )
            .await;
            return;
        }
        let Some(operation) = req.parsed_operation() else {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::InvalidOperation,
                "Invalid operation",
            )
            .await;
            return;
        };
        if !self
            .rooms
            .has_permission(&room_id, &connection.user_id, Permission::Write)
            .await
        {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::NoWritePermission,
                "No write permission for planning session",
            )
            .await;
            return;
        }

        let update = PlanUpdate::new(
            room_id.clone(),
            connection.user_id.clone(),
            operation,
            req.target_type.clone(),
            req.target_id.clone(),
            req.changes,
        );
        self.broadcast_room(
            &room_id,
            EventEnvelope::new(ServerEvent::PlanUpdated(PlanUpdatedData {
                update: update.clone(),
            }))
            .in_room(room_id.clone())
            .from_user(connection.user_id.clone()),
            Exclude::User(&connection.user_id),
        )
        .await;
        self.emit_to_socket(
            &connection.socket_id,
            EventEnvelope::new(ServerEvent::PlanUpdateProcessed(PlanUpdateProcessedData {
                session_id: req.session_id,
                operation,
                target_type: req.target_type,
                target_id: req.target_id,
            }))
            .in_room(room_id.clone())
            .from_user(connection.user_id.clone()),
        )
        .await;

        self.sink
            .record(
                AuditEvent::new(
                    AuditKind::PlanUpdated,
                    connection.user_id.clone(),
                    Some(room_id),
                )
                .with_detail(serde_json::json!({"updateId": update.id})),
            )
            .await;
    }

    async fn handle_lock(&self, connection: &Connection, req: LockRequest) {
        let room_id = RoomId::for_planning_session(&req.session_id);
        if !self.rooms.is_member(&room_id, &connection.user_id).await {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::NotInSession,
                "Not in planning session",
            )
            .await;
            return;
        }
        let Some(user) = self.connections.profile(&connection.socket_id).await else {
            return;
        };

        match self
            .rooms
            .lock_resource(
                &room_id,
                &req.resource_type,
                &req.resource_id,
                &connection.user_id,
                user.display_name_or_id(),
            )
            .await
        {
            Ok(LockOutcome::Acquired(lock)) => {
                let data = ResourceLockedData::from_lock(&lock);
                self.emit_to_socket(
                    &connection.socket_id,
                    EventEnvelope::new(ServerEvent::ResourceLocked(data.clone()))
                        .in_room(room_id.clone())
                        .from_user(connection.user_id.clone()),
                )
                .await;
                self.broadcast_room(
                    &room_id,
                    EventEnvelope::new(ServerEvent::ResourceLocked(data))
                        .in_room(room_id.clone())
                        .from_user(connection.user_id.clone()),
                    Exclude::User(&connection.user_id),
                )
                .await;
                tracing::info!(
                    user_id = %connection.user_id,
                    resource = %format!("{}:{}", req.resource_type, req.resource_id),
                    "Resource locked"
                );
            }
            Ok(LockOutcome::Held(lock)) => {
                self.emit_to_socket(
                    &connection.socket_id,
                    EventEnvelope::new(ServerEvent::ResourceLockFailed(ResourceLockFailedData {
                        resource_type: req.resource_type,
                        resource_id: req.resource_id,
                        locked_by: lock.user_id,
                        message: "Resource is already locked by another user".to_string(),
                    }))
                    .in_room(room_id),
                )
                .await;
            }
            Err(_) => {
                self.emit_error(
                    &connection.socket_id,
                    ErrorCode::NotInSession,
                    "Not in planning session",
                )
                .await;
            }
        }
    }

    async fn handle_unlock(&self, connection: &Connection, req: LockRequest) {
        let room_id = RoomId::for_planning_session(&req.session_id);
        if !self.rooms.is_member(&room_id, &connection.user_id).await {
            self.emit_error(
                &connection.socket_id,
                ErrorCode::NotInSession,
                "Not in planning session",
            )
            .await;
            return;
        }

        match self
            .rooms
            .unlock_resource(
                &room_id,
                &req.resource_type,
                &req.resource_id,
                &connection.user_id,
            )
            .await
        {
            Ok(UnlockOutcome::Released) => {
                let data = ResourceUnlockedData {
                    resource_type: req.resource_type,
                    resource_id: req.resource_id,
                    unlocked_by: connection.user_id.clone(),
                };
                self.emit_to_socket(
                    &connection.socket_id,
                    EventEnvelope::new(ServerEvent::ResourceUnlocked(data.clone()))
                        .in_room(room_id.clone())
                        .from_user(connection.user_id.clone()),
                )
                .await;
                self.broadcast_room(
                    &room_id,
                    EventEnvelope::new(ServerEvent::ResourceUnlocked(data))
                        .in_room(room_id.clone())
                        .from_user(connection.user_id.clone()),
                    Exclude::User(&connection.user_id),
                )
                .await;
            }
            Ok(UnlockOutcome::NotLocked) => {
                self.emit_error(
                    &connection.socket_id,
                    ErrorCode::NotLocked,
                    "Resource is not locked",
                )
                .await;
            }
            Ok(UnlockOutcome::Denied { .. }) => {
                self.emit_error(
                    &connection.socket_id,
                    ErrorCode::UnlockDenied,
                    "Cannot unlock resource locked by another user",
                )
                .await;
            }
            Err(_) => {
                self.emit_error(
                    &connection.socket_id,
                    ErrorCode::NotInSession,
                    "Not in planning session",
                )
                .await;
            }
        }
    }

    // ─── Delivery ────────────────────────────────────────────────────

    /// Drains the user's offline queue into the joining socket,
    /// preserving send order.
    async fn deliver_queued(&self, connection: &Connection) {
        let queued = self.offline.drain(&connection.user_id);
        if queued.is_empty() {
            return;
        }
        let count = queued.len();
        for entry in queued {
            let sender_id = entry.message.user_id.clone();
            self.emit_to_socket(
                &connection.socket_id,
                EventEnvelope::new(ServerEvent::MessageReceived(MessageReceivedData {
                    message: entry.message,
                    queued: true,
                    queued_at: Some(entry.created_at),
                }))
                .in_room(entry.room_id)
                .from_user(sender_id),
            )
            .await;
        }
        tracing::info!(user_id = %connection.user_id, count, "Delivered queued messages");
    }

    async fn emit_to_socket(&self, socket_id: &SocketId, envelope: EventEnvelope) {
        if let Some(sender) = self.connections.sender_for(socket_id).await {
            if sender.send(envelope).is_err() {
                tracing::debug!(socket_id = %socket_id, "Dropped frame for closed transport");
            }
        }
    }

    async fn emit_error(&self, socket_id: &SocketId, code: ErrorCode, message: impl Into<String>) {
        self.emit_to_socket(socket_id, EventEnvelope::error(code, message))
            .await;
    }

    /// Delivers to every live connection of every room member, minus the
    /// exclusion. Failed sends are skipped, never fatal.
    async fn broadcast_room(&self, room_id: &RoomId, envelope: EventEnvelope, exclude: Exclude<'_>) {
        for member in self.rooms.member_ids(room_id).await {
            if let Exclude::User(user_id) = exclude {
                if member == *user_id {
                    continue;
                }
            }
            for (socket_id, sender) in self.connections.senders_for_user(&member).await {
                if let Exclude::Socket(skip) = exclude {
                    if socket_id == *skip {
                        continue;
                    }
                }
                if sender.send(envelope.clone()).is_err() {
                    tracing::debug!(
                        socket_id = %socket_id,
                        event = envelope.event_type(),
                        "Broadcast delivery failed, recipient skipped"
                    );
                }
            }
        }
    }

    // ─── Introspection ───────────────────────────────────────────────

    /// Aggregate statistics snapshot.
    pub async fn stats(&self) -> CoreStats {
        CoreStats {
            total_connections: self.connections.connection_count().await,
            total_users: self.connections.user_count().await,
            total_rooms: self.rooms.room_count().await,
            rooms: self.rooms.stats().await,
            queued_messages: self.offline.depths(),
        }
    }
}
