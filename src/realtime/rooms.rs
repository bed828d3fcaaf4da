//! Room lifecycle, membership, history, and locks.
//!
//! # Locking
//!
//! Rooms live behind one exclusive lock each; the registry map itself is
//! guarded by an outer `RwLock`. Lock order is always map → room, and no
//! task ever re-enters the map while holding a room lock, so the two
//! levels cannot deadlock. Room operations are short, in-memory, and
//! never perform I/O inside the critical section.
//!
//! # Garbage collection
//!
//! A room with zero members and zero live locks is collectable. Removal
//! marks the state `retired` so a racing join that already cloned the
//! room handle retries through the create path instead of mutating an
//! orphan.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::domain::foundation::{AuthenticatedUser, RoomId, SessionId, SocketId, UserId};
use crate::domain::realtime::{
    ChatMessage, DetachOutcome, LockOutcome, MemberProfile, Permission, ResourceLock, Room,
    RoomInfo, RoomMember, RoomType, UnlockOutcome,
};

/// Errors surfaced by room operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Room already exists")]
    AlreadyExists,

    #[error("Access denied to room")]
    AccessDenied,

    #[error("Not a member of the room")]
    NotMember,
}

/// Result of joining a room.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// True when this was the user's first socket in the room.
    pub newly_joined: bool,
    /// The joining user's membership snapshot.
    pub member: RoomMember,
    pub info: RoomInfo,
    pub members: Vec<RoomMember>,
    pub history: Vec<ChatMessage>,
}

/// Result of leaving a room.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub remaining_users: usize,
    /// Locks the departing user held, released as part of leaving.
    pub released_locks: Vec<ResourceLock>,
}

/// One room a user fully left during a disconnect cascade.
#[derive(Debug, Clone)]
pub struct RoomDeparture {
    pub room_id: RoomId,
    pub remaining_users: usize,
    pub released_locks: Vec<ResourceLock>,
}

/// Per-room statistics for the health surface.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub room_id: RoomId,
    pub room_type: RoomType,
    pub user_count: usize,
    pub message_count: usize,
}

struct RoomState {
    room: Room,
    history: VecDeque<ChatMessage>,
    retired: bool,
}

type RoomHandle = Arc<Mutex<RoomState>>;

/// Registry of all live rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    history_capacity: usize,
}

impl RoomRegistry {
    /// Creates an empty registry retaining `history_capacity` messages
    /// per room.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history_capacity,
        }
    }

    /// Creates a room explicitly. Fails if the id is taken; "create if
    /// absent" semantics belong to the caller.
    pub async fn create(
        &self,
        id: RoomId,
        name: impl Into<String>,
        room_type: RoomType,
        created_by: UserId,
        settings: Option<serde_json::Value>,
    ) -> Result<RoomInfo, RoomError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&id) {
            return Err(RoomError::AlreadyExists);
        }
        let room = Room::new(id.clone(), name, room_type, created_by, settings);
        let info = room.info();
        rooms.insert(
            id.clone(),
            Arc::new(Mutex::new(RoomState {
                room,
                history: VecDeque::new(),
                retired: false,
            })),
        );
        tracing::info!(room_id = %id, "Room created");
        Ok(info)
    }

    /// Snapshot of a room, if it exists.
    pub async fn get_info(&self, room_id: &RoomId) -> Option<RoomInfo> {
        let handle = self.handle(room_id).await?;
        let state = handle.lock().await;
        if state.retired {
            return None;
        }
        Some(state.room.info())
    }

    /// Joins a room, creating it on demand for auto-creatable classes
    /// (`chat_*`, `planning_*`).
    ///
    /// Private rooms refuse users without an explicit permission grant.
    pub async fn join(
        &self,
        room_id: &RoomId,
        room_name: Option<&str>,
        user: &AuthenticatedUser,
        session_id: SessionId,
        socket_id: SocketId,
    ) -> Result<JoinOutcome, RoomError> {
        loop {
            let handle = match self.handle(room_id).await {
                Some(handle) => handle,
                None => self.auto_create(room_id, room_name, &user.id).await?,
            };

            let mut state = handle.lock().await;
            if state.retired {
                // Lost a race with the garbage collector; re-resolve.
                continue;
            }

            if state.room.room_type == RoomType::Private
                && !state.room.holds_permissions(&user.id)
            {
                return Err(RoomError::AccessDenied);
            }

            let profile = MemberProfile {
                name: user.display_name_or_id().to_string(),
                email: user.email.clone(),
            };
            let newly_joined =
                state
                    .room
                    .join(user.id.clone(), session_id, socket_id, profile);
            let member = state
                .room
                .member(&user.id)
                .expect("member exists immediately after join");

            return Ok(JoinOutcome {
                newly_joined,
                member,
                info: state.room.info(),
                members: state.room.members(),
                history: state.history.iter().cloned().collect(),
            });
        }
    }

    /// Removes a user from a room entirely. The second call for the same
    /// user reports `NotMember` without side effects.
    pub async fn leave(&self, room_id: &RoomId, user_id: &UserId) -> Result<LeaveOutcome, RoomError> {
        let handle = self.handle(room_id).await.ok_or(RoomError::NotFound)?;
        let outcome = {
            let mut state = handle.lock().await;
            if state.retired {
                return Err(RoomError::NotFound);
            }
            if state.room.leave(user_id).is_none() {
                return Err(RoomError::NotMember);
            }
            LeaveOutcome {
                remaining_users: state.room.member_count(),
                released_locks: state.room.release_locks_held_by(user_id),
            }
        };
        self.maybe_collect(room_id).await;
        Ok(outcome)
    }

    /// Detaches one socket from every room, reporting the rooms the user
    /// fully left. Invoked by the disconnect cascade.
    pub async fn detach_socket_everywhere(
        &self,
        user_id: &UserId,
        socket_id: &SocketId,
    ) -> Vec<RoomDeparture> {
        let handles: Vec<(RoomId, RoomHandle)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
                .collect()
        };

        let mut departures = Vec::new();
        let mut collectable = Vec::new();
        for (room_id, handle) in handles {
            let mut state = handle.lock().await;
            if state.retired {
                continue;
            }
            if state.room.detach_socket(user_id, socket_id) == DetachOutcome::Left {
                departures.push(RoomDeparture {
                    room_id: room_id.clone(),
                    remaining_users: state.room.member_count(),
                    released_locks: state.room.release_locks_held_by(user_id),
                });
                if state.room.is_collectable() {
                    collectable.push(room_id);
                }
            }
        }

        for room_id in collectable {
            self.maybe_collect(&room_id).await;
        }
        departures
    }

    /// Permission check; false for unknown rooms.
    pub async fn has_permission(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        permission: Permission,
    ) -> bool {
        match self.handle(room_id).await {
            Some(handle) => {
                let state = handle.lock().await;
                !state.retired && state.room.has_permission(user_id, permission)
            }
            None => false,
        }
    }

    /// Membership check; false for unknown rooms.
    pub async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        match self.handle(room_id).await {
            Some(handle) => {
                let state = handle.lock().await;
                !state.retired && state.room.is_member(user_id)
            }
            None => false,
        }
    }

    /// Grants explicit permissions (admin surface).
    pub async fn grant(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        grants: impl IntoIterator<Item = Permission>,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id).await.ok_or(RoomError::NotFound)?;
        let mut state = handle.lock().await;
        if state.retired {
            return Err(RoomError::NotFound);
        }
        state.room.grant(user_id, grants);
        Ok(())
    }

    /// Appends a message to the room's bounded history.
    pub async fn push_message(&self, room_id: &RoomId, message: ChatMessage) -> Result<(), RoomError> {
        let handle = self.handle(room_id).await.ok_or(RoomError::NotFound)?;
        let mut state = handle.lock().await;
        if state.retired {
            return Err(RoomError::NotFound);
        }
        state.history.push_back(message);
        while state.history.len() > self.history_capacity {
            state.history.pop_front();
        }
        Ok(())
    }

    /// Message history for a room, oldest first.
    pub async fn history(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        match self.handle(room_id).await {
            Some(handle) => {
                let state = handle.lock().await;
                state.history.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Current members of a room.
    pub async fn members(&self, room_id: &RoomId) -> Vec<RoomMember> {
        match self.handle(room_id).await {
            Some(handle) => handle.lock().await.room.members(),
            None => Vec::new(),
        }
    }

    /// Member ids of a room.
    pub async fn member_ids(&self, room_id: &RoomId) -> Vec<UserId> {
        match self.handle(room_id).await {
            Some(handle) => handle.lock().await.room.member_ids(),
            None => Vec::new(),
        }
    }

    /// Users holding any permission in the room (offline-queue targets).
    pub async fn permission_holders(&self, room_id: &RoomId) -> Vec<UserId> {
        match self.handle(room_id).await {
            Some(handle) => handle.lock().await.room.permission_holders(),
            None => Vec::new(),
        }
    }

    /// Attempts to acquire a resource lock.
    pub async fn lock_resource(
        &self,
        room_id: &RoomId,
        resource_type: &str,
        resource_id: &str,
        user_id: &UserId,
        user_name: &str,
    ) -> Result<LockOutcome, RoomError> {
        let handle = self.handle(room_id).await.ok_or(RoomError::NotFound)?;
        let mut state = handle.lock().await;
        if state.retired {
            return Err(RoomError::NotFound);
        }
        Ok(state
            .room
            .lock_resource(resource_type, resource_id, user_id, user_name))
    }

    /// Attempts to release a resource lock.
    pub async fn unlock_resource(
        &self,
        room_id: &RoomId,
        resource_type: &str,
        resource_id: &str,
        user_id: &UserId,
    ) -> Result<UnlockOutcome, RoomError> {
        let handle = self.handle(room_id).await.ok_or(RoomError::NotFound)?;
        let mut state = handle.lock().await;
        if state.retired {
            return Err(RoomError::NotFound);
        }
        Ok(state.room.unlock_resource(resource_type, resource_id, user_id))
    }

    /// Rooms visible to a user: anywhere they hold permissions, plus
    /// open chat rooms.
    pub async fn rooms_for_user(&self, user_id: &UserId) -> Vec<RoomInfo> {
        let handles: Vec<RoomHandle> = {
            let rooms = self.rooms.read().await;
            rooms.values().map(Arc::clone).collect()
        };

        let mut visible = Vec::new();
        for handle in handles {
            let state = handle.lock().await;
            if state.retired {
                continue;
            }
            if state.room.holds_permissions(user_id) || state.room.room_type == RoomType::Chat {
                visible.push(state.room.info());
            }
        }
        visible
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Per-room statistics.
    pub async fn stats(&self) -> Vec<RoomStats> {
        let handles: Vec<RoomHandle> = {
            let rooms = self.rooms.read().await;
            rooms.values().map(Arc::clone).collect()
        };

        let mut stats = Vec::new();
        for handle in handles {
            let state = handle.lock().await;
            if state.retired {
                continue;
            }
            stats.push(RoomStats {
                room_id: state.room.id.clone(),
                room_type: state.room.room_type,
                user_count: state.room.member_count(),
                message_count: state.history.len(),
            });
        }
        stats
    }

    async fn handle(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).map(Arc::clone)
    }

    /// Creates an auto-creatable room if the id matches a known class.
    async fn auto_create(
        &self,
        room_id: &RoomId,
        room_name: Option<&str>,
        created_by: &UserId,
    ) -> Result<RoomHandle, RoomError> {
        let (room_type, default_name) = if room_id.is_chat() {
            (RoomType::Chat, format!("Chat {}", room_id))
        } else if room_id.is_planning() {
            (RoomType::Planning, format!("Planning Session {}", room_id))
        } else {
            return Err(RoomError::NotFound);
        };
        let name = room_name.map(str::to_string).unwrap_or(default_name);

        let mut rooms = self.rooms.write().await;
        // Double-check under the write lock; another task may have won.
        if let Some(existing) = rooms.get(room_id) {
            return Ok(Arc::clone(existing));
        }
        let room = Room::new(
            room_id.clone(),
            name,
            room_type,
            created_by.clone(),
            None,
        );
        let handle = Arc::new(Mutex::new(RoomState {
            room,
            history: VecDeque::new(),
            retired: false,
        }));
        rooms.insert(room_id.clone(), Arc::clone(&handle));
        tracing::info!(room_id = %room_id, ?room_type, "Room auto-created");
        Ok(handle)
    }

    /// Removes the room if nothing keeps it alive.
    async fn maybe_collect(&self, room_id: &RoomId) {
        let mut rooms = self.rooms.write().await;
        let Some(handle) = rooms.get(room_id).map(Arc::clone) else {
            return;
        };
        let mut state = handle.lock().await;
        if state.room.is_collectable() {
            state.retired = true;
            rooms.remove(room_id);
            tracing::debug!(room_id = %room_id, "Empty room collected");
        }
    }
}
