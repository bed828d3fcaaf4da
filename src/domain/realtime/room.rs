//! Room membership, permissions, and resource locks.
//!
//! `Room` is pure state plus invariant-preserving mutations; all locking
//! and cross-room coordination lives in the realtime registries.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{RoomId, SessionId, SocketId, Timestamp, UserId};

/// Types of collaboration rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Chat,
    Planning,
    ContentGeneration,
    Private,
}

/// Per-user permission inside a room. `Admin` implies all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    Read,
    Write,
    Invite,
}

/// Presence status of a room member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Typing,
    Away,
}

/// Profile fields supplied by the caller at join time.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub name: String,
    pub email: Option<String>,
}

/// A per-room projection of a connection plus profile fields.
///
/// One record per user; the record tracks every socket the user has
/// joined this room with so that closing one tab does not look like
/// leaving.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Most recent socket this user joined with.
    pub socket_id: SocketId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: UserStatus,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
    #[serde(skip)]
    sockets: HashSet<SocketId>,
}

impl RoomMember {
    /// Number of sockets this member currently has in the room.
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }
}

/// Mutual-exclusion token over a collaborative-editing target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLock {
    pub resource_type: String,
    pub resource_id: String,
    pub user_id: UserId,
    pub user_name: String,
    pub locked_at: Timestamp,
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone)]
pub enum LockOutcome {
    /// Lock acquired (or idempotently re-acquired by the holder).
    Acquired(ResourceLock),
    /// Lock is held by another user.
    Held(ResourceLock),
}

/// Result of a lock release attempt.
#[derive(Debug, Clone)]
pub enum UnlockOutcome {
    Released,
    NotLocked,
    /// Caller is neither the holder nor an admin.
    Denied { holder: UserId },
}

/// Outcome of detaching one socket from a room membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// The user was not a member of this room.
    NotMember,
    /// Other sockets for the same user remain; membership is unchanged.
    StillPresent,
    /// That was the user's last socket; the user has left the room.
    Left,
}

/// Wire-facing snapshot of room state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub room_type: RoomType,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub user_count: usize,
    pub settings: serde_json::Value,
}

/// A named channel grouping connections that receive each other's
/// broadcasts.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub room_type: RoomType,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub settings: serde_json::Value,
    members: HashMap<UserId, RoomMember>,
    permissions: HashMap<UserId, HashSet<Permission>>,
    locks: HashMap<(String, String), ResourceLock>,
}

impl Room {
    /// Creates a room. The creator receives admin, read, write, and
    /// invite permissions.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        room_type: RoomType,
        created_by: UserId,
        settings: Option<serde_json::Value>,
    ) -> Self {
        let mut permissions = HashMap::new();
        permissions.insert(
            created_by.clone(),
            HashSet::from([
                Permission::Admin,
                Permission::Read,
                Permission::Write,
                Permission::Invite,
            ]),
        );

        Self {
            id,
            name: name.into(),
            room_type,
            created_by,
            created_at: Timestamp::now(),
            settings: settings.unwrap_or_else(|| serde_json::json!({})),
            members: HashMap::new(),
            permissions,
            locks: HashMap::new(),
        }
    }

    /// Default permissions granted to a joining user with no explicit
    /// grants. Open chat rooms are writable by anyone who joins; all
    /// other room types start read-only.
    fn default_grants(&self) -> HashSet<Permission> {
        match self.room_type {
            RoomType::Chat => HashSet::from([Permission::Read, Permission::Write]),
            _ => HashSet::from([Permission::Read]),
        }
    }

    /// True if the user holds any permission in this room.
    pub fn holds_permissions(&self, user_id: &UserId) -> bool {
        self.permissions
            .get(user_id)
            .map(|perms| !perms.is_empty())
            .unwrap_or(false)
    }

    /// Adds a socket-scoped membership for `user_id`.
    ///
    /// Grants default access if the user holds no permissions yet.
    /// Returns true when this is the user's first socket in the room
    /// (the caller should broadcast `user_joined` only then).
    pub fn join(
        &mut self,
        user_id: UserId,
        session_id: SessionId,
        socket_id: SocketId,
        profile: MemberProfile,
    ) -> bool {
        let defaults = self.default_grants();
        self.permissions
            .entry(user_id.clone())
            .or_insert(defaults);

        let now = Timestamp::now();
        let newly_joined = !self.members.contains_key(&user_id);
        let member = self
            .members
            .entry(user_id.clone())
            .or_insert_with(|| RoomMember {
                user_id,
                session_id: session_id.clone(),
                socket_id,
                name: profile.name.clone(),
                email: profile.email.clone(),
                status: UserStatus::Online,
                connected_at: now,
                last_seen: now,
                sockets: HashSet::new(),
            });

        member.sockets.insert(socket_id);
        member.socket_id = socket_id;
        member.session_id = session_id;
        member.name = profile.name;
        member.email = profile.email;
        member.status = UserStatus::Online;
        member.last_seen = now;

        newly_joined
    }

    /// Removes the user's membership entirely, regardless of socket count.
    ///
    /// Returns the removed member, or `None` if the user was not a member.
    pub fn leave(&mut self, user_id: &UserId) -> Option<RoomMember> {
        self.members.remove(user_id)
    }

    /// Removes one socket from the user's membership.
    pub fn detach_socket(&mut self, user_id: &UserId, socket_id: &SocketId) -> DetachOutcome {
        let Some(member) = self.members.get_mut(user_id) else {
            return DetachOutcome::NotMember;
        };
        if !member.sockets.remove(socket_id) {
            return DetachOutcome::NotMember;
        }
        if member.sockets.is_empty() {
            self.members.remove(user_id);
            DetachOutcome::Left
        } else {
            member.last_seen = Timestamp::now();
            DetachOutcome::StillPresent
        }
    }

    /// True if the user currently has at least one socket in the room.
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }

    /// Checks a permission; `admin` implies everything.
    pub fn has_permission(&self, user_id: &UserId, permission: Permission) -> bool {
        self.permissions
            .get(user_id)
            .map(|perms| perms.contains(&permission) || perms.contains(&Permission::Admin))
            .unwrap_or(false)
    }

    /// Grants additional permissions to a user.
    pub fn grant(&mut self, user_id: UserId, grants: impl IntoIterator<Item = Permission>) {
        self.permissions.entry(user_id).or_default().extend(grants);
    }

    /// Users that hold any permission in this room (the broadcast target
    /// set for offline queueing).
    pub fn permission_holders(&self) -> Vec<UserId> {
        self.permissions.keys().cloned().collect()
    }

    /// Attempts to acquire a resource lock, first come first served.
    ///
    /// Re-acquisition by the current holder refreshes the lock.
    pub fn lock_resource(
        &mut self,
        resource_type: &str,
        resource_id: &str,
        user_id: &UserId,
        user_name: &str,
    ) -> LockOutcome {
        let key = (resource_type.to_string(), resource_id.to_string());
        if let Some(existing) = self.locks.get(&key) {
            if existing.user_id != *user_id {
                return LockOutcome::Held(existing.clone());
            }
        }
        let lock = ResourceLock {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            user_id: user_id.clone(),
            user_name: user_name.to_string(),
            locked_at: Timestamp::now(),
        };
        self.locks.insert(key, lock.clone());
        LockOutcome::Acquired(lock)
    }

    /// Releases a resource lock.
    ///
    /// Only the holder may release, unless the caller holds `admin`.
    pub fn unlock_resource(
        &mut self,
        resource_type: &str,
        resource_id: &str,
        user_id: &UserId,
    ) -> UnlockOutcome {
        let key = (resource_type.to_string(), resource_id.to_string());
        let Some(existing) = self.locks.get(&key) else {
            return UnlockOutcome::NotLocked;
        };
        if existing.user_id != *user_id && !self.has_permission(user_id, Permission::Admin) {
            return UnlockOutcome::Denied {
                holder: existing.user_id.clone(),
            };
        }
        self.locks.remove(&key);
        UnlockOutcome::Released
    }

    /// Releases every lock held by the user (leave/disconnect cleanup).
    ///
    /// Returns the released locks so the caller can broadcast them.
    pub fn release_locks_held_by(&mut self, user_id: &UserId) -> Vec<ResourceLock> {
        let keys: Vec<_> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.user_id == *user_id)
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter()
            .filter_map(|key| self.locks.remove(key))
            .collect()
    }

    /// Number of active members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Snapshot of current members.
    pub fn members(&self) -> Vec<RoomMember> {
        self.members.values().cloned().collect()
    }

    /// Snapshot of one member.
    pub fn member(&self, user_id: &UserId) -> Option<RoomMember> {
        self.members.get(user_id).cloned()
    }

    /// User ids of current members.
    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.keys().cloned().collect()
    }

    /// True when nothing keeps the room alive (lazy GC candidate).
    pub fn is_collectable(&self) -> bool {
        self.members.is_empty() && self.locks.is_empty()
    }

    /// Wire-facing snapshot.
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            room_type: self.room_type,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            user_count: self.members.len(),
            settings: self.settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn profile(name: &str) -> MemberProfile {
        MemberProfile {
            name: name.to_string(),
            email: None,
        }
    }

    fn chat_room(creator: &str) -> Room {
        Room::new(
            RoomId::new("chat_1").unwrap(),
            "Chat 1",
            RoomType::Chat,
            user(creator),
            None,
        )
    }

    #[test]
    fn creator_receives_full_permissions() {
        let room = chat_room("alice");
        let alice = user("alice");
        assert!(room.has_permission(&alice, Permission::Admin));
        assert!(room.has_permission(&alice, Permission::Read));
        assert!(room.has_permission(&alice, Permission::Write));
        assert!(room.has_permission(&alice, Permission::Invite));
    }

    #[test]
    fn admin_implies_all_permissions() {
        let mut room = chat_room("alice");
        room.grant(user("bob"), [Permission::Admin]);
        assert!(room.has_permission(&user("bob"), Permission::Write));
        assert!(room.has_permission(&user("bob"), Permission::Invite));
    }

    #[test]
    fn chat_join_grants_read_and_write() {
        let mut room = chat_room("alice");
        let newly = room.join(user("bob"), SessionId::default(), SocketId::new(), profile("Bob"));
        assert!(newly);
        assert!(room.has_permission(&user("bob"), Permission::Read));
        assert!(room.has_permission(&user("bob"), Permission::Write));
        assert!(!room.has_permission(&user("bob"), Permission::Admin));
    }

    #[test]
    fn planning_join_grants_read_only() {
        let mut room = Room::new(
            RoomId::new("planning_1").unwrap(),
            "Planning 1",
            RoomType::Planning,
            user("alice"),
            None,
        );
        room.join(user("bob"), SessionId::default(), SocketId::new(), profile("Bob"));
        assert!(room.has_permission(&user("bob"), Permission::Read));
        assert!(!room.has_permission(&user("bob"), Permission::Write));
    }

    #[test]
    fn second_socket_join_is_not_newly_joined() {
        let mut room = chat_room("alice");
        assert!(room.join(user("bob"), SessionId::default(), SocketId::new(), profile("Bob")));
        assert!(!room.join(user("bob"), SessionId::default(), SocketId::new(), profile("Bob")));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn detach_last_socket_leaves_room() {
        let mut room = chat_room("alice");
        let bob = user("bob");
        let tab1 = SocketId::new();
        let tab2 = SocketId::new();
        room.join(bob.clone(), SessionId::default(), tab1, profile("Bob"));
        room.join(bob.clone(), SessionId::default(), tab2, profile("Bob"));

        assert_eq!(room.detach_socket(&bob, &tab1), DetachOutcome::StillPresent);
        assert!(room.is_member(&bob));
        assert_eq!(room.detach_socket(&bob, &tab2), DetachOutcome::Left);
        assert!(!room.is_member(&bob));
    }

    #[test]
    fn detach_unknown_socket_is_noop() {
        let mut room = chat_room("alice");
        assert_eq!(
            room.detach_socket(&user("bob"), &SocketId::new()),
            DetachOutcome::NotMember
        );
    }

    #[test]
    fn leave_is_idempotent() {
        let mut room = chat_room("alice");
        let bob = user("bob");
        room.join(bob.clone(), SessionId::default(), SocketId::new(), profile("Bob"));
        assert!(room.leave(&bob).is_some());
        assert!(room.leave(&bob).is_none());
    }

    #[test]
    fn lock_is_first_come_first_served() {
        let mut room = chat_room("alice");
        let first = room.lock_resource("activity", "42", &user("alice"), "Alice");
        assert!(matches!(first, LockOutcome::Acquired(_)));

        let second = room.lock_resource("activity", "42", &user("bob"), "Bob");
        match second {
            LockOutcome::Held(lock) => assert_eq!(lock.user_id, user("alice")),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[test]
    fn lock_reacquire_by_holder_is_idempotent() {
        let mut room = chat_room("alice");
        room.lock_resource("activity", "42", &user("alice"), "Alice");
        let again = room.lock_resource("activity", "42", &user("alice"), "Alice");
        assert!(matches!(again, LockOutcome::Acquired(_)));
    }

    #[test]
    fn unlock_by_non_holder_is_denied() {
        let mut room = chat_room("alice");
        room.grant(user("bob"), [Permission::Read, Permission::Write]);
        room.lock_resource("activity", "42", &user("bob"), "Bob");

        let outcome = room.unlock_resource("activity", "42", &user("carol"));
        match outcome {
            UnlockOutcome::Denied { holder } => assert_eq!(holder, user("bob")),
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[test]
    fn admin_can_unlock_any_resource() {
        let mut room = chat_room("alice");
        room.lock_resource("activity", "42", &user("bob"), "Bob");
        let outcome = room.unlock_resource("activity", "42", &user("alice"));
        assert!(matches!(outcome, UnlockOutcome::Released));
    }

    #[test]
    fn unlock_missing_lock_reports_not_locked() {
        let mut room = chat_room("alice");
        let outcome = room.unlock_resource("activity", "42", &user("alice"));
        assert!(matches!(outcome, UnlockOutcome::NotLocked));
    }

    #[test]
    fn release_locks_held_by_returns_released_locks() {
        let mut room = chat_room("alice");
        room.lock_resource("activity", "1", &user("bob"), "Bob");
        room.lock_resource("activity", "2", &user("bob"), "Bob");
        room.lock_resource("lesson", "3", &user("alice"), "Alice");

        let released = room.release_locks_held_by(&user("bob"));
        assert_eq!(released.len(), 2);
        assert!(matches!(
            room.unlock_resource("lesson", "3", &user("alice")),
            UnlockOutcome::Released
        ));
    }

    #[test]
    fn room_with_lock_is_not_collectable() {
        let mut room = chat_room("alice");
        assert!(room.is_collectable());
        room.lock_resource("activity", "42", &user("alice"), "Alice");
        assert!(!room.is_collectable());
    }

    #[test]
    fn info_reports_member_count() {
        let mut room = chat_room("alice");
        room.join(user("bob"), SessionId::default(), SocketId::new(), profile("Bob"));
        let info = room.info();
        assert_eq!(info.user_count, 1);
        assert_eq!(info.room_type, RoomType::Chat);
    }

    mod membership_invariant {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        fn socket_for(n: u8) -> SocketId {
            SocketId::from_uuid(uuid::Uuid::from_u128(n as u128 + 1))
        }

        proptest! {
            /// For any sequence of join/detach operations, a user is a
            /// member iff at least one of its sockets has joined and not
            /// yet detached.
            #[test]
            fn membership_equals_live_socket_set(
                ops in proptest::collection::vec((0u8..4, 0u8..4, proptest::bool::ANY), 0..64)
            ) {
                let mut room = chat_room("creator");
                let mut model: HashMap<u8, HashSet<u8>> = HashMap::new();

                for (user_n, socket_n, is_join) in ops {
                    let uid = user(&format!("user-{}", user_n));
                    if is_join {
                        room.join(uid, SessionId::default(), socket_for(socket_n), profile("U"));
                        model.entry(user_n).or_default().insert(socket_n);
                    } else {
                        room.detach_socket(&uid, &socket_for(socket_n));
                        if let Some(sockets) = model.get_mut(&user_n) {
                            sockets.remove(&socket_n);
                        }
                    }
                }

                for user_n in 0u8..4 {
                    let uid = user(&format!("user-{}", user_n));
                    let expected = model.get(&user_n).map(|s| !s.is_empty()).unwrap_or(false);
                    prop_assert_eq!(room.is_member(&uid), expected);
                }
            }
        }
    }
}
