//! Live connection tracking.
//!
//! Owns every transport session and its outbound channel. One user may
//! hold several connections (multi-device); the registry answers the
//! "is this user online" question for offline queueing and fans sender
//! handles out to the broadcaster.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};

use crate::domain::foundation::{AuthenticatedUser, SessionId, SocketId, Timestamp, UserId};
use crate::domain::realtime::{Connection, ConnectionMeta};

use super::events::EventEnvelope;

/// Handle for pushing frames to one connection's transport.
pub type OutboundSender = mpsc::UnboundedSender<EventEnvelope>;

struct ConnectionEntry {
    info: Connection,
    user: AuthenticatedUser,
    sender: OutboundSender,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<SocketId, ConnectionEntry>,
    user_sockets: HashMap<UserId, HashSet<SocketId>>,
}

/// Registry of live transport sessions.
///
/// A single lock guards both maps so the socket table and the per-user
/// index can never disagree.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registers a new connection and its outbound channel.
    pub async fn add(
        &self,
        socket_id: SocketId,
        user: AuthenticatedUser,
        session_id: SessionId,
        meta: ConnectionMeta,
        sender: OutboundSender,
    ) -> Connection {
        let info = Connection::new(socket_id, user.id.clone(), session_id, meta);
        let mut state = self.state.write().await;
        state
            .user_sockets
            .entry(user.id.clone())
            .or_default()
            .insert(socket_id);
        state.connections.insert(
            socket_id,
            ConnectionEntry {
                info: info.clone(),
                user,
                sender,
            },
        );
        tracing::info!(user_id = %info.user_id, socket_id = %socket_id, "Connection added");
        info
    }

    /// Removes a connection. Idempotent: removing an unknown socket is a
    /// no-op returning `None`.
    pub async fn remove(&self, socket_id: &SocketId) -> Option<Connection> {
        let mut state = self.state.write().await;
        let entry = state.connections.remove(socket_id)?;
        if let Some(sockets) = state.user_sockets.get_mut(&entry.info.user_id) {
            sockets.remove(socket_id);
            if sockets.is_empty() {
                state.user_sockets.remove(&entry.info.user_id);
            }
        }
        tracing::info!(
            user_id = %entry.info.user_id,
            socket_id = %socket_id,
            "Connection removed"
        );
        Some(entry.info)
    }

    /// Snapshot of one connection.
    pub async fn get(&self, socket_id: &SocketId) -> Option<Connection> {
        self.state
            .read()
            .await
            .connections
            .get(socket_id)
            .map(|entry| entry.info.clone())
    }

    /// Profile of the user behind one connection.
    pub async fn profile(&self, socket_id: &SocketId) -> Option<AuthenticatedUser> {
        self.state
            .read()
            .await
            .connections
            .get(socket_id)
            .map(|entry| entry.user.clone())
    }

    /// True if the user has at least one live connection.
    pub async fn is_user_online(&self, user_id: &UserId) -> bool {
        self.state
            .read()
            .await
            .user_sockets
            .get(user_id)
            .map(|sockets| !sockets.is_empty())
            .unwrap_or(false)
    }

    /// Refreshes the activity timestamp for a connection.
    pub async fn update_activity(&self, socket_id: &SocketId) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(socket_id) {
            entry.info.touch();
        }
    }

    /// Outbound handle for one connection.
    pub async fn sender_for(&self, socket_id: &SocketId) -> Option<OutboundSender> {
        self.state
            .read()
            .await
            .connections
            .get(socket_id)
            .map(|entry| entry.sender.clone())
    }

    /// Outbound handles for every connection a user holds.
    pub async fn senders_for_user(&self, user_id: &UserId) -> Vec<(SocketId, OutboundSender)> {
        let state = self.state.read().await;
        let Some(sockets) = state.user_sockets.get(user_id) else {
            return Vec::new();
        };
        sockets
            .iter()
            .filter_map(|socket_id| {
                state
                    .connections
                    .get(socket_id)
                    .map(|entry| (*socket_id, entry.sender.clone()))
            })
            .collect()
    }

    /// Sockets with no activity since `cutoff`.
    pub async fn idle_sockets(&self, cutoff: &Timestamp) -> Vec<SocketId> {
        self.state
            .read()
            .await
            .connections
            .values()
            .filter(|entry| entry.info.is_idle_since(cutoff))
            .map(|entry| entry.info.socket_id)
            .collect()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of distinct online users.
    pub async fn user_count(&self) -> usize {
        self.state.read().await.user_sockets.len()
    }

    /// Test hook: rewinds a connection's activity clock.
    #[cfg(test)]
    pub(crate) async fn backdate_activity(&self, socket_id: &SocketId, secs: u64) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(socket_id) {
            entry.info.last_activity = entry.info.last_activity.minus_secs(secs);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new(id).unwrap(), Some(id.to_string()), None)
    }

    async fn add_connection(registry: &ConnectionRegistry, user: &str) -> SocketId {
        let (tx, _rx) = mpsc::unbounded_channel();
        let socket_id = SocketId::new();
        registry
            .add(
                socket_id,
                test_user(user),
                SessionId::default(),
                ConnectionMeta::default(),
                tx,
            )
            .await;
        socket_id
    }

    #[tokio::test]
    async fn user_is_online_while_any_socket_lives() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice").unwrap();

        let tab1 = add_connection(&registry, "alice").await;
        let tab2 = add_connection(&registry, "alice").await;
        assert!(registry.is_user_online(&alice).await);
        assert_eq!(registry.connection_count().await, 2);
        assert_eq!(registry.user_count().await, 1);

        registry.remove(&tab1).await;
        assert!(registry.is_user_online(&alice).await);

        registry.remove(&tab2).await;
        assert!(!registry.is_user_online(&alice).await);
        assert_eq!(registry.user_count().await, 0);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let socket = add_connection(&registry, "alice").await;

        assert!(registry.remove(&socket).await.is_some());
        assert!(registry.remove(&socket).await.is_none());
        assert!(registry.remove(&SocketId::new()).await.is_none());
    }

    #[tokio::test]
    async fn senders_for_user_returns_every_socket() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice").unwrap();

        add_connection(&registry, "alice").await;
        add_connection(&registry, "alice").await;
        add_connection(&registry, "bob").await;

        assert_eq!(registry.senders_for_user(&alice).await.len(), 2);
    }

    #[tokio::test]
    async fn idle_sockets_respect_cutoff() {
        let registry = ConnectionRegistry::new();
        let fresh = add_connection(&registry, "alice").await;
        let stale = add_connection(&registry, "bob").await;
        registry.backdate_activity(&stale, 3600).await;

        let cutoff = Timestamp::now().minus_secs(1800);
        let idle = registry.idle_sockets(&cutoff).await;
        assert_eq!(idle, vec![stale]);
        assert!(!idle.contains(&fresh));
    }

    #[tokio::test]
    async fn update_activity_keeps_socket_fresh() {
        let registry = ConnectionRegistry::new();
        let socket = add_connection(&registry, "alice").await;
        registry.backdate_activity(&socket, 3600).await;
        registry.update_activity(&socket).await;

        let cutoff = Timestamp::now().minus_secs(1800);
        assert!(registry.idle_sockets(&cutoff).await.is_empty());
    }
}
