//! Live transport session state.

use serde::Serialize;

use crate::domain::foundation::{SessionId, SocketId, Timestamp, UserId};

/// Transport-level metadata captured at connect time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    /// Remote peer address, if known.
    pub ip_address: Option<String>,
    /// Client user agent, if supplied.
    pub user_agent: Option<String>,
}

/// One live transport session belonging to one user.
///
/// A user may own several connections at once (multiple tabs/devices);
/// each connection is destroyed when its transport closes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub socket_id: SocketId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub connected_at: Timestamp,
    pub last_activity: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Connection {
    /// Creates a connection record for a freshly accepted transport.
    pub fn new(socket_id: SocketId, user_id: UserId, session_id: SessionId, meta: ConnectionMeta) -> Self {
        let now = Timestamp::now();
        Self {
            socket_id,
            user_id,
            session_id,
            connected_at: now,
            last_activity: now,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        }
    }

    /// Records activity on this connection.
    pub fn touch(&mut self) {
        self.last_activity = Timestamp::now();
    }

    /// True if the connection has seen no activity since `cutoff`.
    pub fn is_idle_since(&self, cutoff: &Timestamp) -> bool {
        self.last_activity.is_before(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection() -> Connection {
        Connection::new(
            SocketId::new(),
            UserId::new("teacher-1").unwrap(),
            SessionId::new("week-1"),
            ConnectionMeta::default(),
        )
    }

    #[test]
    fn new_connection_is_not_idle() {
        let conn = test_connection();
        let cutoff = Timestamp::now().minus_secs(1800);
        assert!(!conn.is_idle_since(&cutoff));
    }

    #[test]
    fn stale_connection_is_idle() {
        let mut conn = test_connection();
        conn.last_activity = Timestamp::now().minus_secs(3600);
        let cutoff = Timestamp::now().minus_secs(1800);
        assert!(conn.is_idle_since(&cutoff));
    }

    #[test]
    fn touch_refreshes_activity() {
        let mut conn = test_connection();
        conn.last_activity = Timestamp::now().minus_secs(3600);
        conn.touch();
        let cutoff = Timestamp::now().minus_secs(1800);
        assert!(!conn.is_idle_since(&cutoff));
    }
}
