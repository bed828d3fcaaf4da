//! Background sweep of idle connections.
//!
//! Started once at process initialization, independent of any particular
//! connection. Each tick disconnects every connection whose last
//! activity is older than the configured idle timeout, cascading the
//! normal disconnect cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::core::MessagingCore;

/// Spawns the periodic idle sweep. The returned handle can be aborted on
/// shutdown; the task otherwise runs for the life of the process.
pub fn spawn_idle_sweeper(core: Arc<MessagingCore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = core.sweep_idle().await;
            if swept > 0 {
                tracing::debug!(swept, "Idle sweep pass complete");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockAuthProvider;
    use crate::config::RealtimeConfig;
    use crate::domain::foundation::{AuthenticatedUser, UserId};
    use crate::ports::{AuthCredentials, NoopEventSink};

    fn test_core() -> Arc<MessagingCore> {
        let auth = MockAuthProvider::new().with_user(
            "tok-alice",
            AuthenticatedUser::new(UserId::new("alice").unwrap(), None, None),
        );
        Arc::new(MessagingCore::new(
            RealtimeConfig::default(),
            Arc::new(auth),
            Arc::new(NoopEventSink),
        ))
    }

    #[tokio::test]
    async fn sweeper_task_runs_and_can_be_aborted() {
        let core = test_core();
        let handle = spawn_idle_sweeper(Arc::clone(&core), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn idle_connections_are_swept() {
        let core = test_core();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let connection = core
            .connect(
                AuthCredentials {
                    token: Some("tok-alice".to_string()),
                    session_id: None,
                },
                None,
                Default::default(),
                tx,
            )
            .await
            .unwrap();
        assert_eq!(core.connections().connection_count().await, 1);

        core.connections()
            .backdate_activity(&connection.socket_id, 60 * 60)
            .await;
        assert_eq!(core.sweep_idle().await, 1);
        assert_eq!(core.connections().connection_count().await, 0);

        // The outbound channel closes with the connection entry.
        rx.recv().await; // connection_established
        assert!(rx.recv().await.is_none());
    }
}
