//! AuthProvider port - authentication for the realtime handshake.
//!
//! The realtime core never issues or verifies tokens itself; it delegates
//! the pass/fail contract to this port. Adapters exist for HS256 JWTs and
//! for tests.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Credentials presented by a client in its `connect` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    /// Bearer token; a `Bearer ` prefix is tolerated.
    pub token: Option<String>,
    /// Planning session this connection belongs to, if any.
    pub session_id: Option<String>,
}

impl AuthCredentials {
    /// Returns the token with any `Bearer ` prefix stripped.
    pub fn bare_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t))
    }
}

/// Port for authenticating realtime connections.
///
/// # Contract
///
/// Implementations must:
/// - Return the authenticated user on valid credentials
/// - Return `AuthError::MissingCredentials` when no token is present
/// - Return `AuthError::InvalidToken`/`TokenExpired` on bad tokens
/// - Decide origin admission without I/O (called before authentication)
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Validate credentials and resolve the connecting user.
    async fn authenticate(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<AuthenticatedUser, AuthError>;

    /// Whether connections from `origin` are admitted.
    ///
    /// `None` means the client sent no Origin header (non-browser client).
    fn origin_allowed(&self, origin: Option<&str>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_stripped() {
        let creds = AuthCredentials {
            token: Some("Bearer abc.def.ghi".to_string()),
            session_id: None,
        };
        assert_eq!(creds.bare_token(), Some("abc.def.ghi"));
    }

    #[test]
    fn bare_token_passes_through() {
        let creds = AuthCredentials {
            token: Some("abc.def.ghi".to_string()),
            session_id: None,
        };
        assert_eq!(creds.bare_token(), Some("abc.def.ghi"));
    }

    #[test]
    fn credentials_deserialize_from_camel_case() {
        let json = r#"{"token": "t", "sessionId": "week-3"}"#;
        let creds: AuthCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.session_id.as_deref(), Some("week-3"));
    }

    #[test]
    fn auth_provider_trait_is_object_safe_and_send_sync() {
        fn _assert_arc_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_arc_send_sync::<std::sync::Arc<dyn AuthProvider>>();
    }
}
