//! Authentication types for the domain layer.
//!
//! These types represent an authenticated user extracted from the
//! WebSocket handshake. They have **no provider dependencies** - any
//! auth backend can populate them via the `AuthProvider` port.

use thiserror::Error;

use super::UserId;

/// Authenticated user extracted from validated credentials.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The unique user identifier from the auth provider.
    pub id: UserId,

    /// Display name if available.
    pub display_name: Option<String>,

    /// Email address if the token carried one.
    pub email: Option<String>,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user.
    pub fn new(id: UserId, display_name: Option<String>, email: Option<String>) -> Self {
        Self {
            id,
            display_name,
            email,
        }
    }

    /// Returns the display name, falling back to the user id.
    pub fn display_name_or_id(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Authentication errors that can occur during handshake validation.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired (separate from InvalidToken for specific handling).
    #[error("Token expired")]
    TokenExpired,

    /// No credentials were supplied at all.
    #[error("No authentication token provided")]
    MissingCredentials,

    /// The authentication service is unavailable (network, config, etc.).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_id() {
        let user = AuthenticatedUser::new(UserId::new("teacher-9").unwrap(), None, None);
        assert_eq!(user.display_name_or_id(), "teacher-9");

        let named = AuthenticatedUser::new(
            UserId::new("teacher-9").unwrap(),
            Some("Alice".to_string()),
            None,
        );
        assert_eq!(named.display_name_or_id(), "Alice");
    }
}
