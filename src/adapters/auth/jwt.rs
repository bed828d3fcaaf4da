//! HS256 JWT authentication adapter.
//!
//! Validates the bearer token presented in the `connect` handshake and
//! maps its claims onto the domain `AuthenticatedUser`. Origin admission
//! is a plain allow-list; clients without an Origin header (native apps,
//! tests) are admitted.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::{AuthCredentials, AuthProvider};

/// Claims the realtime service reads from a client token.
#[derive(Debug, Deserialize)]
struct Claims {
    /// User id.
    sub: String,
    /// Display name, if the issuer includes one.
    name: Option<String>,
    /// Email, if the issuer includes one.
    email: Option<String>,
    /// Expiry, validated by the library.
    #[allow(dead_code)]
    exp: usize,
}

/// JWT-backed [`AuthProvider`].
pub struct JwtAuthProvider {
    decoding_key: DecodingKey,
    validation: Validation,
    allowed_origins: Vec<String>,
}

impl JwtAuthProvider {
    /// Creates a provider validating HS256 tokens signed with `secret`.
    pub fn new(secret: &str, allowed_origins: Vec<String>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            allowed_origins,
        }
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    async fn authenticate(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<AuthenticatedUser, AuthError> {
        let token = credentials
            .bare_token()
            .ok_or(AuthError::MissingCredentials)?;

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            tracing::debug!("Token validation failed: {}", err);
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        let id = UserId::new(data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(
            id,
            data.claims.name,
            data.claims.email,
        ))
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            // Non-browser clients send no Origin header.
            None => true,
            Some(origin) => self.allowed_origins.iter().any(|allowed| allowed == origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        name: Option<String>,
        email: Option<String>,
        exp: usize,
    }

    fn token_for(sub: &str, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
                exp,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn provider() -> JwtAuthProvider {
        JwtAuthProvider::new(SECRET, vec!["http://localhost:3000".to_string()])
    }

    fn credentials(token: String) -> AuthCredentials {
        AuthCredentials {
            token: Some(token),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let user = provider()
            .authenticate(&credentials(token_for("teacher-1", 3600)))
            .await
            .unwrap();
        assert_eq!(user.id.as_str(), "teacher-1");
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn bearer_prefix_is_accepted() {
        let result = provider()
            .authenticate(&credentials(format!("Bearer {}", token_for("teacher-1", 3600))))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let result = provider()
            .authenticate(&AuthCredentials::default())
            .await;
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_as_expired() {
        let result = provider()
            .authenticate(&credentials(token_for("teacher-1", -3600)))
            .await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let result = provider()
            .authenticate(&credentials("not.a.jwt".to_string()))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let other = JwtAuthProvider::new("other-secret", Vec::new());
        let result = other
            .authenticate(&credentials(token_for("teacher-1", 3600)))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn origin_allow_list_is_enforced() {
        let provider = provider();
        assert!(provider.origin_allowed(None));
        assert!(provider.origin_allowed(Some("http://localhost:3000")));
        assert!(!provider.origin_allowed(Some("http://evil.example")));
    }
}
