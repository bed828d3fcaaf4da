//! Mock auth provider for tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::{AuthCredentials, AuthProvider};

/// Token-table auth provider.
///
/// Resolves tokens registered via [`with_user`](Self::with_user) and
/// rejects everything else. Origins are admitted unless an allow-list is
/// installed.
pub struct MockAuthProvider {
    users: RwLock<HashMap<String, AuthenticatedUser>>,
    allowed_origins: Option<Vec<String>>,
}

impl MockAuthProvider {
    /// Creates an empty provider admitting all origins.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            allowed_origins: None,
        }
    }

    /// Registers a token -> user mapping.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.users
            .write()
            .expect("mock auth lock poisoned")
            .insert(token.into(), user);
        self
    }

    /// Restricts admitted origins to the given list.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn authenticate(
        &self,
        credentials: &AuthCredentials,
    ) -> Result<AuthenticatedUser, AuthError> {
        let token = credentials
            .bare_token()
            .ok_or(AuthError::MissingCredentials)?;
        self.users
            .read()
            .expect("mock auth lock poisoned")
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match (&self.allowed_origins, origin) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
        }
    }
}
