//! Authentication configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Authentication configuration for the WebSocket handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to validate client JWTs.
    ///
    /// May be empty in development, in which case the mock provider
    /// should be wired instead of the JWT adapter.
    #[serde(default)]
    pub jwt_secret: String,

    /// Origins allowed to open WebSocket connections (comma-separated).
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

impl AuthConfig {
    /// Get allowed origins as a vector.
    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate auth configuration for the given environment.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if *environment != Environment::Development && self.jwt_secret.is_empty() {
            return Err(ValidationError::MissingJwtSecret);
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let config = AuthConfig {
            jwt_secret: String::new(),
            allowed_origins: "http://a.example, http://b.example".to_string(),
        };
        let origins = config.allowed_origins_list();
        assert_eq!(origins, vec!["http://a.example", "http://b.example"]);
    }

    #[test]
    fn missing_secret_rejected_in_production() {
        let config = AuthConfig::default();
        assert!(config.validate(&Environment::Development).is_ok());
        assert_eq!(
            config.validate(&Environment::Production),
            Err(ValidationError::MissingJwtSecret)
        );
    }
}
