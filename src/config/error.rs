//! Configuration error types

use thiserror::Error;

/// Errors that occur while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying config crate failure (missing var, parse failure).
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors that occur during semantic validation of loaded configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Server port must be non-zero")]
    InvalidPort,

    #[error("Request timeout must be between 1 and 300 seconds")]
    InvalidTimeout,

    #[error("JWT secret must be set outside development")]
    MissingJwtSecret,

    #[error("Rate limit '{0}' must allow at least one event per window")]
    InvalidRateLimit(&'static str),

    #[error("Idle timeout must be non-zero")]
    InvalidIdleTimeout,

    #[error("Per-user offline queue capacity must be non-zero")]
    InvalidQueueCapacity,
}
