//! Error types for the domain layer.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField {
            field: field.into(),
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wire-level error codes emitted to clients in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Connection errors (terminate the transport)
    InvalidOrigin,
    AuthFailed,
    ConnectionError,

    // Throttling
    RateLimit,

    // Request validation errors
    MissingData,
    MissingRoomId,
    MessageTooLong,
    InvalidOperation,

    // Permission errors
    AccessDenied,
    NoWritePermission,
    UnlockDenied,

    // Room / membership errors
    RoomNotFound,
    RoomAlreadyExists,
    JoinFailed,
    LeaveFailed,
    SendFailed,
    NotInSession,
    NotLocked,
}

impl ErrorCode {
    /// Returns the string representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidOrigin => "INVALID_ORIGIN",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::MissingData => "MISSING_DATA",
            ErrorCode::MissingRoomId => "MISSING_ROOM_ID",
            ErrorCode::MessageTooLong => "MESSAGE_TOO_LONG",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::NoWritePermission => "NO_WRITE_PERMISSION",
            ErrorCode::UnlockDenied => "UNLOCK_DENIED",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::RoomAlreadyExists => "ROOM_ALREADY_EXISTS",
            ErrorCode::JoinFailed => "JOIN_FAILED",
            ErrorCode::LeaveFailed => "LEAVE_FAILED",
            ErrorCode::SendFailed => "SEND_FAILED",
            ErrorCode::NotInSession => "NOT_IN_SESSION",
            ErrorCode::NotLocked => "NOT_LOCKED",
        }
    }

    /// True if the transport must be closed after emitting this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidOrigin | ErrorCode::AuthFailed | ErrorCode::ConnectionError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
