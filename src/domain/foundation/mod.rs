//! Foundation value objects shared across the domain.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser};
pub use errors::{ErrorCode, ValidationError};
pub use ids::{EventId, MessageId, RoomId, SessionId, SocketId, UserId};
pub use timestamp::Timestamp;
