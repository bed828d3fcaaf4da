//! Domain model for the realtime collaboration core.

mod connection;
mod message;
mod plan;
mod presence;
mod room;

pub use connection::{Connection, ConnectionMeta};
pub use message::{ChatMessage, MessageType, QueuedMessage};
pub use plan::{PlanOperation, PlanUpdate};
pub use presence::{CursorPosition, TypingIndicator};
pub use room::{
    DetachOutcome, LockOutcome, MemberProfile, Permission, ResourceLock, Room, RoomInfo,
    RoomMember, RoomType, UnlockOutcome, UserStatus,
};
