//! The realtime collaboration engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Transport (axum WebSocket)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │ ClientEvent                 ▲ EventEnvelope
//!                 ▼                             │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         MessagingCore                           │
//! │   resolve connection → rate limit → authorize → handle          │
//! └─────────────────────────────────────────────────────────────────┘
//!      │               │              │             │          │
//!      ▼               ▼              ▼             ▼          ▼
//! ConnectionRegistry RoomRegistry PresenceTracker RateLimiter OfflineQueue
//! ```
//!
//! Everything below the transport is protocol-agnostic: the core speaks
//! [`events::ClientEvent`] in and [`events::EventEnvelope`] out over a
//! per-connection channel.

pub mod connections;
pub mod core;
pub mod events;
pub mod offline;
pub mod presence;
pub mod rate_limit;
pub mod rooms;
pub mod sweeper;

pub use self::core::{ConnectRejection, CoreStats, MessagingCore};
pub use connections::{ConnectionRegistry, OutboundSender};
pub use events::{ClientEvent, EventEnvelope, ServerEvent};
pub use offline::OfflineQueue;
pub use presence::{CursorUpdate, PresenceTracker};
pub use rate_limit::{EventKind, RateDecision, RateLimiter};
pub use rooms::{JoinOutcome, LeaveOutcome, RoomDeparture, RoomError, RoomRegistry, RoomStats};
pub use sweeper::spawn_idle_sweeper;
