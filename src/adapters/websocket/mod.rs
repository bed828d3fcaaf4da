//! WebSocket transport adapter.
//!
//! Binds the transport-agnostic messaging core to axum's WebSocket
//! upgrade. See [`crate::realtime`] for the engine itself.

mod handler;

pub use handler::{websocket_router, ws_handler, WsState};
