//! Adapters: concrete implementations of the ports plus the transport
//! binding.

pub mod auth;
pub mod events;
pub mod websocket;
