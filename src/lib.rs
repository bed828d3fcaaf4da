//! PlanSync - Real-time collaboration core
//!
//! This crate implements the realtime backbone of the PlanSync classroom
//! platform: shared rooms for chat, collaborative lesson planning, and
//! content generation, with presence tracking, per-event rate limiting,
//! resource locks, and offline message delivery.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod realtime;
