//! roomcast relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts WebSocket connections, replays the room history to each
//! newcomer, and broadcasts every inbound message to all connected peers.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod history;
pub mod registry;
pub mod relay;
