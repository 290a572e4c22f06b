//! roomcast client-side adapter.
//!
//! Multiplexes WebSocket connections by logical name for an external
//! application: [`sockets::SocketManager`] turns open/send/close commands
//! into opened/message/closed/error events, and [`bridge`] exposes that over
//! JSON lines on stdin/stdout.

pub mod bridge;
pub mod config;
pub mod sockets;
