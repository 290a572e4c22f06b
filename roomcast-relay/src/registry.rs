//! Live connection registry.
//!
//! Tracks every open connection by [`ConnectionId`] together with the sending
//! half of its outbound frame channel. A connection is in the registry exactly
//! while it is open: it is inserted when its WebSocket upgrade completes and
//! removed on close, on read error, or when a write to it fails.

use std::collections::HashMap;
use std::fmt;

use roomcast_proto::frame::Frame;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending half of a connection's outbound frame channel.
///
/// A per-connection writer task drains the receiving half into the socket.
pub type Outbound = mpsc::UnboundedSender<Frame>;

/// Server-assigned identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new, time-ordered connection identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of open connections eligible to receive broadcasts.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Outbound>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, returning the previous handle if the id was
    /// already present.
    pub fn register(&mut self, id: ConnectionId, outbound: Outbound) -> Option<Outbound> {
        self.connections.insert(id, outbound)
    }

    /// Removes a connection. Removing an absent id is a no-op.
    ///
    /// Returns `true` if the connection was present.
    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Returns `true` if the connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queues `frame` on every registered connection, the sender included.
    ///
    /// Connections whose channel is closed are unregistered and their ids
    /// returned; the remaining connections still receive the frame.
    pub fn fan_out(&mut self, frame: &Frame) -> Vec<ConnectionId> {
        let failed: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, outbound)| outbound.send(frame.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();
        for id in &failed {
            self.connections.remove(id);
        }
        failed
    }
}
