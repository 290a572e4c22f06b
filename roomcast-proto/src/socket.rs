//! Named-socket adapter wire types.
//!
//! An external application drives WebSocket connections by name: it issues
//! [`SocketCommand`]s and receives [`SocketEvent`]s. Both travel as JSON
//! objects tagged by a `type` field:
//!
//! ```json
//! {"type":"open","name":"chat","url":"ws://127.0.0.1:12345/","meta":{"room":"lobby"}}
//! {"type":"opened","name":"chat","meta":{"room":"lobby"}}
//! ```
//!
//! `meta` is an opaque string map supplied on `open` and echoed back on
//! every event for that socket.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::Frame;

/// Caller-supplied metadata echoed on every event of a socket.
pub type Meta = BTreeMap<String, String>;

/// Commands from the application to the socket layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketCommand {
    /// Open a socket under `name`, closing any socket already using it.
    Open {
        /// Logical socket name.
        name: String,
        /// WebSocket URL to connect to.
        url: String,
        /// Metadata echoed on every event.
        #[serde(default)]
        meta: Meta,
    },
    /// Send `data` on the named socket.
    ///
    /// A JSON string is sent verbatim; any other value is serialized first.
    Send {
        /// Logical socket name.
        name: String,
        /// Payload to send.
        data: Value,
    },
    /// Close the named socket.
    Close {
        /// Logical socket name.
        name: String,
    },
}

impl SocketCommand {
    /// The socket name this command targets.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Open { name, .. } | Self::Send { name, .. } | Self::Close { name } => name,
        }
    }
}

/// Events from the socket layer back to the application.
///
/// Every opened socket produces exactly one terminal event, either
/// [`SocketEvent::Closed`] or [`SocketEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketEvent {
    /// The WebSocket handshake completed.
    Opened {
        /// Logical socket name.
        name: String,
        /// Metadata given on `open`.
        meta: Meta,
    },
    /// A frame arrived on the socket.
    Message {
        /// Logical socket name.
        name: String,
        /// Metadata given on `open`.
        meta: Meta,
        /// Text as a JSON string, binary as an array of bytes.
        data: Frame,
    },
    /// The socket closed.
    Closed {
        /// Logical socket name.
        name: String,
        /// Metadata given on `open`.
        meta: Meta,
        /// Close reason, empty if none was given.
        reason: String,
    },
    /// The socket failed.
    Error {
        /// Logical socket name.
        name: String,
        /// Metadata given on `open`.
        meta: Meta,
        /// Description of the failure, if known.
        error: Option<String>,
    },
}

impl SocketEvent {
    /// The socket name this event belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Opened { name, .. }
            | Self::Message { name, .. }
            | Self::Closed { name, .. }
            | Self::Error { name, .. } => name,
        }
    }

    /// Returns `true` for `closed` and `error`, after which the name is free.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Error { .. })
    }
}

/// Builds the outbound frame for a `send` command's data.
#[must_use]
pub fn outgoing_frame(data: &Value) -> Frame {
    match data {
        Value::String(text) => Frame::Text(text.clone()),
        other => Frame::Text(other.to_string()),
    }
}
