//! Relay server error types.

/// Errors surfaced by the relay server.
///
/// Only [`RelayError::Bind`] is fatal. The others are scoped to a single
/// connection and end in that connection's teardown.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The listen address could not be acquired.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading from or writing to a connection failed.
    #[error("transport failure: {0}")]
    Transport(#[from] axum::Error),

    /// The broadcaster task is no longer running.
    #[error("broadcaster has shut down")]
    BroadcasterClosed,
}

