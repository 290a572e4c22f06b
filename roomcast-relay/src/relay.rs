//! Relay server core: shared state, WebSocket handler, and server startup.
//!
//! Each accepted WebSocket gets a fresh [`ConnectionId`], joins the room
//! through the [`Broadcaster`] (which replays the history onto its outbound
//! channel), and then runs two tasks: a writer draining that channel into the
//! socket and a reader normalizing inbound frames and publishing them. When
//! either task ends the connection leaves the room.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use roomcast_proto::frame::{self, Frame, Timestamp};
use tokio::sync::mpsc;

use crate::broadcast::Broadcaster;
use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::RelayError;
use crate::registry::ConnectionId;

/// Shared relay server state handed to every connection handler.
#[derive(Debug)]
pub struct RelayState {
    /// Handle to the task owning the registry and history.
    broadcaster: Broadcaster,
    /// Maximum size of a single WebSocket message in bytes.
    max_message_size: usize,
}

impl RelayState {
    /// Creates relay state around a running broadcaster with the default
    /// message size limit.
    #[must_use]
    pub const fn new(broadcaster: Broadcaster) -> Self {
        Self::with_config(DEFAULT_MAX_MESSAGE_SIZE, broadcaster)
    }

    /// Creates relay state with a custom message size limit.
    #[must_use]
    pub const fn with_config(max_message_size: usize, broadcaster: Broadcaster) -> Self {
        Self {
            broadcaster,
            max_message_size,
        }
    }

    /// Returns the broadcaster handle.
    #[must_use]
    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

/// Handles an upgraded WebSocket connection for a single peer.
///
/// The connection lifecycle:
/// 1. Join the room; the full history is queued for this connection.
/// 2. Spawn the writer, which sends queued frames in order.
/// 3. Read frames, normalize them, and publish them to the room.
/// 4. On close or transport error, leave the room.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn_id = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    if let Err(e) = state.broadcaster.join(conn_id, tx) {
        tracing::error!(conn_id = %conn_id, error = %e, "failed to join room");
        return;
    }

    // Writer: forwards replayed and live frames to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_sender.send(into_ws_message(frame)).await {
                let e = RelayError::from(e);
                tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader: normalizes inbound frames and hands them to the broadcaster.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            let inbound = match msg {
                Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
                Ok(Message::Close(_)) => {
                    tracing::debug!(conn_id = %conn_id, "received close frame");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Err(e) => {
                    let e = RelayError::from(e);
                    tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket read failed");
                    break;
                }
            };
            if handle_inbound(conn_id, inbound, &reader_state).is_err() {
                break;
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Leaving twice (after a failed delivery already dropped us) is harmless.
    if let Err(e) = state.broadcaster.leave(conn_id) {
        tracing::warn!(conn_id = %conn_id, error = %e, "failed to leave room");
    }
    tracing::info!(conn_id = %conn_id, "connection closed");
}

/// Normalizes one inbound frame and publishes it.
///
/// Malformed frames are logged and dropped; the connection stays open.
fn handle_inbound(
    conn_id: ConnectionId,
    inbound: Frame,
    state: &RelayState,
) -> Result<(), RelayError> {
    match frame::normalize(inbound, Timestamp::now()) {
        Ok(normalized) => state.broadcaster.publish(conn_id, normalized).inspect_err(|e| {
            tracing::error!(conn_id = %conn_id, error = %e, "failed to publish frame");
        }),
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "dropping inbound frame");
            Ok(())
        }
    }
}

fn into_ws_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

/// Starts the relay server on the given address with a fresh, empty room and
/// returns the bound address and a join handle.
///
/// This is the primary entry point used by test code.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if the TCP listener cannot bind to the given
/// address.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), RelayError> {
    let (broadcaster, _task) = Broadcaster::spawn();
    start_server_with_state(addr, Arc::new(RelayState::new(broadcaster))).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// WebSocket upgrades are accepted on both `/` and `/ws`.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if the TCP listener cannot bind to the given
/// address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), RelayError> {
    let bind_error = |source| RelayError::Bind {
        addr: addr.to_string(),
        source,
    };

    let app = axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(bind_error)?;
    let bound_addr = listener.local_addr().map_err(bind_error)?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address,
/// the shared state, and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (
    SocketAddr,
    Arc<RelayState>,
    tokio::task::JoinHandle<()>,
) {
    let (broadcaster, _task) = Broadcaster::spawn();
    let state = Arc::new(RelayState::new(broadcaster));
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test server");
    (addr, state, handle)
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    let max = state.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state))
}
