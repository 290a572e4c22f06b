//! Name-indexed WebSocket multiplexer.
//!
//! [`SocketManager`] owns a table from logical socket name to a running
//! connection task. Each task connects, reports `opened`, forwards frames in
//! both directions, and finishes with exactly one terminal event (`closed` or
//! `error`), after which the name is free again.
//!
//! Opening a name that is already in use closes the old socket first. Every
//! socket carries a generation number so that the old socket's teardown never
//! removes the table entry of the socket that replaced it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use roomcast_proto::frame::Frame;
use roomcast_proto::socket::{self, Meta, SocketCommand, SocketEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

/// Close reason sent to a socket replaced by a new `open` with its name.
pub const SUPERSEDED_REASON: &str = "New socket opened with the same name";

/// How long to wait for the server's close reply after closing a socket.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors returned by [`SocketManager`] commands.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// No socket is open under this name.
    #[error("no socket named {0:?}")]
    UnknownSocket(String),

    /// The socket's task has already finished.
    #[error("socket {0:?} is closed")]
    Closed(String),

    /// The `open` URL does not parse.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// The `open` URL is not `ws://` or `wss://`.
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),
}

/// Instructions from the manager to one socket task.
#[derive(Debug)]
enum Outgoing {
    Frame(Frame),
    Close(String),
}

/// Table entry for one live socket.
#[derive(Debug)]
struct SocketEntry {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

type SocketTable = Arc<Mutex<HashMap<String, SocketEntry>>>;

/// Multiplexes WebSocket connections by name.
///
/// Created with [`SocketManager::new`], which also returns the receiver for
/// [`SocketEvent`]s. Commands are applied in the order they are issued.
#[derive(Debug)]
pub struct SocketManager {
    sockets: SocketTable,
    events: mpsc::UnboundedSender<SocketEvent>,
    tasks: Vec<JoinHandle<()>>,
    next_generation: u64,
}

impl SocketManager {
    /// Creates an empty manager and the receiver for its events.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            sockets: Arc::new(Mutex::new(HashMap::new())),
            events,
            tasks: Vec::new(),
            next_generation: 0,
        };
        (manager, rx)
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError`] if a `send` or `close` names no open socket.
    pub fn dispatch(&mut self, command: SocketCommand) -> Result<(), SocketError> {
        match command {
            SocketCommand::Open { name, url, meta } => {
                self.open(name, url, meta);
                Ok(())
            }
            SocketCommand::Send { name, data } => self.send(&name, &data),
            SocketCommand::Close { name } => self.close(&name),
        }
    }

    /// Opens a socket under `name`, closing any socket already using it.
    ///
    /// Connection failures, including an invalid URL, are reported as an
    /// `error` event rather than returned.
    pub fn open(&mut self, name: String, url: String, meta: Meta) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.sockets.lock().insert(
            name.clone(),
            SocketEntry {
                generation,
                outgoing: tx,
            },
        );
        if let Some(old) = previous {
            tracing::debug!(name = %name, "replacing socket with the same name");
            let _ = old.outgoing.send(Outgoing::Close(SUPERSEDED_REASON.to_string()));
        }

        let ctx = SocketContext {
            name,
            meta,
            generation,
            events: self.events.clone(),
            sockets: Arc::clone(&self.sockets),
        };
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(run_socket(ctx, url, rx)));
    }

    /// Sends `data` on the named socket.
    ///
    /// A JSON string is sent verbatim as a text frame; any other value is
    /// serialized first. Frames sent while the socket is still connecting
    /// are delivered once it opens.
    ///
    /// # Errors
    ///
    /// - [`SocketError::UnknownSocket`] if no socket uses `name`.
    /// - [`SocketError::Closed`] if the socket is already shutting down.
    pub fn send(&self, name: &str, data: &Value) -> Result<(), SocketError> {
        let sockets = self.sockets.lock();
        let entry = sockets
            .get(name)
            .ok_or_else(|| SocketError::UnknownSocket(name.to_string()))?;
        entry
            .outgoing
            .send(Outgoing::Frame(socket::outgoing_frame(data)))
            .map_err(|_| SocketError::Closed(name.to_string()))
    }

    /// Closes the named socket. Its `closed` event follows.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::UnknownSocket`] if no socket uses `name`.
    pub fn close(&mut self, name: &str) -> Result<(), SocketError> {
        let entry = self
            .sockets
            .lock()
            .remove(name)
            .ok_or_else(|| SocketError::UnknownSocket(name.to_string()))?;
        let _ = entry.outgoing.send(Outgoing::Close(String::new()));
        Ok(())
    }

    /// Returns `true` if a socket currently uses `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sockets.lock().contains_key(name)
    }

    /// Number of sockets in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Returns `true` if no socket is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Closes every socket and waits until each has reported its terminal
    /// event.
    pub async fn shutdown(mut self) {
        let entries: Vec<SocketEntry> = self.sockets.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            let _ = entry.outgoing.send(Outgoing::Close(String::new()));
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "socket task failed");
            }
        }
    }
}

/// Everything a socket task needs to report events and clean up.
struct SocketContext {
    name: String,
    meta: Meta,
    generation: u64,
    events: mpsc::UnboundedSender<SocketEvent>,
    sockets: SocketTable,
}

impl SocketContext {
    fn emit(&self, event: SocketEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.events.send(event);
    }

    fn opened(&self) -> SocketEvent {
        SocketEvent::Opened {
            name: self.name.clone(),
            meta: self.meta.clone(),
        }
    }

    fn message(&self, data: Frame) -> SocketEvent {
        SocketEvent::Message {
            name: self.name.clone(),
            meta: self.meta.clone(),
            data,
        }
    }

    fn closed(&self, reason: String) -> SocketEvent {
        SocketEvent::Closed {
            name: self.name.clone(),
            meta: self.meta.clone(),
            reason,
        }
    }

    fn error(&self, error: impl ToString) -> SocketEvent {
        SocketEvent::Error {
            name: self.name.clone(),
            meta: self.meta.clone(),
            error: Some(error.to_string()),
        }
    }

    /// Frees the name (unless a newer socket owns it) and reports `terminal`.
    fn finish(self, terminal: SocketEvent) {
        {
            let mut sockets = self.sockets.lock();
            if sockets
                .get(&self.name)
                .is_some_and(|e| e.generation == self.generation)
            {
                sockets.remove(&self.name);
            }
        }
        tracing::debug!(name = %self.name, event = ?terminal, "socket finished");
        self.emit(terminal);
    }
}

async fn run_socket(ctx: SocketContext, url: String, outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    let terminal = drive_socket(&ctx, &url, outgoing).await;
    ctx.finish(terminal);
}

/// Runs one socket to completion and returns its terminal event.
async fn drive_socket(
    ctx: &SocketContext,
    url: &str,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) -> SocketEvent {
    let url = match parse_ws_url(url) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(name = %ctx.name, url = url, error = %e, "invalid socket URL");
            return ctx.error(e);
        }
    };

    // Connect, buffering frames queued before the handshake completes.
    let connect = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connect);
    let mut pending = Vec::new();
    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _response)) => break ws,
                Err(e) => {
                    tracing::warn!(name = %ctx.name, url = %url, error = %e, "socket connect failed");
                    return ctx.error(e);
                }
            },
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(frame)) => pending.push(frame),
                Some(Outgoing::Close(reason)) => return ctx.closed(reason),
                None => return ctx.closed(String::new()),
            },
        }
    };

    tracing::info!(name = %ctx.name, url = %url, "socket opened");
    ctx.emit(ctx.opened());

    let (mut sink, mut stream) = ws.split();
    for frame in pending {
        if let Err(e) = sink.send(into_ws_message(frame)).await {
            return ctx.error(e);
        }
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    ctx.emit(ctx.message(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    ctx.emit(ctx.message(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default();
                    tracing::info!(name = %ctx.name, reason = %reason, "socket closed by peer");
                    return ctx.closed(reason);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(name = %ctx.name, error = %e, "socket read failed");
                    return ctx.error(e);
                }
                None => return ctx.closed(String::new()),
            },
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = sink.send(into_ws_message(frame)).await {
                        tracing::warn!(name = %ctx.name, error = %e, "socket write failed");
                        return ctx.error(e);
                    }
                }
                Some(Outgoing::Close(reason)) => {
                    close_gracefully(&mut sink, &mut stream, &reason).await;
                    return ctx.closed(reason);
                }
                None => {
                    close_gracefully(&mut sink, &mut stream, "").await;
                    return ctx.closed(String::new());
                }
            },
        }
    }
}

/// Sends a normal close frame and waits briefly for the peer's reply.
async fn close_gracefully<Si, St>(sink: &mut Si, stream: &mut St, reason: &str)
where
    Si: SinkExt<Message> + Unpin,
    St: StreamExt + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: reason.to_owned().into(),
    };
    if sink.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }
    let drain = async { while stream.next().await.is_some() {} };
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain).await;
}

fn parse_ws_url(raw: &str) -> Result<Url, SocketError> {
    let url = Url::parse(raw).map_err(|source| SocketError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(SocketError::UnsupportedScheme(other.to_string())),
    }
}

fn into_ws_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}
