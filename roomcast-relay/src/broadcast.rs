//! Broadcaster actor: the single ordering point of the relay.
//!
//! One task owns both the [`ConnectionRegistry`] and the [`HistoryLog`] and
//! applies [`RelayCommand`]s from a single queue, one at a time. Because
//! every join, leave and publish is handled by that one task:
//!
//! - the append and fan-out of one frame never interleave with another's,
//!   so all connections observe the same total order;
//! - a joining connection has the full history queued on its outbound channel
//!   in the same step that registers it, so no live frame can overtake the
//!   replay;
//! - a leaving connection is removed before any later frame is fanned out.
//!
//! Fan-out only pushes onto per-connection unbounded channels, so a slow
//! socket never stalls the actor.

use roomcast_proto::frame::Frame;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::RelayError;
use crate::history::HistoryLog;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound};

/// Commands accepted by the broadcaster task.
#[derive(Debug)]
pub enum RelayCommand {
    /// Replay history to a new connection, then register it.
    Join {
        /// Identity of the joining connection.
        id: ConnectionId,
        /// Its outbound frame channel.
        outbound: Outbound,
    },
    /// Unregister a connection. A no-op if it is already gone.
    Leave {
        /// Identity of the departing connection.
        id: ConnectionId,
    },
    /// Append a normalized frame to history and fan it out.
    Publish {
        /// Connection the frame came from (kept for logging only).
        from: ConnectionId,
        /// The normalized frame.
        frame: Frame,
    },
    /// Report the current room state.
    Snapshot {
        /// Where to send the snapshot.
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Point-in-time view of the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Number of open connections.
    pub connections: usize,
    /// Every frame broadcast so far, in order.
    pub history: Vec<Frame>,
}

/// Cloneable handle to the broadcaster task.
///
/// The task runs until every handle is dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<RelayCommand>,
}

impl Broadcaster {
    /// Spawns the broadcaster task with an empty room.
    #[must_use]
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::spawn_with_history(HistoryLog::new())
    }

    /// Spawns the broadcaster task seeded with an existing history.
    #[must_use]
    pub fn spawn_with_history(history: HistoryLog) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = Room {
            registry: ConnectionRegistry::new(),
            history,
        };
        let handle = tokio::spawn(run(rx, room));
        (Self { commands: tx }, handle)
    }

    /// Queues a join for `id`. History is replayed onto `outbound` before any
    /// live frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BroadcasterClosed`] if the task has stopped.
    pub fn join(&self, id: ConnectionId, outbound: Outbound) -> Result<(), RelayError> {
        self.send(RelayCommand::Join { id, outbound })
    }

    /// Queues removal of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BroadcasterClosed`] if the task has stopped.
    pub fn leave(&self, id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayCommand::Leave { id })
    }

    /// Queues a normalized frame for append and fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BroadcasterClosed`] if the task has stopped.
    pub fn publish(&self, from: ConnectionId, frame: Frame) -> Result<(), RelayError> {
        self.send(RelayCommand::Publish { from, frame })
    }

    /// Fetches the room state once every previously queued command is applied.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BroadcasterClosed`] if the task has stopped.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Snapshot { reply })?;
        rx.await.map_err(|_| RelayError::BroadcasterClosed)
    }

    fn send(&self, cmd: RelayCommand) -> Result<(), RelayError> {
        self.commands
            .send(cmd)
            .map_err(|_| RelayError::BroadcasterClosed)
    }
}

/// State owned exclusively by the broadcaster task.
struct Room {
    registry: ConnectionRegistry,
    history: HistoryLog,
}

impl Room {
    fn apply(&mut self, cmd: RelayCommand) {
        match cmd {
            RelayCommand::Join { id, outbound } => self.join(id, outbound),
            RelayCommand::Leave { id } => {
                if self.registry.unregister(&id) {
                    tracing::info!(
                        conn_id = %id,
                        connections = self.registry.len(),
                        "connection left"
                    );
                }
            }
            RelayCommand::Publish { from, frame } => self.publish(from, frame),
            RelayCommand::Snapshot { reply } => {
                let _ = reply.send(RoomSnapshot {
                    connections: self.registry.len(),
                    history: self.history.as_slice().to_vec(),
                });
            }
        }
    }

    fn join(&mut self, id: ConnectionId, outbound: Outbound) {
        let replayed = self.history.len();
        for frame in self.history.iter() {
            if outbound.send(frame.clone()).is_err() {
                tracing::warn!(conn_id = %id, "connection closed during history replay");
                return;
            }
        }
        if self.registry.register(id, outbound).is_some() {
            tracing::warn!(conn_id = %id, "replaced existing registration");
        }
        tracing::info!(
            conn_id = %id,
            replayed = replayed,
            connections = self.registry.len(),
            "connection joined"
        );
    }

    fn publish(&mut self, from: ConnectionId, frame: Frame) {
        let seq = self.history.append(frame.clone());
        let failed = self.registry.fan_out(&frame);
        tracing::debug!(
            from = %from,
            seq = seq,
            len = frame.len(),
            binary = frame.is_binary(),
            recipients = self.registry.len(),
            "broadcast frame"
        );
        for id in failed {
            tracing::warn!(conn_id = %id, "delivery failed, connection dropped");
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<RelayCommand>, mut room: Room) {
    while let Some(cmd) = rx.recv().await {
        room.apply(cmd);
    }
    tracing::debug!(history = room.history.len(), "broadcaster stopped");
}
