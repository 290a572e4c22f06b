//! JSON-lines bridge between an external application and [`SocketManager`].
//!
//! Each input line is one [`SocketCommand`]; each output line is one
//! [`SocketEvent`]. Lines that do not parse are logged and skipped. When the
//! input ends, every socket is closed and the bridge returns once all their
//! terminal events have been written.
//!
//! [`SocketCommand`]: roomcast_proto::socket::SocketCommand
//! [`SocketEvent`]: roomcast_proto::socket::SocketEvent

use roomcast_proto::socket::{SocketCommand, SocketEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::sockets::SocketManager;

/// Errors that end the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Reading commands or writing events failed.
    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runs the bridge until `input` reaches EOF.
///
/// # Errors
///
/// Returns [`BridgeError`] if reading `input` or writing `output` fails.
pub async fn run<R, W>(input: R, mut output: W) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut manager, mut events) = SocketManager::new();
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => apply_line(&mut manager, &line),
                None => break,
            },
            Some(event) = events.recv() => write_event(&mut output, &event).await?,
        }
    }

    tracing::debug!(open = manager.len(), "input closed, shutting down sockets");
    manager.shutdown().await;
    while let Some(event) = events.recv().await {
        write_event(&mut output, &event).await?;
    }
    output.flush().await?;
    Ok(())
}

fn apply_line(manager: &mut SocketManager, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let command = match serde_json::from_str::<SocketCommand>(line) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "skipping invalid command line");
            return;
        }
    };
    let name = command.name().to_owned();
    if let Err(e) = manager.dispatch(command) {
        tracing::warn!(name = %name, error = %e, "command ignored");
    }
}

async fn write_event<W>(output: &mut W, event: &SocketEvent) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
