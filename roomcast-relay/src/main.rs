//! roomcast relay server: single-room broadcast with history replay.
//!
//! An axum WebSocket server that rebroadcasts every inbound message to all
//! connected peers and replays the full history to each newcomer. Structured
//! text messages without a `timestamp` field are stamped on arrival.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:12345
//! cargo run --bin roomcast-relay
//!
//! # Run on custom address
//! cargo run --bin roomcast-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! ROOMCAST_ADDR=127.0.0.1:8080 cargo run --bin roomcast-relay
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use roomcast_relay::broadcast::Broadcaster;
use roomcast_relay::config::{self, RelayCliArgs, RelayConfig};
use roomcast_relay::relay::{self, RelayState};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(addr = %config.bind_addr, "starting roomcast relay server");

    let (broadcaster, _broadcast_task) = Broadcaster::spawn();
    let state = Arc::new(RelayState::with_config(config.max_message_size, broadcaster));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}

/// Initialize logging to stdout, or to `file_path` when given.
///
/// Returns a [`WorkerGuard`] for file logging that must be held until
/// shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((dir, file_name)) = file_path.and_then(config::split_log_path) else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}
