//! roomcast bridge: named WebSockets over JSON lines.
//!
//! Reads socket commands from stdin and writes socket events to stdout, one
//! JSON object per line.
//!
//! ```bash
//! echo '{"type":"open","name":"chat","url":"ws://127.0.0.1:12345/","meta":{}}' \
//!     | cargo run --bin roomcast
//! ```

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use roomcast::bridge;
use roomcast::config::{self, BridgeCliArgs};

#[tokio::main]
async fn main() {
    let cli = BridgeCliArgs::parse();

    // Stdout belongs to the event stream; logs go to stderr or a file.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("roomcast bridge starting");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    if let Err(e) = bridge::run(stdin, tokio::io::stdout()).await {
        tracing::error!(error = %e, "bridge failed");
        std::process::exit(1);
    }

    tracing::info!("roomcast bridge exiting");
}

/// Initialize logging to stderr, or to `file_path` when given.
///
/// Returns a [`WorkerGuard`] for file logging that must be held until
/// shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(config::split_log_path) else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
