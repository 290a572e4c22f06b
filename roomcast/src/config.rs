//! Command-line configuration for the stdio bridge.

use std::path::{Path, PathBuf};

/// CLI arguments parsed by clap.
///
/// Stdout carries the event stream, so logs go to stderr unless a log file
/// is given.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Named WebSocket bridge speaking JSON lines on stdio")]
pub struct BridgeCliArgs {
    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "ROOMCAST_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Splits a log file path into the directory and file name expected by
/// `tracing_appender`. A bare file name lives in the current directory.
#[must_use]
pub fn split_log_path(path: &Path) -> Option<(&Path, &str)> {
    let file_name = path.file_name()?.to_str()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some((dir, file_name))
}
