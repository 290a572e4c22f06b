//! Relay server settings.
//!
//! Each setting is taken from the first layer that provides it:
//! 1. command-line flags (some also readable from `ROOMCAST_*` variables)
//! 2. the TOML file, `--config <path>` or `~/.config/roomcast-relay/config.toml`
//! 3. built-in defaults
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:12345"
//! max_message_size = 67108864
//!
//! [log]
//! level = "debug"
//! file = "/var/log/roomcast-relay.log"
//! ```

use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12345";

/// Default cap on a single WebSocket message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read, or an explicit
    /// `--config` path is missing.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected sections.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// On-disk layout. Every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerSection,
    log: LogSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_message_size: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogSection {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// Command-line flags of the relay binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "roomcast relay server")]
pub struct RelayCliArgs {
    /// Address to listen on for WebSocket upgrades.
    #[arg(short, long, env = "ROOMCAST_ADDR")]
    pub bind: Option<String>,

    /// Config file to load instead of `~/.config/roomcast-relay/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest accepted WebSocket message, in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Log filter (trace, debug, info, warn, error). Defaults to `info`.
    #[arg(long, env = "ROOMCAST_LOG")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stdout.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Settings the relay runs with, after layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub max_message_size: usize,
    pub log_level: String,
    /// Logs go to stdout when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
        }
    }
}

impl RelayConfig {
    /// Reads the config file named by `cli` (or the default one) and layers
    /// the flags over it.
    ///
    /// A missing default file counts as empty; a missing `--config` file is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_config_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_config_file(&path)?,
                _ => RelayConfigFile::default(),
            },
        };
        Ok(Self::layer(cli, file))
    }

    fn layer(cli: &RelayCliArgs, file: RelayConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_message_size: cli
                .max_message_size
                .or(file.server.max_message_size)
                .unwrap_or(defaults.max_message_size),
            log_level: cli
                .log_level
                .clone()
                .or(file.log.level)
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or(file.log.file),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("roomcast-relay").join("config.toml"))
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Splits a log file path into the directory and file name expected by
/// `tracing_appender`. A bare file name lives in the current directory.
///
/// Returns `None` when the path has no usable file name.
#[must_use]
pub fn split_log_path(path: &Path) -> Option<(&Path, &str)> {
    let file_name = path.file_name()?.to_str()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some((dir, file_name))
}
