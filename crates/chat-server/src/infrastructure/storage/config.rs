//! TOML-based configuration for the relay server.
//!
//! Every field has a serde default, so an empty file, a partial file, or no
//! file at all yields a working configuration:
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 8910
//!
//! [relay]
//! accept_batch = 5
//! read_buffer_size = 8192
//! max_frame_len = 65536
//! outbox_capacity = 256
//! event_queue_capacity = 1024
//!
//! [logging]
//! log_level = "info"
//! audit_log = "/var/log/chat/logs.txt"
//! ```
//!
//! Command-line flags override file values (see `main.rs`).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use chat_core::protocol::messages::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the audit log when no path is configured.
pub const DEFAULT_AUDIT_LOG_NAME: &str = "logs.txt";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `network.bind_address` is not an IP address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.  `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Tuning knobs for the relay loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Most connections admitted in one go before session events get a turn.
    #[serde(default = "default_accept_batch")]
    pub accept_batch: usize,
    /// Size of the buffer each connection reads into.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Largest frame a peer may send; larger frames drop the session.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Frames queued per session before the peer counts as failed.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Session events queued for the relay loop before readers wait.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Audit log file.  Defaults to `logs.txt` next to the executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_accept_batch() -> usize {
    5
}
fn default_read_buffer_size() -> usize {
    8192
}
fn default_max_frame_len() -> usize {
    64 * 1024
}
fn default_outbox_capacity() -> usize {
    256
}
fn default_event_queue_capacity() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            accept_batch: default_accept_batch(),
            read_buffer_size: default_read_buffer_size(),
            max_frame_len: default_max_frame_len(),
            outbox_capacity: default_outbox_capacity(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            audit_log: None,
        }
    }
}

impl ServerConfig {
    /// Resolves the listening socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` does not
    /// parse as an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.network.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.network.port))
    }

    /// Returns the audit log path, falling back to `logs.txt` beside the
    /// running executable (or the working directory if that is unknown).
    pub fn audit_log_path(&self) -> PathBuf {
        if let Some(path) = &self.logging.audit_log {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join(DEFAULT_AUDIT_LOG_NAME)
    }
}

impl RelayConfig {
    /// Returns a copy with every count and capacity raised to at least 1.
    pub fn clamped(&self) -> Self {
        Self {
            accept_batch: self.accept_batch.max(1),
            read_buffer_size: self.read_buffer_size.max(1),
            max_frame_len: self.max_frame_len.max(1),
            outbox_capacity: self.outbox_capacity.max(1),
            event_queue_capacity: self.event_queue_capacity.max(1),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from `path`, returning `ServerConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
