//! Chat relay server entry point.
//!
//! # What happens at startup
//!
//! 1. CLI arguments are parsed with `clap`.
//! 2. The TOML config file is loaded (a missing file means defaults) and any
//!    CLI flags override what it says.
//! 3. The audit log file is opened.  If that fails the relay still starts,
//!    with audit lines going to the console only.
//! 4. `tracing_subscriber` is initialised with two layers: the console,
//!    filtered by `RUST_LOG` or the configured level, and the audit file,
//!    which takes only audit events.
//! 5. The listener is bound.  Failing to bind is the only fatal error; the
//!    process exits with a diagnostic.
//! 6. The relay runs until Ctrl-C, then closes every session.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use chat_server::application::audit::AuditTrail;
use chat_server::infrastructure::audit_file::AuditFile;
use chat_server::infrastructure::network::RelayServer;
use chat_server::infrastructure::storage::config::{load_config, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Minimal TCP chat relay.
///
/// Clients connect, register a display name, and every chat line is
/// relayed to all other connected clients.
#[derive(Debug, Parser)]
#[command(name = "chat-server", version)]
struct Cli {
    /// Path to the TOML configuration file.  Missing file means defaults.
    #[arg(long, default_value = "chat-server.toml", env = "CHAT_SERVER_CONFIG")]
    config: PathBuf,

    /// IP address to listen on (overrides `network.bind_address`).
    #[arg(long, env = "CHAT_SERVER_BIND")]
    bind: Option<String>,

    /// TCP port to listen on (overrides `network.port`).
    #[arg(long, env = "CHAT_SERVER_PORT")]
    port: Option<u16>,

    /// Audit log file (overrides `logging.audit_log`).
    #[arg(long, env = "CHAT_SERVER_AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (overrides `logging.log_level`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(bind) = self.bind {
            config.network.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(path) = self.audit_log {
            config.logging.audit_log = Some(path);
        }
        if let Some(level) = self.log_level {
            config.logging.log_level = level;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let config = cli.apply(file_config);

    let audit_path = config.audit_log_path();
    let (audit_layer, _audit_guard, audit_warning) = match open_audit_file(&audit_path) {
        Ok(file) => {
            let (layer, guard) = file.into_layer();
            (Some(layer), Some(guard), None)
        }
        Err(warning) => (None, None, Some(warning)),
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(audit_layer)
        .init();

    match audit_warning {
        Some(warning) => warn!("{warning}"),
        None => info!("audit log at {}", audit_path.display()),
    }

    let server = RelayServer::bind(&config, AuditTrail::tracing_only())
        .await
        .context("chat server could not start")?;

    info!("chat server ready on {}.  Press Ctrl-C to exit.", server.local_addr());
    server.run_until_ctrl_c().await;

    info!("chat server stopped");
    Ok(())
}

/// Opens the audit log file.
///
/// A failure is not fatal: the error comes back as a warning to log once
/// tracing is up, and the relay runs without the file.
fn open_audit_file(path: &Path) -> Result<AuditFile, String> {
    AuditFile::open(path)
        .map_err(|e| format!("audit log disabled, logging to the console only: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
