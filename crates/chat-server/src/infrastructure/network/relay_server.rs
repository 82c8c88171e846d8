//! RelayServer: the listening socket and the loop that coordinates everything.
//!
//! # Ownership model (for beginners)
//!
//! Exactly one task, the one running [`RelayServer::run_until`], owns the
//! [`SessionRegistry`].  Connection tasks never touch it; they send
//! [`SessionEvent`]s over a bounded queue instead.  So registration, lookup,
//! broadcast, and removal all happen in one place, one event at a time,
//! without any locks:
//!
//! ```text
//!            ┌───────────── relay loop ─────────────┐
//! accept ───►│ Acceptor::admit_batch   ──► registry │
//! events ───►│ dispatch(event)         ──► registry │──► outboxes
//! Ctrl-C ───►│ close_all, return                    │
//!            └──────────────────────────────────────┘
//! ```
//!
//! Accepts and events are polled fairly, so neither a flood of connects nor
//! a chatty session can starve the other.

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::audit::AuditTrail;
use crate::application::dispatch::{dispatch, SessionEvent};
use crate::application::session_registry::SessionRegistry;
use crate::infrastructure::network::acceptor::Acceptor;
use crate::infrastructure::network::connection::ConnectionSettings;
use crate::infrastructure::storage::config::{ConfigError, ServerConfig};

/// Fatal startup errors.  Once the loop is running nothing is fatal.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid listen address: {0}")]
    InvalidAddress(#[from] ConfigError),
    #[error("could not determine local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// A bound relay, ready to run.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: SessionRegistry,
    audit: AuditTrail,
    acceptor: Acceptor,
    events: mpsc::Receiver<SessionEvent>,
}

impl RelayServer {
    /// Binds the listener described by `config` and records the start.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address is in use or not
    /// permitted, and [`NetworkError::InvalidAddress`] if the configured bind
    /// address is not an IP address.
    pub async fn bind(config: &ServerConfig, audit: AuditTrail) -> Result<Self, NetworkError> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr().map_err(NetworkError::LocalAddr)?;

        let relay = config.relay.clamped();
        let (events_tx, events_rx) = mpsc::channel(relay.event_queue_capacity);
        let acceptor = Acceptor::new(
            ConnectionSettings::from(&relay),
            relay.accept_batch,
            events_tx,
        );

        audit.record(&format!("Server started on {local_addr}"));

        Ok(Self {
            listener,
            local_addr,
            registry: SessionRegistry::new(),
            audit,
            acceptor,
            events: events_rx,
        })
    }

    /// The address actually bound (useful when the configured port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the relay until `shutdown` completes, then closes every session.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let RelayServer {
            listener,
            local_addr,
            mut registry,
            audit,
            acceptor,
            mut events,
        } = self;
        tokio::pin!(shutdown);

        info!("relay listening on {local_addr}");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                accepted = listener.accept() => {
                    acceptor.admit_batch(&mut registry, &audit, &listener, accepted);
                }
                Some(event) = events.recv() => {
                    dispatch(&mut registry, &audit, event);
                }
            }
        }

        let closed = registry.close_all();
        info!(sessions = closed.len(), "relay stopped");
    }

    /// Runs the relay until Ctrl-C.
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install Ctrl-C handler; running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
