//! Acceptor: turns pending TCP connections into registered sessions.
//!
//! The relay loop waits on `listener.accept()`.  When one connection is
//! ready, [`Acceptor::admit_batch`] admits it and then drains up to
//! `accept_batch - 1` more that are *already* pending, without waiting.
//! That keeps a burst of connects from starving traffic on existing
//! sessions, and a quiet listener never delays event handling.
//!
//! Every admitted connection starts out named `"Unknown"` until it sends a
//! `Register` message.

use std::net::SocketAddr;

use chat_core::protocol::messages::UNKNOWN_USER;
use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::audit::AuditTrail;
use crate::application::dispatch::{SessionError, SessionEvent};
use crate::application::session_registry::{SessionId, SessionIdAllocator, SessionRegistry};
use crate::infrastructure::network::connection::{spawn_connection, ConnectionSettings};

/// Admits connections and wires them to the relay loop's event queue.
#[derive(Debug)]
pub struct Acceptor {
    ids: SessionIdAllocator,
    settings: ConnectionSettings,
    accept_batch: usize,
    events: mpsc::Sender<SessionEvent>,
}

impl Acceptor {
    pub fn new(
        settings: ConnectionSettings,
        accept_batch: usize,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            ids: SessionIdAllocator::new(),
            settings,
            accept_batch: accept_batch.max(1),
            events,
        }
    }

    /// Handles the connection `first` and then whatever else is pending on
    /// `listener`, up to the batch limit.  Returns how many were admitted.
    pub fn admit_batch(
        &self,
        registry: &mut SessionRegistry,
        audit: &AuditTrail,
        listener: &TcpListener,
        first: std::io::Result<(TcpStream, SocketAddr)>,
    ) -> usize {
        let mut admitted = usize::from(self.handle_accept_result(registry, audit, first).is_ok());

        for _ in 1..self.accept_batch {
            match listener.accept().now_or_never() {
                Some(result) => {
                    if self.handle_accept_result(registry, audit, result).is_ok() {
                        admitted += 1;
                    }
                }
                None => break,
            }
        }

        if admitted > 1 {
            debug!(admitted, "admitted a batch of connections");
        }
        admitted
    }

    /// Admits one accepted connection, or logs why accepting failed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AcceptFailure`] when `result` is an error.  It
    /// has already been logged; the listener stays usable.
    pub fn handle_accept_result(
        &self,
        registry: &mut SessionRegistry,
        audit: &AuditTrail,
        result: std::io::Result<(TcpStream, SocketAddr)>,
    ) -> Result<SessionId, SessionError> {
        match result {
            Ok((stream, peer)) => Ok(self.admit(registry, audit, stream, peer)),
            Err(e) => {
                audit.record_failure(&format!("Error accepting clients: {e}"));
                Err(SessionError::AcceptFailure(e))
            }
        }
    }

    fn admit(
        &self,
        registry: &mut SessionRegistry,
        audit: &AuditTrail,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> SessionId {
        let id = self.ids.next();
        let link = spawn_connection(id, stream, self.settings, self.events.clone());
        registry.insert(id, peer, UNKNOWN_USER, link);
        audit.record(&format!("Client connected: {peer}"));
        debug!(session = %id, %peer, "session registered");
        id
    }
}
