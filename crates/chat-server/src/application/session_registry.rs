//! Session registry: the relay's in-memory table of connected peers.
//!
//! Every admitted connection is a *session*.  The registry maps each
//! [`SessionId`] to the session's display name, its peer address, and the
//! [`SessionLink`] used to reach it.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! accept ──► insert(name = "Unknown") ──► update_name(..) on Register ──► remove
//!                                            (may repeat; last wins)      (close, error,
//!                                                                          failed send)
//! ```
//!
//! # Single writer
//!
//! The registry is a plain struct with `&mut self` mutators and no lock.
//! Exactly one coordinating loop owns it and passes it by reference into the
//! dispatch and broadcast routines, so mutation can never race with
//! iteration.  Routines that send while iterating take a [`snapshot`] first
//! and look each entry up again before use, because sending may evict.
//!
//! # Liveness
//!
//! Dropping a [`SessionLink`] closes the transport: the outbox sender goes
//! away and both connection tasks are aborted.  The writer is aborted too,
//! not just left to drain, because a peer that stopped reading parks it in
//! `write_all` where it would never notice the closed outbox.  Removing an
//! entry therefore closes its connection, which keeps "present in the
//! registry" and "transport open" the same fact.
//!
//! [`snapshot`]: SessionRegistry::snapshot

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_core::protocol::messages::UNKNOWN_USER;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// One encoded frame, shared between all recipients of a broadcast.
pub type Frame = Arc<[u8]>;

/// Opaque identity of one connection.
///
/// Ids are never reused within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing [`SessionId`]s, starting at 1.
#[derive(Debug)]
pub struct SessionIdAllocator {
    inner: AtomicU64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> SessionId {
        SessionId(self.inner.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a frame could not be handed to a session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The writer side of the connection has already gone away.
    #[error("connection writer has stopped")]
    Closed,
    /// The peer is not draining its outbox fast enough.
    #[error("outbox is full; peer is not reading")]
    Full,
    /// No session with that id is registered.
    #[error("session is not registered")]
    UnknownSession,
}

/// The registry's handle on a live transport.
pub struct SessionLink {
    outbox: mpsc::Sender<Frame>,
    tasks: Vec<AbortHandle>,
}

impl SessionLink {
    /// A link whose only resource is the outbox.
    pub fn new(outbox: mpsc::Sender<Frame>) -> Self {
        Self {
            outbox,
            tasks: Vec::new(),
        }
    }

    /// A link that also aborts the connection's reader and writer tasks when
    /// dropped.
    pub fn with_tasks(outbox: mpsc::Sender<Frame>, reader: AbortHandle, writer: AbortHandle) -> Self {
        Self {
            outbox,
            tasks: vec![reader, writer],
        }
    }

    fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.outbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl Drop for SessionLink {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLink")
            .field("outbox_closed", &self.outbox.is_closed())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[derive(Debug)]
struct SessionEntry {
    name: String,
    peer: SocketAddr,
    link: SessionLink,
}

/// What remains of a session after it has been removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedSession {
    pub id: SessionId,
    pub name: String,
    pub peer: SocketAddr,
}

/// In-memory registry of all live sessions.
///
/// A `HashMap<SessionId, _>` gives O(1) lookup; [`snapshot`] sorts by id so
/// iteration order is stable (admission order).
///
/// [`snapshot`]: SessionRegistry::snapshot
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly admitted session.
    ///
    /// An existing entry with the same id is replaced (and its link dropped).
    pub fn insert(&mut self, id: SessionId, peer: SocketAddr, name: impl Into<String>, link: SessionLink) {
        self.sessions.insert(
            id,
            SessionEntry {
                name: name.into(),
                peer,
                link,
            },
        );
    }

    /// Returns the display name for `id`, or the `"Unknown"` sentinel if the
    /// session is not registered.
    pub fn lookup(&self, id: SessionId) -> &str {
        self.sessions
            .get(&id)
            .map_or(UNKNOWN_USER, |entry| entry.name.as_str())
    }

    /// Returns the peer address for `id`.
    pub fn peer(&self, id: SessionId) -> Option<SocketAddr> {
        self.sessions.get(&id).map(|entry| entry.peer)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Overwrites the display name.  Returns `false` if `id` is not registered.
    pub fn update_name(&mut self, id: SessionId, name: impl Into<String>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(entry) => {
                entry.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Removes a session and closes its transport.
    pub fn remove(&mut self, id: SessionId) -> Option<RemovedSession> {
        self.sessions.remove(&id).map(|entry| RemovedSession {
            id,
            name: entry.name,
            peer: entry.peer,
        })
    }

    /// Returns an ordered copy of the current `(id, name)` pairs.
    ///
    /// Callers iterate the copy, so removals made while iterating cannot
    /// disturb the iteration.
    pub fn snapshot(&self) -> Vec<(SessionId, String)> {
        let mut pairs: Vec<_> = self
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs
    }

    /// Queues `frame` on the session's outbox without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the session is unknown, its writer has
    /// stopped, or its outbox is full.
    pub fn send(&self, id: SessionId, frame: Frame) -> Result<(), DeliveryError> {
        self.sessions
            .get(&id)
            .ok_or(DeliveryError::UnknownSession)?
            .link
            .try_deliver(frame)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session, closing all transports.  Returns what was removed.
    pub fn close_all(&mut self) -> Vec<RemovedSession> {
        let ids: Vec<SessionId> = self.snapshot().into_iter().map(|(id, _)| id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}
