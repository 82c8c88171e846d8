//! Application layer of the relay.
//!
//! Everything here is plain data manipulation: no sockets, no files.  The
//! infrastructure layer feeds in [`dispatch::SessionEvent`]s and supplies an
//! [`audit::AuditSink`]; the code here decides what happens.
//!
//! # Sub-modules
//!
//! - **`session_registry`** – Who is connected, under which display name, and
//!   how to reach them.  Owned by exactly one coordinating loop.
//!
//! - **`dispatch`** – Routes each decoded message by kind: registrations
//!   rename a session and announce the join, chat lines are attributed and
//!   relayed, unknown kinds are logged.  Also resolves closed and failed
//!   sessions.
//!
//! - **`broadcast`** – Sends one encoded frame to a chosen subset of
//!   sessions, evicting any recipient whose delivery fails.
//!
//! - **`audit`** – The append-only, human-readable audit log seam.

pub mod audit;
pub mod broadcast;
pub mod dispatch;
pub mod session_registry;
