//! Network infrastructure for the relay server.
//!
//! # Sub-modules
//!
//! - **`relay_server`** – Binds the listener and runs the coordinating loop
//!   that owns the session registry.
//!
//! - **`acceptor`** – Admits pending connections in bounded batches and turns
//!   each into a registered session.
//!
//! - **`connection`** – The per-connection reader and writer tasks that move
//!   bytes between the socket and the relay loop.

pub mod acceptor;
pub mod connection;
pub mod relay_server;

pub use relay_server::{NetworkError, RelayServer};
