//! chat-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does chat-client do? (for beginners)
//!
//! The client is the user-facing end of the relay:
//!
//! 1. Connects to the server over TCP.
//! 2. Sends a `Register` message carrying the user's display name.
//! 3. Prints every message the server relays (other users' chat lines and
//!    server announcements such as joins).
//! 4. Sends each line typed on stdin as a `Chat` message.
//!
//! The server never echoes a user's own lines back, so the client prints
//! them locally as `You: ...`.

/// Application layer: how input and output lines look on the console.
pub mod application;

/// Infrastructure layer: the TCP connection to the relay.
pub mod infrastructure;

pub use infrastructure::network::{ChatClient, ClientError, MessageReader, MessageWriter};
