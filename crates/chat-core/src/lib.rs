//! # chat-core
//!
//! Shared library for the chat relay containing the wire protocol: message
//! kinds, the binary codec, and the stream framing buffer.
//!
//! This crate is used by both the server and the console client.
//! It has zero dependencies on OS APIs, terminals, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! The relay is a single server that many clients connect to over TCP.  A
//! client registers a display name, then sends chat lines; the server relays
//! each line to every other connected client and announces new users with
//! system messages.
//!
//! This crate (`chat-core`) is the shared foundation.  It defines:
//!
//! - **`protocol::messages`** – The message kinds that may appear on the
//!   wire (`Register`, `Chat`, `System`) and the typed [`ChatMessage`].
//!
//! - **`protocol::codec`** – How a message becomes bytes and back: a
//!   little-endian `i32` kind followed by length-prefixed UTF-8 strings.
//!
//! - **`protocol::framing`** – TCP delivers a byte *stream*, not messages.
//!   [`FrameBuffer`] accumulates received bytes and hands out complete
//!   messages one at a time.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `chat_core::ChatMessage` instead of `chat_core::protocol::messages::ChatMessage`.
pub use protocol::codec::{decode_message, encode_message, FrameDefect, ProtocolError};
pub use protocol::framing::FrameBuffer;
pub use protocol::messages::{ChatMessage, MessageKind};
