//! Infrastructure layer for the chat client.
//!
//! **Dependency rule**: this layer may depend on `application` and `chat_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod network;
