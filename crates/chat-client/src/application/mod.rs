//! Application layer for the chat client.

pub mod console;
