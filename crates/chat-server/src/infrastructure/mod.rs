//! Infrastructure layer for the relay server.
//!
//! Contains OS-facing adapters: TCP sockets, the audit log file, and the
//! configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and `chat_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod audit_file;
pub mod network;
pub mod storage;
