//! Storage infrastructure: on-disk configuration.

pub mod config;
