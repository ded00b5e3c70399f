//! Storage infrastructure: the relay's TOML configuration file.
//!
//! The `config` sub-module reads the file from an explicit path or from the
//! platform config directory and supplies defaults for everything missing.

pub mod config;
