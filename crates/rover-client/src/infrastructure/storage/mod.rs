//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from an explicit
//! path or the platform-appropriate directory, writes it back, and supplies
//! defaults when no file exists yet (first run).

pub mod config;

pub use config::{load_config, load_config_from, save_config, save_config_to, ClientConfig, ConfigError};
