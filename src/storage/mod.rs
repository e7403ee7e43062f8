//! Storage module for configuration.

pub mod config;

pub use config::{AntSettings, AppConfig, ConfigError, PairingEntry, PairingTable};
