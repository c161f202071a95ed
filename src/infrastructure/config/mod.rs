//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration and watchlist validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR};
