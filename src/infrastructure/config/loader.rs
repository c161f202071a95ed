use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::WatchlistConfig;

/// Project directory holding config, watchlist and database.
pub const CONFIG_DIR: &str = ".equiwatch";

/// Lowest accepted `rate_limit.requests_per_second`.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid rate limit: {0}. Must be at least 0.001")]
    InvalidRateLimit(f64),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid max_concurrent_triggers: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Unknown reasoning provider: {0}. Must be one of: anthropic, mock, scripted")]
    UnknownProvider(String),

    #[error("Failed to read watchlist {path}: {source}")]
    WatchlistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse watchlist: {0}")]
    WatchlistParse(String),

    #[error("Invalid watchlist: {0}")]
    InvalidWatchlist(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .equiwatch/config.yaml (project config, created by init)
    /// 3. .equiwatch/local.yaml (local overrides, optional)
    /// 4. Environment variables (EQUIWATCH_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with the project directory given.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("EQUIWATCH_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.rate_limit.requests_per_second < MIN_REQUESTS_PER_SECOND
            || !config.rate_limit.requests_per_second.is_finite()
        {
            return Err(ConfigError::InvalidRateLimit(config.rate_limit.requests_per_second));
        }
        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        let pipeline = &config.pipeline;
        if pipeline.max_concurrent_triggers == 0 || pipeline.max_concurrent_triggers > 64 {
            return Err(ConfigError::InvalidConcurrency(pipeline.max_concurrent_triggers));
        }
        if pipeline.batch_size == 0 {
            return Err(ConfigError::ValidationFailed("pipeline.batch_size must be at least 1".to_string()));
        }
        if pipeline.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "pipeline.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        if config.gate.max_input_chars == 0 || config.gate.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "gate.max_input_chars and gate.timeout_secs must be at least 1".to_string(),
            ));
        }

        let provider = config.llm.provider.trim().to_lowercase();
        if !["anthropic", "mock", "scripted"].contains(&provider.as_str()) {
            return Err(ConfigError::UnknownProvider(config.llm.provider.clone()));
        }
        if config.llm.timeout_secs == 0 || config.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm.timeout_secs and llm.max_tokens must be at least 1".to_string(),
            ));
        }

        if config.enrichment.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed("enrichment.timeout_secs must be at least 1".to_string()));
        }

        if let Some(url) = &config.delivery.slack_webhook_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::ValidationFailed(format!(
                    "delivery.slack_webhook_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if config.delivery.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed("delivery.timeout_secs must be at least 1".to_string()));
        }

        if config.watchlist_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("watchlist_path cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Read, normalize and validate the watchlist file.
    pub fn load_watchlist(path: impl AsRef<Path>) -> Result<WatchlistConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::WatchlistRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_watchlist(&raw)
    }

    pub fn parse_watchlist(yaml: &str) -> Result<WatchlistConfig, ConfigError> {
        let watchlist: WatchlistConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::WatchlistParse(e.to_string()))?;
        let watchlist = watchlist.normalized();
        Self::validate_watchlist(&watchlist)?;
        Ok(watchlist)
    }

    pub fn validate_watchlist(watchlist: &WatchlistConfig) -> Result<(), ConfigError> {
        if watchlist.sectors.is_empty() {
            return Err(ConfigError::InvalidWatchlist("at least one sector is required".to_string()));
        }
        if watchlist.companies.is_empty() {
            return Err(ConfigError::InvalidWatchlist("at least one company is required".to_string()));
        }
        if let Some(sector) = watchlist.sectors.iter().find(|s| s.name.is_empty()) {
            return Err(ConfigError::InvalidWatchlist(format!("sector with keywords {:?} has no name", sector.keywords)));
        }
        if let Some(sector) = watchlist.sectors.iter().find(|s| s.keywords.is_empty()) {
            return Err(ConfigError::InvalidWatchlist(format!("sector '{}' has no keywords", sector.name)));
        }
        if let Some(company) = watchlist.companies.iter().find(|c| c.symbol.is_empty() || c.name.is_empty()) {
            return Err(ConfigError::InvalidWatchlist(format!(
                "company '{}' needs both a symbol and a name",
                if company.symbol.is_empty() { &company.name } else { &company.symbol }
            )));
        }
        let duplicates = watchlist.duplicate_symbols();
        if !duplicates.is_empty() {
            return Err(ConfigError::InvalidWatchlist(format!("duplicate symbols: {}", duplicates.join(", "))));
        }
        Ok(())
    }
}
