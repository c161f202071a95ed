use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::models::config::LoggingConfig;

/// Resolved logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Console format
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to the console)
    pub log_dir: Option<PathBuf>,

    /// Log to stderr as well as any file
    pub enable_console: bool,

    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}

impl LogConfig {
    /// Resolve the string settings from the loaded configuration.
    pub fn from_settings(settings: &LoggingConfig) -> Result<Self> {
        let format = match settings.format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => bail!("Invalid log format: {other}"),
        };
        let rotation = match settings.rotation.to_lowercase().as_str() {
            "daily" => RotationPolicy::Daily,
            "hourly" => RotationPolicy::Hourly,
            "never" => RotationPolicy::Never,
            other => bail!("Invalid log rotation: {other}"),
        };
        Ok(Self {
            level: settings.level.clone(),
            format,
            log_dir: settings.log_dir.as_ref().map(PathBuf::from),
            enable_console: true,
            rotation,
        })
    }

    /// Quieter settings for table-printing commands.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.level = "warn".to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = LoggingConfig {
            level: "debug".to_string(),
            format: "Pretty".to_string(),
            log_dir: Some("/tmp/equiwatch-logs".to_string()),
            rotation: "hourly".to_string(),
        };
        let config = LogConfig::from_settings(&settings).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.rotation, RotationPolicy::Hourly);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/equiwatch-logs")));
        assert_eq!(config.quiet().level, "warn");
    }

    #[test]
    fn test_from_settings_rejects_unknown_format() {
        let settings = LoggingConfig { format: "xml".to_string(), ..LoggingConfig::default() };
        assert!(LogConfig::from_settings(&settings).is_err());
    }
}
