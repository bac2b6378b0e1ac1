//! Tracing/logging initialization.
//!
//! One `fmt` subscriber per process, filtered by an `EnvFilter`. The first
//! successful initialization wins; later calls return without touching the
//! installed subscriber.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human readable, multi-line.
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `escr_infra=debug,info`.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// Filter from `RUST_LOG` when set, `info` otherwise.
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| default_filter()),
            format: LogFormat::Json,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, ObservabilityError> {
        EnvFilter::try_new(&self.filter).map_err(|e| ObservabilityError::InvalidFilter {
            filter: self.filter.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ObservabilityError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// Initialize tracing/logging for the process from the environment.
///
/// Safe to call multiple times (subsequent calls are no-ops). An unparsable
/// `RUST_LOG` falls back to `info`.
pub fn init() {
    let config = LogConfig::from_env();
    if init_with(&config).is_err() {
        let _ = init_with(&LogConfig::default());
    }
}

/// Install a subscriber for `config`. Only an invalid filter is an error.
pub fn init_with(config: &LogConfig) -> Result<(), ObservabilityError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);
    // Already initialized elsewhere: keep that subscriber.
    let _ = match config.format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_json_at_info() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn format_is_read_in_lowercase() {
        let config: LogConfig = serde_json::from_str(r#"{ "filter": "escr_infra=debug", "format": "pretty" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_filters_are_rejected_before_installing_anything() {
        let config = LogConfig {
            filter: "escr_infra=notalevel".to_string(),
            format: LogFormat::Json,
        };
        assert!(matches!(
            init_with(&config),
            Err(ObservabilityError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn initializing_twice_is_harmless() {
        init();
        init_with(&LogConfig::default().pretty()).unwrap();
    }
}
