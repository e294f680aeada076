use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::{AppError, ErrorKind, DEFAULT_BASE_URL, DEFAULT_FIELDS, QUERY_DEBOUNCE, REFRESH_TIMEOUT};

pub const MAX_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// What the detail screen shows when the requested code has no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCountryPolicy {
    /// Empty detail, no error banner.
    #[default]
    Placeholder,
    /// Error banner with the fixed "cannot load" message.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub base_url: String,
    pub fields: String,
    pub request_timeout_ms: u64,
    pub query_debounce_ms: u64,
    /// `None` keeps the cache in memory.
    pub database_path: Option<PathBuf>,
    pub missing_country_policy: MissingCountryPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            fields: DEFAULT_FIELDS.to_string(),
            request_timeout_ms: u64::try_from(REFRESH_TIMEOUT.as_millis()).unwrap_or(30_000),
            query_debounce_ms: u64::try_from(QUERY_DEBOUNCE.as_millis()).unwrap_or(250),
            database_path: None,
            missing_country_policy: MissingCountryPolicy::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url cannot be empty".into()));
        }
        if !self.base_url.ends_with('/') {
            return Err(ConfigError::Invalid("base_url must end with '/'".into()));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "request_timeout_ms must be within 1..={MAX_TIMEOUT_MS}"
            )));
        }
        if self.query_debounce_ms == 0 {
            return Err(ConfigError::Invalid("query_debounce_ms must be > 0".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn query_debounce(&self) -> Duration {
        Duration::from_millis(self.query_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query_debounce(), Duration::from_millis(250));
        assert_eq!(config.missing_country_policy, MissingCountryPolicy::Placeholder);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = CoreConfig::from_json(r#"{"query_debounce_ms": 100}"#).unwrap();
        assert_eq!(config.query_debounce_ms, 100);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn policy_parses_snake_case() {
        let config = CoreConfig::from_json(r#"{"missing_country_policy": "error"}"#).unwrap();
        assert_eq!(config.missing_country_policy, MissingCountryPolicy::Error);
    }

    #[test]
    fn rejects_zero_debounce() {
        let config = CoreConfig {
            query_debounce_ms: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let config = CoreConfig {
            request_timeout_ms: MAX_TIMEOUT_MS + 1,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_base_url_without_trailing_slash() {
        let config = CoreConfig {
            base_url: "https://restcountries.com".into(),
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            CoreConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
