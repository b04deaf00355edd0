//! Fetch configuration.
//!
//! Everything the data layer needs to know about its environment lives in
//! an explicit `FetchConfig` passed down from the caller: the cache root,
//! the cache TTL, and the retry schedule. Nothing here is ambient state.
//! An optional TOML file (`coindex.toml`) can override the defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Retry schedule for transient HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Ceiling on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Configuration for the fetch and cache layers.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Root directory for cached provider payloads.
    pub cache_root: PathBuf,
    /// How long a cached payload stays fresh.
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
}

impl FetchConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            retry: RetryPolicy::default(),
        }
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = Self::new(file.cache_root.unwrap_or_else(|| "data/cache".into()));
        if let Some(hours) = file.cache_ttl_hours {
            config.cache_ttl = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(retry) = file.retry {
            if let Some(attempts) = retry.max_attempts {
                if attempts == 0 {
                    return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
                }
                config.retry.max_attempts = attempts;
            }
            if let Some(ms) = retry.base_delay_ms {
                config.retry.base_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = retry.max_delay_ms {
                config.retry.max_delay = Duration::from_millis(ms);
            }
            if config.retry.max_delay < config.retry.base_delay {
                return Err(ConfigError::Invalid(
                    "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
                ));
            }
        }
        Ok(config)
    }
}

/// Errors from loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {detail}")]
    Io { path: PathBuf, detail: String },

    #[error("failed to parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Raw TOML shape; converted into `FetchConfig` with defaults filled in.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    cache_root: Option<PathBuf>,
    cache_ttl_hours: Option<u64>,
    retry: Option<RetryFile>,
}

#[derive(Debug, Deserialize)]
struct RetryFile {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = FetchConfig::new("data/cache");
        assert_eq!(config.cache_root, PathBuf::from("data/cache"));
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn toml_overrides_everything() {
        let toml_str = r#"
cache_root = "/tmp/px"
cache_ttl_hours = 6

[retry]
max_attempts = 3
base_delay_ms = 250
max_delay_ms = 2000
"#;
        let config = FetchConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/px"));
        assert_eq!(config.cache_ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_millis(2000));
    }

    #[test]
    fn toml_partial_keeps_defaults() {
        let config = FetchConfig::from_toml("cache_ttl_hours = 1\n").unwrap();
        assert_eq!(config.cache_root, PathBuf::from("data/cache"));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let result = FetchConfig::from_toml("[retry]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn inverted_delays_rejected() {
        let result =
            FetchConfig::from_toml("[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 100\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn garbage_toml_is_a_parse_error() {
        let result = FetchConfig::from_toml("cache_root = [not toml");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
