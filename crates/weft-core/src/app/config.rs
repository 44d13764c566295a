//! Manager configuration, typically parsed from JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{RetryPolicy, TimeoutPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
}

/// Defaults applied to every task that does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of tasks running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout in milliseconds, per attempt or in total depending on
    /// `timeout_policy`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    /// Upper bound on waiting for dependencies. Unbounded when absent.
    #[serde(default)]
    pub dependency_timeout_ms: Option<u64>,
    /// Trailing window for the throughput metric, in seconds.
    #[serde(default = "default_throughput_window")]
    pub throughput_window_secs: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_throughput_window() -> u64 {
    60
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
            timeout_policy: TimeoutPolicy::default(),
            dependency_timeout_ms: None,
            throughput_window_secs: default_throughput_window(),
        }
    }
}

impl ManagerConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn dependency_timeout(&self) -> Option<Duration> {
        self.dependency_timeout_ms.map(Duration::from_millis)
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ManagerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.dependency_timeout(), None);
    }

    #[test]
    fn fields_override_defaults() {
        let config = ManagerConfig::from_json_str(
            r#"{
                "max_concurrency": 8,
                "timeout_policy": "total",
                "retry": { "max_attempts": 5 },
                "dependency_timeout_ms": 1500
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.timeout_policy, TimeoutPolicy::Total);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(config.dependency_timeout(), Some(Duration::from_millis(1500)));
    }

    #[rstest]
    #[case::zero_concurrency(r#"{"max_concurrency": 0}"#)]
    #[case::zero_attempts(r#"{"retry": {"max_attempts": 0}}"#)]
    #[case::malformed("{not json")]
    fn invalid_documents_are_rejected(#[case] json: &str) {
        assert!(ManagerConfig::from_json_str(json).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ManagerConfig::from_path("/nonexistent/weft.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/weft.json"));
    }
}
