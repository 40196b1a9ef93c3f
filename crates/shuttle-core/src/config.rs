//! Config - 設定値とデフォルト
//!
//! すべてのフィールドにデフォルトがあるので、設定ファイルなしでも動く。
//! JSON で部分的に上書きできる（`#[serde(default)]`）。
//!
//! ```json
//! {
//!   "listener": { "reply_channel": "orders-replies" },
//!   "dispatcher": { "request_timeout_ms": 5000 },
//!   "retry": { "max_attempts": 5, "wait_ms": 200, "backoff": { "type": "exponential", "multiplier": 2.0 } }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuttleConfig {
    pub listener: ListenerConfig,
    pub dispatcher: DispatcherConfig,
    pub retry: RetryConfig,
}

impl ShuttleConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        self.dispatcher.validate()?;
        self.retry.validate()
    }
}

/// Response listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// The single channel this instance consumes replies from.
    pub reply_channel: String,
    /// Upper bound for one poll; also bounds how long a stop request waits.
    pub poll_timeout_ms: u64,
    /// Fixed delay after a failed poll or commit.
    pub error_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reply_channel: "response-topic".to_string(),
            poll_timeout_ms: 100,
            error_backoff_ms: 1_000,
        }
    }
}

impl ListenerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reply_channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "listener.reply_channel must not be blank".into(),
            ));
        }
        non_zero("listener.poll_timeout_ms", self.poll_timeout_ms)?;
        non_zero("listener.error_backoff_ms", self.error_backoff_ms)
    }
}

/// Request dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Default deadline for callers that do not pass one.
    pub request_timeout_ms: u64,
    /// How long shutdown waits for timer tasks before cancelling them.
    pub shutdown_grace_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl DispatcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        non_zero("dispatcher.request_timeout_ms", self.request_timeout_ms)
    }
}

/// Wait strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential { multiplier: f64 },
}

/// Retry decorator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Fixed wait, or the first wait for exponential backoff.
    pub wait_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_ms: 2_000,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if let Backoff::Exponential { multiplier } = self.backoff {
            if !(multiplier.is_finite() && multiplier >= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "retry.backoff.multiplier must be >= 1.0, got {multiplier}"
                )));
            }
        }
        Ok(())
    }
}

fn non_zero(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ShuttleConfig::default();
        assert_eq!(config.listener.reply_channel, "response-topic");
        assert_eq!(config.listener.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.listener.error_backoff(), Duration::from_secs(1));
        assert_eq!(config.dispatcher.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatcher.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.wait(), Duration::from_secs(2));
        assert_eq!(config.retry.backoff, Backoff::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = ShuttleConfig::from_json_str(
            r#"{
                "listener": { "reply_channel": "orders-replies" },
                "retry": { "max_attempts": 5, "backoff": { "type": "exponential", "multiplier": 2.0 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.listener.reply_channel, "orders-replies");
        assert_eq!(config.listener.poll_timeout_ms, 100);
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.wait_ms, 2_000);
        assert_eq!(config.retry.backoff, Backoff::Exponential { multiplier: 2.0 });
    }

    #[rstest]
    #[case::blank_channel(r#"{"listener":{"reply_channel":"  "}}"#, "reply_channel")]
    #[case::zero_poll(r#"{"listener":{"poll_timeout_ms":0}}"#, "poll_timeout_ms")]
    #[case::zero_timeout(r#"{"dispatcher":{"request_timeout_ms":0}}"#, "request_timeout_ms")]
    #[case::zero_attempts(r#"{"retry":{"max_attempts":0}}"#, "max_attempts")]
    #[case::shrinking_backoff(
        r#"{"retry":{"backoff":{"type":"exponential","multiplier":0.5}}}"#,
        "multiplier"
    )]
    fn invalid_values_are_rejected(#[case] json: &str, #[case] field: &str) {
        let err = ShuttleConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains(field), "{err}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ShuttleConfig::from_json_str("{ listener: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = ShuttleConfig::from_path("/nonexistent/shuttle.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/shuttle.json"));
    }
}
