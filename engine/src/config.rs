//! Client configuration.
//!
//! Every field has a default matching the public service, so an empty JSON
//! object (or no file at all) is a valid configuration. Frontends layer their
//! own flags on top of whatever `ClientConfig::load` returns.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::MAX_FILE_SIZE;

/// Top-level client settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the processing service, e.g. `http://localhost:5000`
    pub server_url: String,

    /// Files above this many bytes are rejected before upload
    pub max_file_size: u64,

    pub retry: RetryPolicy,

    pub progress: ProgressConfig,

    /// Pause between consecutive segment downloads
    pub download_stagger_ms: u64,

    /// Per-request timeout; `None` leaves large uploads unbounded
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: "http://localhost:5000".to_string(),
            max_file_size: MAX_FILE_SIZE,
            retry: RetryPolicy::default(),
            progress: ProgressConfig::default(),
            download_stagger_ms: 500,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check fields serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.server_url).map_err(|e| ConfigError::InvalidServerUrl {
            url: self.server_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub fn download_stagger(&self) -> Duration {
        Duration::from_millis(self.download_stagger_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Exponential backoff for retryable upload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each one after
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based): `initial * 2^(n-1)`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(1u64 << exponent))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Settings for the progress reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Run the client-side placeholder progression while uploading
    pub synthetic: bool,

    /// Interval between synthetic ticks
    pub tick_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        ProgressConfig {
            synthetic: true,
            tick_ms: 500,
        }
    }
}

impl ProgressConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_retry_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_before(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(
            file,
            r#"{{"server_url": "http://splitter.local:8080", "retry": {{"max_retries": 1}}}}"#
        )
        .expect("Failed to write config");

        let config = ClientConfig::load(file.path()).expect("Failed to load config");
        assert_eq!(config.server_url, "http://splitter.local:8080");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.max_file_size, MAX_FILE_SIZE);
        assert!(config.progress.synthetic);
    }

    #[test]
    fn test_load_rejects_bad_url() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(file, r#"{{"server_url": "not a url"}}"#).expect("Failed to write config");

        let result = ClientConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidServerUrl { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = ClientConfig::load(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
