//! Configuration for the Redis storage backend.
//!
//! This module provides [`RedisBackendConfig`], which determines where the
//! backend connects and how it walks the keyspace during scans.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_storage::ConfigError;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-command timeout (2 seconds).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default `COUNT` hint passed to `SCAN`.
const DEFAULT_SCAN_COUNT: u32 = 100;

/// Configuration for [`RedisBackend`](crate::RedisBackend).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use warden_storage_redis::RedisBackendConfig;
///
/// let config = RedisBackendConfig::builder()
///     .url("redis://localhost:6379/0")
///     .connect_timeout(Duration::from_secs(2))
///     .build()?;
/// assert_eq!(config.scan_count(), 100);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisBackendConfig {
    /// Connection URL, e.g. `redis://host:6379/0` or `rediss://` for TLS.
    pub(crate) url: String,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Per-command timeout.
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub(crate) command_timeout: Duration,

    /// `COUNT` hint for each `SCAN` iteration.
    #[serde(default = "default_scan_count")]
    pub(crate) scan_count: u32,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_scan_count() -> u32 {
    DEFAULT_SCAN_COUNT
}

#[bon::bon]
impl RedisBackendConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URL does not use the `redis://`, `rediss://` or `unix://` scheme
    /// - A timeout is zero
    /// - `scan_count` is zero
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_COMMAND_TIMEOUT)] command_timeout: Duration,
        #[builder(default = DEFAULT_SCAN_COUNT)] scan_count: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { url, connect_timeout, command_timeout, scan_count };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// Deserialized configs bypass the builder, so the backend calls this
    /// again before connecting.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const SCHEMES: [&str; 3] = ["redis://", "rediss://", "unix://"];
        if !SCHEMES.iter().any(|scheme| self.url.starts_with(scheme)) {
            return Err(ConfigError::Invalid {
                field: "url",
                reason: "expected a redis://, rediss:// or unix:// URL".into(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "connect_timeout",
                value: "0s".into(),
                min: "1ms".into(),
            });
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "command_timeout",
                value: "0s".into(),
                min: "1ms".into(),
            });
        }
        if self.scan_count == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "scan_count",
                value: "0".into(),
                min: "1".into(),
            });
        }
        Ok(())
    }

    /// Returns the connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the per-command timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Returns the `SCAN` count hint.
    #[must_use]
    pub fn scan_count(&self) -> u32 {
        self.scan_count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedisBackendConfig::builder().url("redis://localhost:6379").build().unwrap();

        assert_eq!(config.url(), "redis://localhost:6379");
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.scan_count(), DEFAULT_SCAN_COUNT);
    }

    #[rstest]
    #[case("redis://localhost")]
    #[case("rediss://cache.internal:6380/2")]
    #[case("unix:///var/run/redis.sock")]
    fn test_accepted_schemes(#[case] url: &str) {
        assert!(RedisBackendConfig::builder().url(url).build().is_ok());
    }

    #[rstest]
    #[case("http://localhost:6379")]
    #[case("localhost:6379")]
    #[case("")]
    fn test_rejected_urls(#[case] url: &str) {
        let err = RedisBackendConfig::builder().url(url).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "url", .. }));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let err = RedisBackendConfig::builder()
            .url("redis://localhost")
            .connect_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "connect_timeout", .. }));

        let err = RedisBackendConfig::builder()
            .url("redis://localhost")
            .command_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "command_timeout", .. }));
    }

    #[test]
    fn test_zero_scan_count_rejected() {
        let err =
            RedisBackendConfig::builder().url("redis://localhost").scan_count(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "scan_count", .. }));
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = r#"{ "url": "redis://localhost:6379", "connect_timeout": "250ms" }"#;
        let config: RedisBackendConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
        assert_eq!(config.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.scan_count(), DEFAULT_SCAN_COUNT);
    }

    #[test]
    fn test_deserialization_rejects_unknown_fields() {
        let json = r#"{ "url": "redis://localhost:6379", "pool_size": 8 }"#;
        assert!(serde_json::from_str::<RedisBackendConfig>(json).is_err());
    }
}
