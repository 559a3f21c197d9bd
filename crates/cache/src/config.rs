//! Configuration for [`CacheStore`](crate::CacheStore) and
//! [`DistributedLock`](crate::DistributedLock).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_storage::ConfigError;

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "warden";

/// Default payload size, in bytes, from which `Compress::Auto` compresses.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Default TTL for entries written without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default lock TTL (300 000 ms).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_millis(300_000);

/// Longest accepted namespace.
const MAX_NAMESPACE_LEN: usize = 64;

/// Cache configuration.
///
/// # Validation
///
/// - `namespace` must be 1..=64 characters from `[A-Za-z0-9_.-]` (no `:`, which
///   separates the namespace from the key)
/// - `compression_threshold` must be >= 1
/// - `default_ttl` and `lock_ttl` must be >= 1 ms
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use warden_cache::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .namespace("billing")
///     .lock_ttl(Duration::from_secs(30))
///     .build()?;
/// assert_eq!(config.namespace(), "billing");
/// assert_eq!(config.compression_threshold(), 1024);
/// # Ok::<(), warden_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Prefix prepended to every key as `{namespace}:`.
    #[serde(default = "default_namespace")]
    namespace: String,

    /// Serialized size from which payloads are gzip-compressed.
    #[serde(default = "default_compression_threshold")]
    compression_threshold: usize,

    /// TTL used by callers that have no TTL of their own.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    default_ttl: Duration,

    /// TTL of a lock acquired without an explicit TTL.
    #[serde(with = "humantime_serde", default = "default_lock_ttl")]
    lock_ttl: Duration,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_compression_threshold() -> usize {
    DEFAULT_COMPRESSION_THRESHOLD
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_lock_ttl() -> Duration {
    DEFAULT_LOCK_TTL
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            default_ttl: DEFAULT_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

#[bon::bon]
impl CacheConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any field violates the rules listed on
    /// [`CacheConfig`].
    #[builder]
    pub fn new(
        #[builder(into, default = default_namespace())] namespace: String,
        #[builder(default = DEFAULT_COMPRESSION_THRESHOLD)] compression_threshold: usize,
        #[builder(default = DEFAULT_TTL)] default_ttl: Duration,
        #[builder(default = DEFAULT_LOCK_TTL)] lock_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { namespace, compression_threshold, default_ttl, lock_ttl };
        config.validate()?;
        Ok(config)
    }

    /// Checks the rules enforced by the builder; deserialized configs should
    /// be validated before use.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".into(),
            });
        }
        if self.namespace.len() > MAX_NAMESPACE_LEN {
            return Err(ConfigError::AboveMaximum {
                field: "namespace",
                value: self.namespace.len().to_string(),
                max: MAX_NAMESPACE_LEN.to_string(),
            });
        }
        if !self.namespace.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "only ASCII letters, digits, '_', '.' and '-' are allowed".into(),
            });
        }
        if self.compression_threshold == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "compression_threshold",
                value: "0".into(),
                min: "1".into(),
            });
        }
        for (field, ttl) in [("default_ttl", self.default_ttl), ("lock_ttl", self.lock_ttl)] {
            if ttl < Duration::from_millis(1) {
                return Err(ConfigError::BelowMinimum {
                    field,
                    value: format!("{ttl:?}"),
                    min: "1ms".into(),
                });
            }
        }
        Ok(())
    }

    /// Returns the key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the compression threshold in bytes.
    #[must_use]
    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    /// Returns the default entry TTL.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the default lock TTL.
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }
}
