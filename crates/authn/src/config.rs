//! Configuration for the guards and the HTTP verifier.
//!
//! All durations deserialize from humantime strings (`"300s"`, `"5m"`).

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use warden_storage::ConfigError;

/// Default lifetime of a cached verified subject.
pub const DEFAULT_TOKEN_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default upper bound on one call to the verification service.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a cached "is owner" verdict.
pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(300);

/// Default lifetime of a cached "not owner" verdict.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(60);

fn min_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value < Duration::from_millis(1) {
        return Err(ConfigError::BelowMinimum {
            field,
            value: format!("{value:?}"),
            min: "1ms".into(),
        });
    }
    Ok(())
}

/// Configuration for [`TokenAuthorizationGuard`](crate::TokenAuthorizationGuard).
///
/// # Validation
///
/// - `cache_ttl` and `upstream_timeout` must be >= 1 ms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenGuardConfig {
    /// Lifetime of a cached subject. Shortened further when the verification
    /// service reports an earlier expiry.
    #[serde(with = "humantime_serde", default = "default_token_cache_ttl")]
    cache_ttl: Duration,

    /// Upper bound on one verification call; exceeding it is reported as
    /// service unavailable.
    #[serde(with = "humantime_serde", default = "default_upstream_timeout")]
    upstream_timeout: Duration,
}

fn default_token_cache_ttl() -> Duration {
    DEFAULT_TOKEN_CACHE_TTL
}

fn default_upstream_timeout() -> Duration {
    DEFAULT_UPSTREAM_TIMEOUT
}

impl Default for TokenGuardConfig {
    fn default() -> Self {
        Self { cache_ttl: DEFAULT_TOKEN_CACHE_TTL, upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT }
    }
}

#[bon::bon]
impl TokenGuardConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either duration is shorter than 1 ms.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_TOKEN_CACHE_TTL)] cache_ttl: Duration,
        #[builder(default = DEFAULT_UPSTREAM_TIMEOUT)] upstream_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_ttl, upstream_timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks the rules enforced by the builder.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        min_duration("cache_ttl", self.cache_ttl)?;
        min_duration("upstream_timeout", self.upstream_timeout)
    }

    /// Returns the subject cache TTL.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Returns the verification call timeout.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }
}

/// Configuration for [`ResourceOwnershipGuard`](crate::ResourceOwnershipGuard).
///
/// # Validation
///
/// - both TTLs must be >= 1 ms
/// - `negative_ttl` must be shorter than `positive_ttl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnershipGuardConfig {
    /// Lifetime of a cached positive verdict.
    #[serde(with = "humantime_serde", default = "default_positive_ttl")]
    positive_ttl: Duration,

    /// Lifetime of a cached negative verdict.
    #[serde(with = "humantime_serde", default = "default_negative_ttl")]
    negative_ttl: Duration,
}

fn default_positive_ttl() -> Duration {
    DEFAULT_POSITIVE_TTL
}

fn default_negative_ttl() -> Duration {
    DEFAULT_NEGATIVE_TTL
}

impl Default for OwnershipGuardConfig {
    fn default() -> Self {
        Self { positive_ttl: DEFAULT_POSITIVE_TTL, negative_ttl: DEFAULT_NEGATIVE_TTL }
    }
}

#[bon::bon]
impl OwnershipGuardConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a rule listed on [`OwnershipGuardConfig`]
    /// is violated.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_POSITIVE_TTL)] positive_ttl: Duration,
        #[builder(default = DEFAULT_NEGATIVE_TTL)] negative_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { positive_ttl, negative_ttl };
        config.validate()?;
        Ok(config)
    }

    /// Checks the rules enforced by the builder.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        min_duration("positive_ttl", self.positive_ttl)?;
        min_duration("negative_ttl", self.negative_ttl)?;
        if self.negative_ttl >= self.positive_ttl {
            return Err(ConfigError::AboveMaximum {
                field: "negative_ttl",
                value: format!("{:?}", self.negative_ttl),
                max: format!("less than positive_ttl ({:?})", self.positive_ttl),
            });
        }
        Ok(())
    }

    /// Returns the positive verdict TTL.
    #[must_use]
    pub fn positive_ttl(&self) -> Duration {
        self.positive_ttl
    }

    /// Returns the negative verdict TTL.
    #[must_use]
    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }
}

/// Configuration for [`HttpCredentialVerifier`](crate::HttpCredentialVerifier).
///
/// # Validation
///
/// - `endpoint` must be an absolute `http` or `https` URL
/// - `timeout` must be >= 1 ms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpVerifierConfig {
    /// URL the verification request is POSTed to.
    endpoint: String,

    /// Per-request timeout applied by the HTTP client.
    #[serde(with = "humantime_serde", default = "default_upstream_timeout")]
    timeout: Duration,
}

#[bon::bon]
impl HttpVerifierConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a rule listed on [`HttpVerifierConfig`] is
    /// violated.
    #[builder]
    pub fn new(
        #[builder(into)] endpoint: String,
        #[builder(default = DEFAULT_UPSTREAM_TIMEOUT)] timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { endpoint, timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks the rules enforced by the builder.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        min_duration("timeout", self.timeout)
    }

    /// Parses the endpoint.
    pub(crate) fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::Invalid { field: "endpoint", reason: e.to_string() })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    /// Returns the verification endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
