//! Error types for the Redis storage backend.
//!
//! This module maps [`redis::RedisError`] onto the generic
//! [`StorageError`](warden_storage::StorageError) variants so callers never
//! see a driver-specific error.

use redis::{ErrorKind, RedisError};
use thiserror::Error;
use warden_storage::{ConfigError, StorageError};

/// Result type alias for Redis backend construction.
pub type Result<T> = std::result::Result<T, RedisStorageError>;

/// Errors raised while constructing or talking to the Redis backend.
#[derive(Debug, Error)]
pub enum RedisStorageError {
    /// Error from the Redis driver.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting took longer than the configured timeout.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

impl From<RedisStorageError> for StorageError {
    fn from(err: RedisStorageError) -> Self {
        match err {
            RedisStorageError::Redis(source) => redis_error_to_storage_error(source),
            RedisStorageError::Config(source) => {
                StorageError::internal_with_source("invalid Redis configuration", source)
            },
            RedisStorageError::ConnectTimeout(_) => StorageError::timeout(),
        }
    }
}

/// Converts a driver error to a storage error.
///
/// Anything that indicates the server could not be reached maps to a
/// transient variant; reply-shape problems map to `Serialization`.
pub(crate) fn redis_error_to_storage_error(err: RedisError) -> StorageError {
    if err.is_timeout() {
        return StorageError::timeout();
    }

    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return StorageError::connection_with_source("Redis connection failed", err);
    }

    match err.kind() {
        ErrorKind::TypeError => {
            StorageError::serialization_with_source("unexpected Redis reply type", err)
        },
        ErrorKind::AuthenticationFailed => {
            StorageError::connection_with_source("Redis authentication failed", err)
        },
        ErrorKind::BusyLoadingError | ErrorKind::TryAgain | ErrorKind::ClusterDown => {
            StorageError::connection_with_source("Redis temporarily unavailable", err)
        },
        _ => StorageError::internal_with_source("Redis command failed", err),
    }
}
