//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the contract every backing
//! key-value store (in-memory, Redis, ...) implements for the cache layer.
//!
//! # Design Philosophy
//!
//! The trait provides a minimal key-value interface:
//! - **Keys are strings, values are bytes**: No assumptions about serialization format
//! - **Async by default**: All operations are async for non-blocking I/O
//! - **Every write carries a TTL**: Nothing written through this trait lives forever
//! - **Atomic primitives only**: set-if-absent and compare-and-delete are single backend commands,
//!   which is all a distributed lock needs
//!
//! Namespacing, key validation, serialization and compression live in the
//! cache layer built on top of this trait, not in the backends.
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait
//! 2. Map backend-specific errors to [`StorageError`](crate::StorageError)
//! 3. Make [`set_if_absent`](StorageBackend::set_if_absent) and
//!    [`compare_and_delete`](StorageBackend::compare_and_delete) atomic on the server side
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::BackendInfo};

/// Abstract backing store for key-value operations with expiry.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. The trait is object safe; consumers hold it as
/// `Arc<dyn StorageBackend>`.
///
/// # Key Operations
///
/// | Method | Backend command |
/// |--------|-----------------|
/// | [`get`](StorageBackend::get) | `GET` |
/// | [`get_many`](StorageBackend::get_many) | `MGET` |
/// | [`set_with_ttl`](StorageBackend::set_with_ttl) | `SET .. PX` |
/// | [`set_many_with_ttl`](StorageBackend::set_many_with_ttl) | atomic pipeline of `SET .. PX` |
/// | [`set_if_absent`](StorageBackend::set_if_absent) | `SET .. NX PX` |
/// | [`delete`](StorageBackend::delete) | `DEL` |
/// | [`compare_and_delete`](StorageBackend::compare_and_delete) | server-side script |
/// | [`exists`](StorageBackend::exists) | `EXISTS` |
/// | [`expire`](StorageBackend::expire) | `PEXPIRE` |
/// | [`scan`](StorageBackend::scan) | `SCAN .. MATCH` |
/// | [`ping`](StorageBackend::ping) | `PING` |
/// | [`info`](StorageBackend::info) | `INFO` |
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use warden_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set_with_ttl("key", b"value".to_vec(), Duration::from_secs(60)).await.unwrap();
/// let value = backend.get("key").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("value")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Retrieves several values at once.
    ///
    /// The result is position-aligned with `keys`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<Bytes>>>;

    /// Stores a key-value pair that expires after `ttl`.
    ///
    /// Overwrites any existing value and replaces its expiry.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Stores several key-value pairs, all expiring after `ttl`, as one atomic unit.
    ///
    /// Either every entry is written or, on error, the caller must assume any
    /// subset may have been written.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_many_with_ttl(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> StorageResult<()>;

    /// Stores `value` under `key` only if the key is absent (or expired).
    ///
    /// The value and its expiry are written in one atomic step, so there is no
    /// window in which the key exists without a TTL.
    ///
    /// Returns `Ok(true)` if the value was written, `Ok(false)` if the key was
    /// already present.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<bool>;

    /// Deletes keys, returning how many existed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, keys: &[String]) -> StorageResult<u64>;

    /// Atomically deletes `key` only if its current value equals `expected`.
    ///
    /// The comparison is an exact, length-sensitive byte equality check.
    /// Returns `Ok(true)` if the key was deleted, `Ok(false)` if it was absent
    /// or held a different value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StorageResult<bool>;

    /// Returns whether a live (unexpired) key exists.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Resets the expiry of an existing key.
    ///
    /// Returns `Ok(false)` if the key does not exist.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool>;

    /// Returns every live key matching a glob `pattern`
    /// (`*`, `?`, `[...]` classes, `\` escapes), as Redis `SCAN MATCH` does.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn scan(&self, pattern: &str) -> StorageResult<Vec<String>>;

    /// Liveness probe.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn ping(&self) -> StorageResult<()>;

    /// Reports memory and connection figures.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn info(&self) -> StorageResult<BackendInfo>;

    /// Releases the connection. Subsequent operations fail with
    /// [`StorageError::Closed`](crate::StorageError::Closed).
    async fn close(&self) -> StorageResult<()>;
}
