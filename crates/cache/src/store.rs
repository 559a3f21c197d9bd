//! The namespaced, fail-open cache store.

use std::{sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use warden_storage::{StorageBackend, StorageResult};

use crate::{
    codec::{self, Compress},
    config::CacheConfig,
    key::{CacheKey, KeyPattern},
    stats::{CacheMetrics, CacheStats},
};

/// Per-write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Compression choice for this write.
    pub compress: Compress,
}

impl SetOptions {
    /// Options that never compress.
    #[must_use]
    pub fn uncompressed() -> Self {
        Self { compress: Compress::Never }
    }
}

/// Typed cache over a [`StorageBackend`].
///
/// Every key is validated and namespaced as `{namespace}:{key}`; values are
/// JSON, gzip-compressed from the configured threshold.
///
/// # Failure Policy
///
/// No method returns an error. Backend failures are logged and counted, and
/// the operation reports the "nothing happened" outcome: a miss, `false`, `0`
/// or an empty list. Callers that need to tell "absent" from "unavailable"
/// must not rely on the cache for that decision.
///
/// # Lifecycle
///
/// The store owns its backend handle. Call [`init`](Self::init) once at
/// startup and [`disconnect`](Self::disconnect) at shutdown; share the store
/// itself through an [`Arc`].
///
/// # Example
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use warden_cache::{CacheConfig, CacheKey, CacheStore};
/// use warden_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
/// store.init().await;
///
/// let key = CacheKey::scoped("greeting", "en");
/// assert!(store.set(&key, &"hello", Duration::from_secs(60)).await);
/// assert_eq!(store.get::<String>(&key).await.as_deref(), Some("hello"));
/// # });
/// ```
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.config.namespace())
            .field("compression_threshold", &self.config.compression_threshold())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Creates a store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, config: CacheConfig) -> Self {
        Self { backend, config, metrics: CacheMetrics::new() }
    }

    /// Probes the backend once. A failed probe is logged, not fatal: the
    /// store keeps failing open until the backend comes back.
    #[tracing::instrument(skip(self), fields(namespace = %self.config.namespace()))]
    pub async fn init(&self) {
        match self.backend.ping().await {
            Ok(()) => tracing::info!("cache backend reachable"),
            Err(e) => tracing::warn!(error = %e, "cache backend unreachable at startup, continuing"),
        }
    }

    /// Releases the backend connection. Close errors are logged and dropped.
    #[tracing::instrument(skip(self), fields(namespace = %self.config.namespace()))]
    pub async fn disconnect(&self) {
        match self.backend.close().await {
            Ok(()) => tracing::info!("cache backend disconnected"),
            Err(e) => tracing::warn!(error = %e, "error while closing cache backend"),
        }
    }

    /// The key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.config.namespace()
    }

    /// The configuration the store was built with.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Zeroes the operation counters.
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Validates `key` and prefixes the namespace, or logs why it can't.
    fn full_key(&self, key: &CacheKey) -> Option<String> {
        match key.validate() {
            Ok(()) => Some(format!("{}:{}", self.config.namespace(), key.as_str())),
            Err(e) => {
                tracing::warn!(%key, error = %e, "rejected invalid cache key");
                None
            },
        }
    }

    /// Strips the namespace from a backend key.
    fn local_key(&self, full: &str) -> Option<String> {
        full.strip_prefix(self.config.namespace())
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::to_owned)
    }

    fn decode_or_miss<T: DeserializeOwned>(&self, key: &CacheKey, payload: &[u8]) -> Option<T> {
        match codec::decode(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(%key, error = %e, "discarding undecodable cache entry");
                None
            },
        }
    }

    /// Reads and decodes a value.
    ///
    /// Returns `None` for an absent key, an invalid key (the backend is not
    /// contacted), an undecodable payload, or a backend failure.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let full = self.full_key(key)?;
        let start = Instant::now();
        let result = self.backend.get(&full).await;
        let elapsed = start.elapsed();

        let payload = match result {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.metrics.record_miss(elapsed);
                tracing::debug!("cache miss");
                return None;
            },
            Err(e) => {
                self.metrics.record_error();
                self.metrics.record_miss(elapsed);
                tracing::warn!(error = %e, "cache read failed, treating as miss");
                return None;
            },
        };

        match self.decode_or_miss(key, &payload) {
            Some(value) => {
                self.metrics.record_hit(elapsed);
                tracing::debug!("cache hit");
                Some(value)
            },
            None => {
                self.metrics.record_miss(elapsed);
                None
            },
        }
    }

    /// Writes `value` with `ttl`, compressing per the configured threshold.
    ///
    /// Equivalent to [`set_with_options`](Self::set_with_options) with default options.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) -> bool {
        self.set_with_options(key, value, ttl, SetOptions::default()).await
    }

    /// Writes `value` with `ttl`.
    ///
    /// Returns `false` without writing when the key is invalid, the TTL is
    /// zero, or the value cannot be serialized; returns `false` after a
    /// backend failure.
    #[tracing::instrument(skip(self, value), fields(key = %key, ttl_ms = ttl.as_millis()))]
    pub async fn set_with_options<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        options: SetOptions,
    ) -> bool {
        let Some(full) = self.full_key(key) else {
            return false;
        };
        if ttl.is_zero() {
            tracing::warn!("refusing cache write with zero TTL");
            return false;
        }
        let encoded =
            match codec::encode(value, self.config.compression_threshold(), options.compress) {
                Ok(encoded) => encoded,
                Err(e) => {
                    self.metrics.record_error();
                    tracing::warn!(error = %e, "cache value not serializable");
                    return false;
                },
            };

        let size = encoded.bytes.len();
        let start = Instant::now();
        match self.backend.set_with_ttl(&full, encoded.bytes, ttl).await {
            Ok(()) => {
                self.metrics.record_sets(1, start.elapsed());
                tracing::debug!(size, compressed = encoded.compressed, "cache entry written");
                true
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache write failed");
                false
            },
        }
    }

    /// Deletes keys, returning how many existed.
    ///
    /// Invalid keys are skipped. No backend call is made when no valid key
    /// remains.
    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn del(&self, keys: &[CacheKey]) -> u64 {
        let full: Vec<String> = keys.iter().filter_map(|key| self.full_key(key)).collect();
        self.delete_full(&full).await
    }

    /// Deletes one key, returning whether it existed.
    pub async fn del_one(&self, key: &CacheKey) -> bool {
        self.del(std::slice::from_ref(key)).await > 0
    }

    async fn delete_full(&self, full: &[String]) -> u64 {
        if full.is_empty() {
            return 0;
        }
        let start = Instant::now();
        match self.backend.delete(full).await {
            Ok(removed) => {
                self.metrics.record_deletes(removed, start.elapsed());
                removed
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache delete failed");
                0
            },
        }
    }

    /// Reads several values in one round trip.
    ///
    /// The result is position-aligned with `keys`. Invalid keys yield `None`
    /// and are not sent; a backend failure yields all `None`.
    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[CacheKey]) -> Vec<Option<T>> {
        let mut results: Vec<Option<T>> = keys.iter().map(|_| None).collect();

        let (positions, full): (Vec<usize>, Vec<String>) = keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| self.full_key(key).map(|full| (i, full)))
            .unzip();
        if full.is_empty() {
            return results;
        }

        let start = Instant::now();
        let payloads = match self.backend.get_many(&full).await {
            Ok(payloads) => payloads,
            Err(e) => {
                self.metrics.record_error();
                self.metrics.record_miss(start.elapsed());
                tracing::warn!(error = %e, "cache batch read failed, treating as misses");
                return results;
            },
        };
        let elapsed = start.elapsed();

        let mut hits = 0usize;
        for (position, payload) in positions.into_iter().zip(payloads) {
            if let Some(payload) = payload {
                results[position] = self.decode_or_miss(&keys[position], &payload);
                hits += usize::from(results[position].is_some());
            }
        }
        // One round trip counts once, as a hit if anything was found.
        if hits > 0 {
            self.metrics.record_hit(elapsed);
        } else {
            self.metrics.record_miss(elapsed);
        }
        tracing::debug!(hits, "cache batch read");
        results
    }

    /// Writes several entries with one TTL as a single atomic batch.
    ///
    /// If any key is invalid or any value fails to serialize, nothing is
    /// written and `false` is returned.
    #[tracing::instrument(skip(self, entries), fields(count = entries.len(), ttl_ms = ttl.as_millis()))]
    pub async fn mset<T: Serialize>(&self, entries: &[(CacheKey, T)], ttl: Duration) -> bool {
        if entries.is_empty() {
            return true;
        }
        if ttl.is_zero() {
            tracing::warn!("refusing cache batch write with zero TTL");
            return false;
        }

        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(full) = self.full_key(key) else {
                return false;
            };
            match codec::encode(value, self.config.compression_threshold(), Compress::Auto) {
                Ok(encoded) => batch.push((full, encoded.bytes)),
                Err(e) => {
                    self.metrics.record_error();
                    tracing::warn!(%key, error = %e, "cache value not serializable, batch aborted");
                    return false;
                },
            }
        }

        let count = batch.len() as u64;
        let start = Instant::now();
        match self.backend.set_many_with_ttl(batch, ttl).await {
            Ok(()) => {
                self.metrics.record_sets(count, start.elapsed());
                true
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache batch write failed");
                false
            },
        }
    }

    /// Returns whether `key` holds a live entry; `false` on failure.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn exists(&self, key: &CacheKey) -> bool {
        let Some(full) = self.full_key(key) else {
            return false;
        };
        let start = Instant::now();
        match self.backend.exists(&full).await {
            Ok(exists) => {
                self.metrics.record_other(start.elapsed());
                exists
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache existence check failed");
                false
            },
        }
    }

    /// Resets the TTL of an existing entry; `false` if absent or on failure.
    #[tracing::instrument(skip(self), fields(key = %key, ttl_ms = ttl.as_millis()))]
    pub async fn expire(&self, key: &CacheKey, ttl: Duration) -> bool {
        let Some(full) = self.full_key(key) else {
            return false;
        };
        let start = Instant::now();
        match self.backend.expire(&full, ttl).await {
            Ok(updated) => {
                self.metrics.record_other(start.elapsed());
                updated
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache expire failed");
                false
            },
        }
    }

    /// Lists keys matching `pattern`, without the namespace.
    ///
    /// Scans the whole keyspace; meant for invalidation and maintenance, not
    /// request paths. Returns an empty list on failure.
    #[tracing::instrument(skip(self), fields(pattern = %pattern))]
    pub async fn keys(&self, pattern: &KeyPattern) -> Vec<String> {
        if let Err(e) = pattern.validate() {
            tracing::warn!(error = %e, "rejected invalid cache key pattern");
            return Vec::new();
        }
        let glob = format!("{}:{}", self.config.namespace(), pattern.as_glob());
        let start = Instant::now();
        match self.backend.scan(&glob).await {
            Ok(found) => {
                self.metrics.record_other(start.elapsed());
                found.iter().filter_map(|full| self.local_key(full)).collect()
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "cache scan failed");
                Vec::new()
            },
        }
    }

    /// Deletes every key matching `pattern`, returning how many were removed.
    #[tracing::instrument(skip(self), fields(pattern = %pattern))]
    pub async fn delete_by_pattern(&self, pattern: &KeyPattern) -> u64 {
        let full: Vec<String> = self
            .keys(pattern)
            .await
            .into_iter()
            .map(|local| format!("{}:{local}", self.config.namespace()))
            .collect();
        let removed = self.delete_full(&full).await;
        tracing::debug!(removed, "pattern invalidation");
        removed
    }

    /// Returns operation counters plus backend figures; the backend figures
    /// are zero if the backend cannot be queried.
    #[tracing::instrument(skip(self))]
    pub async fn stats(&self) -> CacheStats {
        let info = match self.backend.info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(error = %e, "cache backend info unavailable");
                None
            },
        };
        self.metrics.snapshot(info)
    }

    /// Pings the backend. Never errors.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cache health check failed");
                false
            },
        }
    }

    /// Atomically writes raw `value` if `key` is absent.
    ///
    /// Unlike the public operations this surfaces backend errors, so the lock
    /// can log them with its own context. An invalid key is `Ok(false)`.
    pub(crate) async fn set_if_absent_raw(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<bool> {
        let Some(full) = self.full_key(key) else {
            return Ok(false);
        };
        let start = Instant::now();
        let result = self.backend.set_if_absent(&full, value, ttl).await;
        match &result {
            Ok(true) => self.metrics.record_sets(1, start.elapsed()),
            Ok(false) => self.metrics.record_other(start.elapsed()),
            Err(_) => self.metrics.record_error(),
        }
        result
    }

    /// Atomically deletes `key` if it holds exactly `expected`.
    pub(crate) async fn compare_and_delete_raw(
        &self,
        key: &CacheKey,
        expected: &[u8],
    ) -> StorageResult<bool> {
        let Some(full) = self.full_key(key) else {
            return Ok(false);
        };
        let start = Instant::now();
        let result = self.backend.compare_and_delete(&full, expected).await;
        match &result {
            Ok(true) => self.metrics.record_deletes(1, start.elapsed()),
            Ok(false) => self.metrics.record_other(start.elapsed()),
            Err(_) => self.metrics.record_error(),
        }
        result
    }
}
