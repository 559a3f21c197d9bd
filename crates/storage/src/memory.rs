//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] suitable for testing, development, and single-process
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **TTL support**: Expired keys are invisible immediately and reclaimed by a background task
//! - **Atomic primitives**: set-if-absent and compare-and-delete run under a single write lock
//! - **Glob scans**: [`scan`](StorageBackend::scan) uses the same matching rules as Redis
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use warden_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set_with_ttl("greeting", b"hello".to_vec(), Duration::from_secs(5)).await.unwrap();
//!     let value = backend.get("greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Not shared across processes, so locks taken here only exclude tasks of the same process
//! - Expiry uses [`tokio::time::Instant`], so paused-clock tests control it
//! - `used_memory_bytes` in [`info`](StorageBackend::info) is an estimate (key + value lengths)

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;
use tokio::{
    select,
    sync::watch,
    time::{Instant, sleep},
};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    pattern::KeyGlob,
    types::BackendInfo,
};

/// Interval between sweeps of expired keys.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Sending is a best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// A stored value and the instant it stops being visible.
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory storage backend.
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store.
///
/// # Shutdown
///
/// The background TTL cleanup task stops automatically when all clones of
/// the `MemoryBackend` are dropped, or when [`close`](StorageBackend::close)
/// is called.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
    closed: Arc<AtomicBool>,
    /// Shared ownership of the shutdown sender. When the last clone drops
    /// the sender is dropped, which closes the watch channel and signals the
    /// cleanup task to exit.
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryBackend {
    /// Creates a new in-memory storage backend.
    ///
    /// This also spawns a background task that periodically removes expired
    /// keys, so it must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        let data = Arc::clone(&backend.data);
        tokio::spawn(async move {
            cleanup_expired_keys(data, shutdown_rx).await;
        });

        backend
    }

    /// Number of keys physically held, including expired keys not yet swept.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.data.read().len()
    }

    /// Remaining time to live of a key, or `None` if it is absent or expired.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.data
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<Bytes> {
        self.data.read().get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value.clone())
    }
}

/// Background task to clean up expired keys.
///
/// Owns only the data map, not the shutdown guard, so dropping the last
/// backend handle closes the channel and ends the loop.
async fn cleanup_expired_keys(
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(CLEANUP_INTERVAL) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let now = Instant::now();
        data.write().retain(|_, entry| entry.is_live(now));
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.data.read().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        fail_point!("memory-get", |_| Err(StorageError::connection("injected memory-get failure")));
        self.ensure_open()?;
        Ok(self.live_value(key, Instant::now()))
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<Bytes>>> {
        fail_point!("memory-get", |_| Err(StorageError::connection("injected memory-get failure")));
        self.ensure_open()?;
        let now = Instant::now();
        let data = self.data.read();
        Ok(keys
            .iter()
            .map(|key| data.get(key).filter(|entry| entry.is_live(now)).map(|e| e.value.clone()))
            .collect())
    }

    #[tracing::instrument(skip(self, value), fields(value_len = value.len()))]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        fail_point!("memory-set", |_| Err(StorageError::connection("injected memory-set failure")));
        self.ensure_open()?;
        let expires_at = Instant::now() + ttl;
        self.data.write().insert(key.to_owned(), Entry { value: Bytes::from(value), expires_at });
        Ok(())
    }

    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    async fn set_many_with_ttl(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> StorageResult<()> {
        fail_point!("memory-set", |_| Err(StorageError::connection("injected memory-set failure")));
        self.ensure_open()?;
        let expires_at = Instant::now() + ttl;
        // Single critical section: readers observe all entries or none.
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, Entry { value: Bytes::from(value), expires_at });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<bool> {
        fail_point!("memory-set", |_| Err(StorageError::connection("injected memory-set failure")));
        self.ensure_open()?;
        let now = Instant::now();
        let mut data = self.data.write();
        if data.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        data.insert(key.to_owned(), Entry { value: Bytes::from(value), expires_at: now + ttl });
        Ok(true)
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        fail_point!("memory-delete", |_| {
            Err(StorageError::connection("injected memory-delete failure"))
        });
        self.ensure_open()?;
        let now = Instant::now();
        let mut data = self.data.write();
        let mut removed = 0u64;
        for key in keys {
            if data.remove(key).is_some_and(|entry| entry.is_live(now)) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self, expected))]
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StorageResult<bool> {
        fail_point!("memory-delete", |_| {
            Err(StorageError::connection("injected memory-delete failure"))
        });
        self.ensure_open()?;
        let now = Instant::now();
        let mut data = self.data.write();
        let matches =
            data.get(key).is_some_and(|entry| entry.is_live(now) && entry.value[..] == *expected);
        if matches {
            data.remove(key);
        }
        Ok(matches)
    }

    #[tracing::instrument(skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        fail_point!("memory-get", |_| Err(StorageError::connection("injected memory-get failure")));
        self.ensure_open()?;
        Ok(self.live_value(key, Instant::now()).is_some())
    }

    #[tracing::instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        fail_point!("memory-set", |_| Err(StorageError::connection("injected memory-set failure")));
        self.ensure_open()?;
        let now = Instant::now();
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn scan(&self, pattern: &str) -> StorageResult<Vec<String>> {
        fail_point!("memory-scan", |_| {
            Err(StorageError::connection("injected memory-scan failure"))
        });
        self.ensure_open()?;
        let glob = KeyGlob::new(pattern)?;
        let now = Instant::now();
        let data = self.data.read();
        Ok(data
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob.is_match(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn ping(&self) -> StorageResult<()> {
        fail_point!("memory-ping", |_| Err(StorageError::connection("injected memory-ping failure")));
        self.ensure_open()?;
        // Acquiring the read lock verifies we're not deadlocked.
        let _unused = self.data.read();
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn info(&self) -> StorageResult<BackendInfo> {
        self.ensure_open()?;
        let now = Instant::now();
        let data = self.data.read();
        let (key_count, used_memory_bytes) = data
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .fold((0u64, 0u64), |(count, bytes), (key, entry)| {
                (count + 1, bytes + (key.len() + entry.value.len()) as u64)
            });
        Ok(BackendInfo { used_memory_bytes, connected_clients: 1, key_count })
    }

    #[tracing::instrument(skip(self))]
    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        let _ = self.shutdown_guard.shutdown_tx.send(());
        Ok(())
    }
}
