//! Operation statistics for [`CacheStore`](crate::CacheStore).
//!
//! All counters use `Ordering::Relaxed`: each is independent and monotonic,
//! and a snapshot taken while operations are in flight may be off by the
//! operations in progress.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use warden_storage::BackendInfo;

/// Lock-free operation counters.
#[derive(Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    operations: AtomicU64,
    latency_us: AtomicU64,
    started: Mutex<Instant>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Creates zeroed counters; ops/sec is measured from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Records a read that found a usable value.
    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Records a read that found nothing usable.
    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Records `count` entries written by one operation.
    pub fn record_sets(&self, count: u64, elapsed: Duration) {
        self.sets.fetch_add(count, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Records `count` entries removed by one operation.
    pub fn record_deletes(&self, count: u64, elapsed: Duration) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Records an operation that is neither a read, a write nor a delete.
    pub fn record_other(&self, elapsed: Duration) {
        self.record_latency(elapsed);
    }

    /// Records a failed operation (backend error or undecodable payload).
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes all counters and restarts the ops/sec window.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.errors,
            &self.operations,
            &self.latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.started.lock() = Instant::now();
    }

    /// Builds a snapshot, attaching backend figures when available.
    #[must_use]
    pub fn snapshot(&self, backend: Option<BackendInfo>) -> CacheStats {
        let operations = self.operations.load(Ordering::Relaxed);
        let latency_us = self.latency_us.load(Ordering::Relaxed);
        let elapsed = self.started.lock().elapsed().as_secs_f64();
        let backend = backend.unwrap_or_default();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            operations,
            avg_latency_ms: if operations == 0 {
                0.0
            } else {
                latency_us as f64 / operations as f64 / 1000.0
            },
            ops_per_sec: if elapsed > 0.0 { operations as f64 / elapsed } else { 0.0 },
            used_memory_bytes: backend.used_memory_bytes,
            connected_clients: backend.connected_clients,
            key_count: backend.key_count,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that returned nothing (absent, invalid key, undecodable, or failed).
    pub misses: u64,
    /// Entries written.
    pub sets: u64,
    /// Entries removed.
    pub deletes: u64,
    /// Failed backend operations and undecodable payloads.
    pub errors: u64,
    /// Operations that reached the backend.
    pub operations: u64,
    /// Mean backend round-trip latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Operations per second since construction or the last reset.
    pub ops_per_sec: f64,
    /// Backend memory use; zero when the backend could not be queried.
    pub used_memory_bytes: u64,
    /// Backend client connections; zero when the backend could not be queried.
    pub connected_clients: u64,
    /// Keys held by the backend; zero when the backend could not be queried.
    pub key_count: u64,
}

impl CacheStats {
    /// Returns the hit rate (0.0 - 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_average_latency() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(Duration::from_millis(2));
        metrics.record_miss(Duration::from_millis(4));
        metrics.record_sets(3, Duration::from_millis(6));
        metrics.record_error();

        let stats = metrics.snapshot(None);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.operations, 3);
        assert!((stats.avg_latency_ms - 4.0).abs() < f64::EPSILON);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let stats = CacheMetrics::new().snapshot(None);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.hit_rate(), 0.0);
        assert!(!stats.ops_per_sec.is_nan());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ops_per_sec_over_window() {
        let metrics = CacheMetrics::new();
        for _ in 0..20 {
            metrics.record_other(Duration::from_micros(10));
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let stats = metrics.snapshot(None);
        assert!((stats.ops_per_sec - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_backend_figures_attached() {
        let info = BackendInfo { used_memory_bytes: 2048, connected_clients: 3, key_count: 9 };
        let stats = CacheMetrics::new().snapshot(Some(info));
        assert_eq!(stats.used_memory_bytes, 2048);
        assert_eq!(stats.connected_clients, 3);
        assert_eq!(stats.key_count, 9);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.record_deletes(5, Duration::from_millis(1));
        metrics.reset();
        assert_eq!(metrics.snapshot(None), CacheStats::default());
    }
}
