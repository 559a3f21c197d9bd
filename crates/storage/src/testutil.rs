//! Shared test utilities for code built on the storage traits.
//!
//! This module provides fault-injecting and call-recording wrappers around the
//! in-memory implementations, plus assertion macros. It is feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! warden-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use warden_storage::testutil::{FlakyBackend, RecordingOwnershipStore};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    ownership::{MemoryOwnershipStore, OwnershipFilter, OwnershipRecordStore, ResourceRecord},
    types::BackendInfo,
};

/// Which class of backend operations a [`FlakyBackend`] should fail.
#[derive(Debug, Default)]
struct FailureSwitches {
    reads: AtomicBool,
    writes: AtomicBool,
    deletes: AtomicBool,
    scans: AtomicBool,
    probes: AtomicBool,
}

/// A [`MemoryBackend`] wrapper whose operations can be switched to fail with
/// a connection error, and which counts every call it receives.
///
/// Operation classes:
///
/// | Class | Operations |
/// |-------|-----------|
/// | reads | `get`, `get_many`, `exists` |
/// | writes | `set_with_ttl`, `set_many_with_ttl`, `set_if_absent`, `expire` |
/// | deletes | `delete`, `compare_and_delete` |
/// | scans | `scan` |
/// | probes | `ping`, `info` |
#[derive(Clone)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    switches: Arc<FailureSwitches>,
    calls: Arc<AtomicU64>,
}

impl FlakyBackend {
    /// Creates a healthy backend.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(MemoryBackend::new())
    }

    /// Wraps an existing in-memory backend.
    #[must_use]
    pub fn wrap(inner: MemoryBackend) -> Self {
        Self { inner, switches: Arc::default(), calls: Arc::default() }
    }

    /// The wrapped backend, for inspecting state behind the fault layer.
    #[must_use]
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Makes read operations fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.switches.reads.store(fail, Ordering::SeqCst);
    }

    /// Makes write operations fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.switches.writes.store(fail, Ordering::SeqCst);
    }

    /// Makes delete operations fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        self.switches.deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes scans fail (or succeed again).
    pub fn fail_scans(&self, fail: bool) {
        self.switches.scans.store(fail, Ordering::SeqCst);
    }

    /// Makes `ping` and `info` fail (or succeed again).
    pub fn fail_probes(&self, fail: bool) {
        self.switches.probes.store(fail, Ordering::SeqCst);
    }

    /// Makes every operation fail (or succeed again).
    pub fn fail_all(&self, fail: bool) {
        self.fail_reads(fail);
        self.fail_writes(fail);
        self.fail_deletes(fail);
        self.fail_scans(fail);
        self.fail_probes(fail);
    }

    /// Number of calls received, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, switch: &AtomicBool, op: &str) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if switch.load(Ordering::SeqCst) {
            return Err(StorageError::connection(format!("injected {op} failure")));
        }
        Ok(())
    }
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.check(&self.switches.reads, "get")?;
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<Bytes>>> {
        self.check(&self.switches.reads, "get_many")?;
        self.inner.get_many(keys).await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.check(&self.switches.writes, "set")?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn set_many_with_ttl(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> StorageResult<()> {
        self.check(&self.switches.writes, "set_many")?;
        self.inner.set_many_with_ttl(entries, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<bool> {
        self.check(&self.switches.writes, "set_if_absent")?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        self.check(&self.switches.deletes, "delete")?;
        self.inner.delete(keys).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StorageResult<bool> {
        self.check(&self.switches.deletes, "compare_and_delete")?;
        self.inner.compare_and_delete(key, expected).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check(&self.switches.reads, "exists")?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        self.check(&self.switches.writes, "expire")?;
        self.inner.expire(key, ttl).await
    }

    async fn scan(&self, pattern: &str) -> StorageResult<Vec<String>> {
        self.check(&self.switches.scans, "scan")?;
        self.inner.scan(pattern).await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.check(&self.switches.probes, "ping")?;
        self.inner.ping().await
    }

    async fn info(&self) -> StorageResult<BackendInfo> {
        self.check(&self.switches.probes, "info")?;
        self.inner.info().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

/// An ownership store that records every filter it is queried with and can
/// be switched to fail.
#[derive(Clone, Default)]
pub struct RecordingOwnershipStore {
    inner: MemoryOwnershipStore,
    queries: Arc<Mutex<Vec<OwnershipFilter>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingOwnershipStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: ResourceRecord) {
        self.inner.insert(record);
    }

    /// The wrapped in-memory store.
    #[must_use]
    pub fn inner(&self) -> &MemoryOwnershipStore {
        &self.inner
    }

    /// Makes `find_one` fail with an internal error (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every filter received so far, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<OwnershipFilter> {
        self.queries.lock().clone()
    }

    /// Number of queries received so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Forgets recorded queries.
    pub fn clear_queries(&self) {
        self.queries.lock().clear();
    }
}

#[async_trait]
impl OwnershipRecordStore for RecordingOwnershipStore {
    async fn find_one(&self, filter: &OwnershipFilter) -> StorageResult<Option<ResourceRecord>> {
        self.queries.lock().push(filter.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::internal("injected ownership store failure"));
        }
        self.inner.find_one(filter).await
    }
}

/// Assert that a [`StorageResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use warden_storage::assert_storage_ok;
/// use warden_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Assert that a [`StorageResult`] failed with a transient error.
#[macro_export]
macro_rules! assert_transient {
    ($result:expr) => {{
        let result = $result;
        assert!(
            matches!(&result, Err(e) if e.is_transient()),
            "expected a transient StorageError, got: {:?}",
            result,
        );
    }};
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ownership::{ResourceState, StateConstraint};

    #[tokio::test]
    async fn test_flaky_backend_switches() {
        let backend = FlakyBackend::new();
        backend.set_with_ttl("k", b"v".to_vec(), Duration::from_secs(60)).await.expect("set");

        backend.fail_reads(true);
        assert_transient!(backend.get("k").await);
        assert_storage_ok!(backend.delete(&["other".to_owned()]).await);

        backend.fail_reads(false);
        let value = assert_storage_ok!(backend.get("k").await);
        assert_eq!(value, Some(Bytes::from("v")));
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn test_recording_store_records_filters() {
        let store = RecordingOwnershipStore::new();
        store.insert(ResourceRecord::new("r1", "u1", ResourceState::Active));

        let filter = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(false));
        let found = assert_storage_ok!(store.find_one(&filter).await);
        assert!(found.is_some());
        assert_eq!(store.queries(), vec![filter]);

        store.set_failing(true);
        assert!(store.find_one(&OwnershipFilter::existing("r1")).await.is_err());
        assert_eq!(store.query_count(), 2);
    }
}
