//! Conformance suite against the in-memory backends.
//!
//! Each test runs a single conformance check for fine-grained failure
//! reporting; the `run_all` tests make sure nothing is left out.

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use warden_storage::{MemoryBackend, conformance, testutil::FlakyBackend};

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn crud_get_returns_none_for_missing_key() {
    conformance::crud_get_returns_none_for_missing_key(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_set_then_get_returns_value() {
    conformance::crud_set_then_get_returns_value(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_set_overwrites_existing() {
    conformance::crud_set_overwrites_existing(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_delete_counts_removed_keys() {
    conformance::crud_delete_counts_removed_keys(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_delete_empty_is_noop() {
    conformance::crud_delete_empty_is_noop(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_get_many_is_position_aligned() {
    conformance::crud_get_many_is_position_aligned(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_set_many_writes_all() {
    conformance::crud_set_many_writes_all(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn crud_large_value_roundtrip() {
    conformance::crud_large_value_roundtrip(&MemoryBackend::new()).await;
}

// ============================================================================
// TTL
// ============================================================================

#[tokio::test]
async fn ttl_key_expires() {
    conformance::ttl_key_expires(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn ttl_expire_resets_live_key() {
    conformance::ttl_expire_resets_live_key(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn ttl_expired_keys_excluded_from_scan() {
    conformance::ttl_expired_keys_excluded_from_scan(&MemoryBackend::new()).await;
}

// ============================================================================
// Conditional
// ============================================================================

#[tokio::test]
async fn cond_set_if_absent_first_wins() {
    conformance::cond_set_if_absent_first_wins(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn cond_set_if_absent_after_expiry() {
    conformance::cond_set_if_absent_after_expiry(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn cond_compare_and_delete() {
    conformance::cond_compare_and_delete(&MemoryBackend::new()).await;
}

// ============================================================================
// Scan, concurrency, probes
// ============================================================================

#[tokio::test]
async fn scan_matches_glob() {
    conformance::scan_matches_glob(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn scan_matches_character_classes() {
    conformance::scan_matches_character_classes(&MemoryBackend::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_if_absent_one_winner() {
    conformance::concurrent_set_if_absent_one_winner(Arc::new(MemoryBackend::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_compare_and_delete_one_winner() {
    conformance::concurrent_compare_and_delete_one_winner(Arc::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn probe_ping_and_info() {
    conformance::probe_ping_and_info(&MemoryBackend::new()).await;
}

// ============================================================================
// Full suite
// ============================================================================

#[tokio::test]
async fn memory_backend_run_all() {
    conformance::run_all(Arc::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn healthy_flaky_backend_run_all() {
    conformance::run_all(Arc::new(FlakyBackend::new())).await;
}

#[tokio::test]
async fn trait_object_run_all() {
    let backend: Arc<dyn warden_storage::StorageBackend> = Arc::new(MemoryBackend::new());
    conformance::run_all(backend).await;
}
