//! Conformance suite for [`StorageBackend`] implementations.
//!
//! Every backend the cache can run on, in-memory or Redis, must pass the
//! same checks. Each function takes a backend, uses keys under
//! `conformance:`, and clears them first, so the suite can run against a
//! shared server.
//!
//! # Usage
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use std::sync::Arc;
//! use warden_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn memory_backend_conformance() {
//!     conformance::run_all(Arc::new(MemoryBackend::new())).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | get/set/delete, batch variants |
//! | TTL | expiry, `expire`, scans skip expired keys |
//! | Conditional | `set_if_absent`, `compare_and_delete` |
//! | Scan | glob matching, character classes |
//! | Concurrent | exactly one winner under contention |
//! | Probes | `ping`, `info` |

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::task::JoinSet;

use crate::backend::StorageBackend;

/// TTL long enough never to expire during a check.
const LONG: Duration = Duration::from_secs(60);

/// TTL short enough to wait out.
const SHORT: Duration = Duration::from_millis(50);

/// Wait comfortably past [`SHORT`].
const PAST_SHORT: Duration = Duration::from_millis(200);

async fn scan_sorted<B: StorageBackend + ?Sized>(backend: &B, pattern: &str) -> Vec<String> {
    let mut keys = backend.scan(pattern).await.expect("scan");
    keys.sort();
    keys
}

async fn reset<B: StorageBackend + ?Sized>(backend: &B, keys: &[&str]) {
    let keys: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
    backend.delete(&keys).await.expect("reset should succeed");
}

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a missing key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:missing"]).await;
    let result = backend.get("conformance:missing").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// `set_with_ttl` then `get` round-trips the value.
pub async fn crud_set_then_get_returns_value<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set_with_ttl("conformance:k1", b"v1".to_vec(), LONG).await.expect("set");
    let value = backend.get("conformance:k1").await.expect("get");
    assert_eq!(value, Some(Bytes::from("v1")));
}

/// Setting an existing key overwrites it.
pub async fn crud_set_overwrites_existing<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set_with_ttl("conformance:k2", b"original".to_vec(), LONG).await.expect("set");
    backend.set_with_ttl("conformance:k2", b"updated".to_vec(), LONG).await.expect("overwrite");
    let value = backend.get("conformance:k2").await.expect("get");
    assert_eq!(value, Some(Bytes::from("updated")));
}

/// `delete` returns how many of the given keys existed.
pub async fn crud_delete_counts_removed_keys<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:d1", "conformance:d2", "conformance:d3"]).await;
    backend.set_with_ttl("conformance:d1", b"v".to_vec(), LONG).await.expect("set");
    backend.set_with_ttl("conformance:d2", b"v".to_vec(), LONG).await.expect("set");

    let keys =
        ["conformance:d1", "conformance:d2", "conformance:d3"].map(str::to_owned).to_vec();
    assert_eq!(backend.delete(&keys).await.expect("delete"), 2);
    assert_eq!(backend.delete(&keys).await.expect("second delete"), 0);
    assert_eq!(backend.get("conformance:d1").await.expect("get"), None);
}

/// `delete` of no keys is a no-op.
pub async fn crud_delete_empty_is_noop<B: StorageBackend + ?Sized>(backend: &B) {
    assert_eq!(backend.delete(&[]).await.expect("empty delete"), 0);
}

/// `get_many` answers position by position, with `None` for missing keys.
pub async fn crud_get_many_is_position_aligned<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:m1", "conformance:m2", "conformance:m3"]).await;
    backend.set_with_ttl("conformance:m1", b"one".to_vec(), LONG).await.expect("set");
    backend.set_with_ttl("conformance:m3", b"three".to_vec(), LONG).await.expect("set");

    let keys =
        ["conformance:m1", "conformance:m2", "conformance:m3"].map(str::to_owned).to_vec();
    let values = backend.get_many(&keys).await.expect("get_many");
    assert_eq!(values, vec![Some(Bytes::from("one")), None, Some(Bytes::from("three"))]);
    assert!(backend.get_many(&[]).await.expect("empty get_many").is_empty());
}

/// `set_many_with_ttl` writes every entry.
pub async fn crud_set_many_writes_all<B: StorageBackend + ?Sized>(backend: &B) {
    let entries = vec![
        ("conformance:s1".to_owned(), b"a".to_vec()),
        ("conformance:s2".to_owned(), b"b".to_vec()),
    ];
    backend.set_many_with_ttl(entries, LONG).await.expect("set_many");
    assert_eq!(backend.get("conformance:s1").await.expect("get"), Some(Bytes::from("a")));
    assert_eq!(backend.get("conformance:s2").await.expect("get"), Some(Bytes::from("b")));
}

/// Values of 1 MiB round-trip intact.
pub async fn crud_large_value_roundtrip<B: StorageBackend + ?Sized>(backend: &B) {
    let value: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    backend.set_with_ttl("conformance:large", value.clone(), LONG).await.expect("set");
    let read = backend.get("conformance:large").await.expect("get").expect("present");
    assert_eq!(read.len(), value.len());
    assert_eq!(read.as_ref(), value.as_slice());
}

// ============================================================================
// TTL
// ============================================================================

/// A key disappears once its TTL elapses.
pub async fn ttl_key_expires<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set_with_ttl("conformance:ttl", b"v".to_vec(), SHORT).await.expect("set");
    assert!(backend.exists("conformance:ttl").await.expect("exists"));

    tokio::time::sleep(PAST_SHORT).await;
    assert_eq!(backend.get("conformance:ttl").await.expect("get"), None);
    assert!(!backend.exists("conformance:ttl").await.expect("exists"));
}

/// `expire` resets a live key's TTL and reports missing keys.
pub async fn ttl_expire_resets_live_key<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:exp-missing"]).await;
    backend.set_with_ttl("conformance:exp", b"v".to_vec(), SHORT).await.expect("set");
    assert!(backend.expire("conformance:exp", LONG).await.expect("expire"));
    assert!(!backend.expire("conformance:exp-missing", LONG).await.expect("expire missing"));

    tokio::time::sleep(PAST_SHORT).await;
    assert!(backend.exists("conformance:exp").await.expect("exists"), "expire should extend");
}

/// Scans never return expired keys.
pub async fn ttl_expired_keys_excluded_from_scan<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:tscan:live", "conformance:tscan:dead"]).await;
    backend.set_with_ttl("conformance:tscan:live", b"v".to_vec(), LONG).await.expect("set");
    backend.set_with_ttl("conformance:tscan:dead", b"v".to_vec(), SHORT).await.expect("set");

    tokio::time::sleep(PAST_SHORT).await;
    let keys = backend.scan("conformance:tscan:*").await.expect("scan");
    assert_eq!(keys, vec!["conformance:tscan:live".to_owned()]);
}

// ============================================================================
// Conditional writes and deletes
// ============================================================================

/// `set_if_absent` succeeds once and leaves the first value in place.
pub async fn cond_set_if_absent_first_wins<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:nx"]).await;
    assert!(backend.set_if_absent("conformance:nx", b"first".to_vec(), LONG).await.expect("nx"));
    assert!(!backend.set_if_absent("conformance:nx", b"second".to_vec(), LONG).await.expect("nx"));
    assert_eq!(backend.get("conformance:nx").await.expect("get"), Some(Bytes::from("first")));
}

/// `set_if_absent` succeeds again once the previous value expired.
pub async fn cond_set_if_absent_after_expiry<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:nx-exp"]).await;
    assert!(backend.set_if_absent("conformance:nx-exp", b"a".to_vec(), SHORT).await.expect("nx"));
    tokio::time::sleep(PAST_SHORT).await;
    assert!(backend.set_if_absent("conformance:nx-exp", b"b".to_vec(), LONG).await.expect("nx"));
}

/// `compare_and_delete` deletes only when the value matches.
pub async fn cond_compare_and_delete<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:cad-missing"]).await;
    backend.set_with_ttl("conformance:cad", b"token-a".to_vec(), LONG).await.expect("set");

    assert!(!backend.compare_and_delete("conformance:cad", b"token-b").await.expect("cad"));
    assert!(backend.exists("conformance:cad").await.expect("exists"), "mismatch must not delete");

    assert!(backend.compare_and_delete("conformance:cad", b"token-a").await.expect("cad"));
    assert!(!backend.exists("conformance:cad").await.expect("exists"));

    assert!(!backend.compare_and_delete("conformance:cad-missing", b"x").await.expect("cad"));
}

// ============================================================================
// Scan
// ============================================================================

/// `scan` returns exactly the keys matching the glob.
pub async fn scan_matches_glob<B: StorageBackend + ?Sized>(backend: &B) {
    reset(backend, &["conformance:scan:a:1", "conformance:scan:a:2", "conformance:scan:b:1"])
        .await;
    for key in ["conformance:scan:a:1", "conformance:scan:a:2", "conformance:scan:b:1"] {
        backend.set_with_ttl(key, b"v".to_vec(), LONG).await.expect("set");
    }

    let mut keys = backend.scan("conformance:scan:a:*").await.expect("scan");
    keys.sort();
    assert_eq!(keys, vec!["conformance:scan:a:1".to_owned(), "conformance:scan:a:2".to_owned()]);

    assert!(backend.scan("conformance:scan:none:*").await.expect("scan").is_empty());
}

/// Character classes, negated classes and ranges match as in Redis; braces
/// are literal.
pub async fn scan_matches_character_classes<B: StorageBackend + ?Sized>(backend: &B) {
    const KEYS: [&str; 4] = [
        "conformance:class:hallo",
        "conformance:class:hbllo",
        "conformance:class:hello",
        "conformance:class:hxllo",
    ];
    reset(backend, &KEYS).await;
    for key in KEYS {
        backend.set_with_ttl(key, b"v".to_vec(), LONG).await.expect("set");
    }

    assert_eq!(
        scan_sorted(backend, "conformance:class:h[ae]llo").await,
        vec!["conformance:class:hallo".to_owned(), "conformance:class:hello".to_owned()]
    );
    assert_eq!(
        scan_sorted(backend, "conformance:class:h[^e]llo").await,
        vec![
            "conformance:class:hallo".to_owned(),
            "conformance:class:hbllo".to_owned(),
            "conformance:class:hxllo".to_owned(),
        ]
    );
    assert_eq!(
        scan_sorted(backend, "conformance:class:h[a-b]llo").await,
        vec!["conformance:class:hallo".to_owned(), "conformance:class:hbllo".to_owned()]
    );
    assert!(scan_sorted(backend, "conformance:class:{hallo,hello}").await.is_empty());
}

// ============================================================================
// Concurrent
// ============================================================================

/// Of many concurrent `set_if_absent` calls, exactly one wins.
pub async fn concurrent_set_if_absent_one_winner<B: StorageBackend + ?Sized + 'static>(
    backend: Arc<B>,
) {
    reset(backend.as_ref(), &["conformance:race"]).await;

    let mut tasks = JoinSet::new();
    for i in 0u32..10 {
        let backend = Arc::clone(&backend);
        tasks.spawn(async move {
            backend.set_if_absent("conformance:race", format!("writer-{i}").into_bytes(), LONG).await
        });
    }

    let mut winners = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.expect("task join").expect("set_if_absent") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one writer should win");
}

/// Of many concurrent `compare_and_delete` calls with the right value,
/// exactly one deletes.
pub async fn concurrent_compare_and_delete_one_winner<B: StorageBackend + ?Sized + 'static>(
    backend: Arc<B>,
) {
    backend.set_with_ttl("conformance:cad-race", b"token".to_vec(), LONG).await.expect("set");

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let backend = Arc::clone(&backend);
        tasks.spawn(async move { backend.compare_and_delete("conformance:cad-race", b"token").await });
    }

    let mut winners = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.expect("task join").expect("compare_and_delete") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one release should succeed");
}

// ============================================================================
// Probes
// ============================================================================

/// `ping` succeeds and `info` counts stored keys.
pub async fn probe_ping_and_info<B: StorageBackend + ?Sized>(backend: &B) {
    backend.ping().await.expect("ping");
    backend.set_with_ttl("conformance:info", b"v".to_vec(), LONG).await.expect("set");
    let info = backend.info().await.expect("info");
    assert!(info.key_count >= 1, "info should count at least the key just written: {info:?}");
}

// ============================================================================
// Runner
// ============================================================================

/// Runs the whole suite against `backend`, in sequence.
pub async fn run_all<B: StorageBackend + ?Sized + 'static>(backend: Arc<B>) {
    crud_get_returns_none_for_missing_key(backend.as_ref()).await;
    crud_set_then_get_returns_value(backend.as_ref()).await;
    crud_set_overwrites_existing(backend.as_ref()).await;
    crud_delete_counts_removed_keys(backend.as_ref()).await;
    crud_delete_empty_is_noop(backend.as_ref()).await;
    crud_get_many_is_position_aligned(backend.as_ref()).await;
    crud_set_many_writes_all(backend.as_ref()).await;
    crud_large_value_roundtrip(backend.as_ref()).await;

    ttl_key_expires(backend.as_ref()).await;
    ttl_expire_resets_live_key(backend.as_ref()).await;
    ttl_expired_keys_excluded_from_scan(backend.as_ref()).await;

    cond_set_if_absent_first_wins(backend.as_ref()).await;
    cond_set_if_absent_after_expiry(backend.as_ref()).await;
    cond_compare_and_delete(backend.as_ref()).await;

    scan_matches_glob(backend.as_ref()).await;
    scan_matches_character_classes(backend.as_ref()).await;

    concurrent_set_if_absent_one_winner(Arc::clone(&backend)).await;
    concurrent_compare_and_delete_one_winner(Arc::clone(&backend)).await;

    probe_ping_and_info(backend.as_ref()).await;
}
