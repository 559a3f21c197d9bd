#![allow(clippy::expect_used, clippy::panic)]
//! Fault injection below the cache store.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p warden-cache --features failpoints --test failpoint_tests
//! ```

#![cfg(feature = "failpoints")]

use std::{sync::Arc, time::Duration};

use warden_cache::{CacheConfig, CacheKey, CacheStore};
use warden_storage::MemoryBackend;

#[tokio::test]
async fn get_failpoint_reads_as_miss() {
    let scenario = fail::FailScenario::setup();

    let store = CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
    let key = CacheKey::scoped("s", "1");
    assert!(store.set(&key, &42, Duration::from_secs(60)).await);

    fail::cfg("memory-get", "return").expect("failed to configure fail point");
    assert_eq!(store.get::<i32>(&key).await, None);

    fail::remove("memory-get");
    assert_eq!(store.get::<i32>(&key).await, Some(42));
    assert_eq!(store.stats().await.errors, 1);

    scenario.teardown();
}

#[tokio::test]
async fn set_failpoint_reads_as_false() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-set", "return").expect("failed to configure fail point");

    let store = CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
    assert!(!store.set(&CacheKey::scoped("s", "1"), &42, Duration::from_secs(60)).await);

    scenario.teardown();
}

#[tokio::test]
async fn ping_failpoint_fails_health_check() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-ping", "return").expect("failed to configure fail point");

    let store = CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
    store.init().await;
    assert!(!store.health_check().await);

    scenario.teardown();
}
