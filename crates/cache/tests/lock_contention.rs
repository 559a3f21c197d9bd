//! Concurrent lock acquisition across tasks sharing one backend.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use warden_cache::{CacheConfig, CacheStore, DistributedLock};
use warden_storage::MemoryBackend;

const CONTENDERS: usize = 16;

/// Two independent lock managers (think: two service instances) over the
/// same backend.
fn two_instances() -> (DistributedLock, DistributedLock) {
    let backend = MemoryBackend::new();
    let a = Arc::new(CacheStore::new(Arc::new(backend.clone()), CacheConfig::default()));
    let b = Arc::new(CacheStore::new(Arc::new(backend), CacheConfig::default()));
    (DistributedLock::new(a), DistributedLock::new(b))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_contender_wins() {
    let (a, b) = two_instances();

    let mut set = JoinSet::new();
    for i in 0..CONTENDERS {
        let locks = if i % 2 == 0 { a.clone() } else { b.clone() };
        set.spawn(async move { locks.acquire_lock("export", "r-1", None).await });
    }

    let mut winners = Vec::new();
    while let Some(result) = set.join_next().await {
        if let Some(token) = result.expect("task should not panic") {
            winners.push(token);
        }
    }

    assert_eq!(winners.len(), 1);
    assert!(b.release_lock("export", "r-1", &winners[0]).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_is_reusable_after_release() {
    let (a, b) = two_instances();

    for round in 0..20 {
        let (holder, other) = if round % 2 == 0 { (&a, &b) } else { (&b, &a) };
        let token = holder.acquire_lock("job", "nightly", None).await.expect("free");
        assert!(other.acquire_lock("job", "nightly", None).await.is_none());
        assert!(other.is_locked("job", "nightly").await);
        assert!(holder.release_lock("job", "nightly", &token).await);
    }
}

#[tokio::test(start_paused = true)]
async fn lock_self_expires() {
    let (a, b) = two_instances();
    let _abandoned = a.acquire_lock("d", "r", Some(Duration::from_secs(5))).await.unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(b.acquire_lock("d", "r", None).await.is_none());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!b.is_locked("d", "r").await);
    assert!(b.acquire_lock("d", "r", None).await.is_some());
}
