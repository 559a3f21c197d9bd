//! Best-effort distributed mutual exclusion on top of [`CacheStore`].
//!
//! A lock is the key `locks:{domain}:{resource_id}` holding a random token.
//!
//! - **Acquire**: `SET key token NX PX ttl`, so the TTL exists from the first
//!   instant the lock does.
//! - **Release**: a server-side compare-and-delete, so a holder whose lock
//!   expired and was re-acquired by someone else cannot release the new
//!   holder's lock.
//! - **No renewal**: work that may outlive the TTL must pick a longer TTL.
//!
//! Failures are never fatal: a backend error reads as "not acquired" or "not
//! released", and the lock self-expires.

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;

use crate::{key::CacheKey, store::CacheStore};

/// Proof of a successful acquisition, needed to release the lock.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generates `{pid:x}-{unix_millis:x}-{128 random bits as hex}`.
    fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let random: u128 = rand::random();
        Self(format!("{:x}-{millis:x}-{random:032x}", std::process::id()))
    }

    /// The token as stored in the lock key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({})", self.0)
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock manager sharing a [`CacheStore`] with the rest of the process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use warden_cache::{CacheConfig, CacheStore, DistributedLock};
/// use warden_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default()));
/// let locks = DistributedLock::new(store);
///
/// let token = locks.acquire_lock("export", "r-1", None).await.expect("lock is free");
/// assert!(locks.acquire_lock("export", "r-1", None).await.is_none());
/// assert!(locks.release_lock("export", "r-1", &token).await);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct DistributedLock {
    store: Arc<CacheStore>,
    default_ttl: Duration,
}

impl DistributedLock {
    /// Creates a lock manager whose default TTL is the store's configured lock TTL.
    #[must_use]
    pub fn new(store: Arc<CacheStore>) -> Self {
        let default_ttl = store.config().lock_ttl();
        Self { store, default_ttl }
    }

    /// Tries once to take the lock on `resource_id` in `domain`.
    ///
    /// Returns the token on success; `None` if the lock is held or the backend
    /// failed. `ttl` defaults to the configured lock TTL.
    #[tracing::instrument(skip(self), fields(domain = %domain, resource_id = %resource_id))]
    pub async fn acquire_lock(
        &self,
        domain: &str,
        resource_id: &str,
        ttl: Option<Duration>,
    ) -> Option<LockToken> {
        let key = CacheKey::lock(domain, resource_id);
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            tracing::warn!("refusing to acquire lock with zero TTL");
            return None;
        }
        let token = LockToken::generate();

        match self.store.set_if_absent_raw(&key, token.0.clone().into_bytes(), ttl).await {
            Ok(true) => {
                tracing::debug!(ttl_ms = ttl.as_millis(), "lock acquired");
                Some(token)
            },
            Ok(false) => {
                tracing::debug!("lock already held");
                None
            },
            Err(e) => {
                tracing::warn!(error = %e, "lock acquisition failed");
                None
            },
        }
    }

    /// Releases the lock if it is still held by `token`.
    ///
    /// Returns `false` if the lock expired, is held by another token, or the
    /// backend failed.
    #[tracing::instrument(skip(self, token), fields(domain = %domain, resource_id = %resource_id))]
    pub async fn release_lock(&self, domain: &str, resource_id: &str, token: &LockToken) -> bool {
        let key = CacheKey::lock(domain, resource_id);
        match self.store.compare_and_delete_raw(&key, token.as_str().as_bytes()).await {
            Ok(true) => {
                tracing::debug!("lock released");
                true
            },
            Ok(false) => {
                tracing::debug!("lock not held by this token");
                false
            },
            Err(e) => {
                tracing::warn!(error = %e, "lock release failed");
                false
            },
        }
    }

    /// Advisory check whether anyone holds the lock; `false` on failure.
    ///
    /// The answer may be stale by the time the caller acts on it.
    pub async fn is_locked(&self, domain: &str, resource_id: &str) -> bool {
        self.store.exists(&CacheKey::lock(domain, resource_id)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use warden_storage::{MemoryBackend, StorageBackend, testutil::FlakyBackend};

    use super::*;
    use crate::config::CacheConfig;

    fn locks_over(backend: impl StorageBackend + 'static) -> DistributedLock {
        DistributedLock::new(Arc::new(CacheStore::new(Arc::new(backend), CacheConfig::default())))
    }

    #[test]
    fn test_token_format() {
        let token = LockToken::generate();
        let parts: Vec<&str> = token.as_str().split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(u32::from_str_radix(parts[0], 16).unwrap(), std::process::id());
        assert!(i64::from_str_radix(parts[1], 16).unwrap() > 0);
        assert_eq!(parts[2].len(), 32);
        assert!(parts[2].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<LockToken> = (0..1000).map(|_| LockToken::generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[tokio::test]
    async fn test_acquire_uses_lock_key_and_default_ttl() {
        let backend = MemoryBackend::new();
        let locks = locks_over(backend.clone());

        let token = locks.acquire_lock("export", "r1", None).await.unwrap();
        let stored = backend.get("warden:locks:export:r1").await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), token.as_str().as_bytes());

        let ttl = backend.ttl("warden:locks:export:r1").unwrap();
        assert!(ttl <= Duration::from_millis(300_000));
        assert!(ttl > Duration::from_millis(299_000));
    }

    #[tokio::test]
    async fn test_held_lock_blocks_second_acquire() {
        let locks = locks_over(MemoryBackend::new());

        let first = locks.acquire_lock("d", "r", None).await;
        assert!(first.is_some());
        assert!(locks.acquire_lock("d", "r", None).await.is_none());
        assert!(locks.acquire_lock("d", "other", None).await.is_some());
        assert!(locks.is_locked("d", "r").await);
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let locks = locks_over(MemoryBackend::new());
        let token = locks.acquire_lock("d", "r", None).await.unwrap();
        let forged = LockToken(format!("{}0", token.as_str()));

        assert!(!locks.release_lock("d", "r", &forged).await);
        assert!(locks.is_locked("d", "r").await);
        assert!(locks.release_lock("d", "r", &token).await);
        assert!(!locks.is_locked("d", "r").await);
        assert!(!locks.release_lock("d", "r", &token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_cannot_be_released_by_old_holder() {
        let locks = locks_over(MemoryBackend::new());
        let old = locks.acquire_lock("d", "r", Some(Duration::from_millis(100))).await.unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        let new = locks.acquire_lock("d", "r", None).await.expect("expired lock is free");

        assert!(!locks.release_lock("d", "r", &old).await);
        assert!(locks.is_locked("d", "r").await);
        assert!(locks.release_lock("d", "r", &new).await);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_fatal() {
        let backend = FlakyBackend::new();
        let locks = locks_over(backend.clone());
        let token = locks.acquire_lock("d", "r", None).await.unwrap();

        backend.fail_all(true);
        assert!(locks.acquire_lock("d", "s", None).await.is_none());
        assert!(!locks.release_lock("d", "r", &token).await);
        assert!(!locks.is_locked("d", "r").await);

        backend.fail_all(false);
        assert!(locks.release_lock("d", "r", &token).await);
    }

    #[tokio::test]
    async fn test_invalid_lock_key_is_not_acquired() {
        let backend = FlakyBackend::new();
        let locks = locks_over(backend.clone());

        assert!(locks.acquire_lock("bad domain", "r", None).await.is_none());
        assert_eq!(backend.calls(), 0);
    }
}
