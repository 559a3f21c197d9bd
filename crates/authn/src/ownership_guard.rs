//! Resource ownership checks with cached verdicts.
//!
//! # Flow
//!
//! ```text
//! validate ids ──► cache ownership:{rid}:{cid}
//!                     │ fresh & applicable ──────────────► allow / deny
//!                     │ miss, stale, or cache down
//!                     ▼
//!       store: owned by caller, state ∈ accessible
//!                     │ found ──► cache positive ────────► allow
//!                     │ none
//!                     ▼
//!       store: exists, state ≠ deleted
//!                     │ ──► cache negative (state unknown)
//!                     ▼
//!         Unauthorized (exists) / ResourceNotFound (absent)
//! ```
//!
//! Both denials render the same message, and the negative record does not
//! say which one applied, so neither a response nor a cache entry tells a
//! caller whether someone else's resource exists.
//!
//! A cached negative verdict is always served as
//! [`AuthError::Unauthorized`]. A missing resource therefore reports
//! [`AuthError::ResourceNotFound`] on the first check and `Unauthorized`
//! while the negative verdict lives. Recording existence in the cache entry
//! would make the entry itself reveal it.
//!
//! Cache failures only cost a store round trip. Store failures abort the
//! check with [`AuthError::Internal`].

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use fail::fail_point;
use serde::{Deserialize, Serialize};
use warden_cache::{CacheKey, CacheStore, KeyPattern};
use warden_storage::ownership::{
    OwnershipFilter, OwnershipRecordStore, ResourceState, StateConstraint,
};

use crate::{
    config::OwnershipGuardConfig,
    error::{AuthError, Result},
    subject::{CallerId, ResourceId},
};

/// Per-route knobs for an ownership check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnershipPolicy {
    /// Also grant access to archived resources.
    pub allow_archived_state: bool,
    /// Neither read nor write the verdict cache.
    pub skip_cache: bool,
}

impl OwnershipPolicy {
    /// Active resources only, cached.
    #[must_use]
    pub fn active_only() -> Self {
        Self::default()
    }

    /// Active and archived resources, cached.
    #[must_use]
    pub fn including_archived() -> Self {
        Self { allow_archived_state: true, ..Self::default() }
    }

    /// Same policy, bypassing the cache.
    #[must_use]
    pub fn uncached(self) -> Self {
        Self { skip_cache: true, ..self }
    }
}

/// Cached ownership verdict.
///
/// Serialized as `{"isOwner": bool, "resourceState": "active" | "archived" |
/// "unknown", "timestamp": RFC 3339}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipCacheRecord {
    /// Whether the caller owned the resource when checked.
    pub is_owner: bool,
    /// State seen on a positive check; always `None` on a negative one.
    #[serde(with = "state_or_unknown")]
    pub resource_state: Option<ResourceState>,
    /// When the verdict was produced.
    pub timestamp: DateTime<Utc>,
}

impl OwnershipCacheRecord {
    /// A positive verdict for a resource in `state`.
    #[must_use]
    pub fn positive(state: ResourceState, timestamp: DateTime<Utc>) -> Self {
        Self { is_owner: true, resource_state: Some(state), timestamp }
    }

    /// A negative verdict.
    #[must_use]
    pub fn negative(timestamp: DateTime<Utc>) -> Self {
        Self { is_owner: false, resource_state: None, timestamp }
    }

    /// Age at `now`, or `None` if the timestamp lies in the future.
    fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        (now - self.timestamp).to_std().ok()
    }
}

mod state_or_unknown {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
    use warden_storage::ownership::ResourceState;

    const UNKNOWN: &str = "unknown";

    pub fn serialize<S: Serializer>(
        state: &Option<ResourceState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match state {
            Some(state) => state.serialize(serializer),
            None => serializer.serialize_str(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ResourceState>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "active" => Ok(Some(ResourceState::Active)),
            "archived" => Ok(Some(ResourceState::Archived)),
            "deleted" => Ok(Some(ResourceState::Deleted)),
            UNKNOWN => Ok(None),
            other => Err(D::Error::unknown_variant(
                other,
                &["active", "archived", "deleted", UNKNOWN],
            )),
        }
    }
}

/// Outcome of a successful ownership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipGrant {
    /// The checked resource, in canonical form.
    pub resource_id: ResourceId,
    /// The resource's state at check time.
    pub state: ResourceState,
    /// Whether the verdict came from the cache.
    pub from_cache: bool,
}

/// Verifies that callers own the resources they address.
pub struct ResourceOwnershipGuard {
    cache: Arc<CacheStore>,
    store: Arc<dyn OwnershipRecordStore>,
    config: OwnershipGuardConfig,
}

impl ResourceOwnershipGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(
        cache: Arc<CacheStore>,
        store: Arc<dyn OwnershipRecordStore>,
        config: OwnershipGuardConfig,
    ) -> Self {
        Self { cache, store, config }
    }

    /// Returns the guard's configuration.
    #[must_use]
    pub fn config(&self) -> &OwnershipGuardConfig {
        &self.config
    }

    /// Validates the identifiers and checks ownership.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidInput`] if either identifier is malformed
    /// - [`AuthError::Unauthorized`] if the resource belongs to someone else
    ///   (or is archived and `policy` does not allow archived resources)
    /// - [`AuthError::ResourceNotFound`] if the resource does not exist or is
    ///   deleted, as decided by the store. Repeat checks answered from a
    ///   cached negative verdict return [`AuthError::Unauthorized`] instead.
    /// - [`AuthError::Internal`] if the ownership store fails
    pub async fn verify(
        &self,
        resource_id: &str,
        caller_id: &str,
        policy: OwnershipPolicy,
    ) -> Result<OwnershipGrant> {
        let resource_id = ResourceId::parse(resource_id).inspect_err(log_rejected_input)?;
        let caller = CallerId::parse(caller_id).inspect_err(log_rejected_input)?;
        self.check(&resource_id, &caller, policy).await
    }

    /// Checks ownership for already validated identifiers.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    #[tracing::instrument(skip(self), fields(resource_id = %resource_id, caller = %caller))]
    pub async fn check(
        &self,
        resource_id: &ResourceId,
        caller: &CallerId,
        policy: OwnershipPolicy,
    ) -> Result<OwnershipGrant> {
        let key = CacheKey::ownership(resource_id.as_str(), caller.as_str());

        if !policy.skip_cache {
            if let Some(record) = self.cache.get::<OwnershipCacheRecord>(&key).await {
                if let Some(verdict) = self.trusted_verdict(&record, policy, Utc::now()) {
                    tracing::debug!(is_owner = record.is_owner, "ownership served from cache");
                    return verdict.map(|state| OwnershipGrant {
                        resource_id: resource_id.clone(),
                        state,
                        from_cache: true,
                    });
                }
                tracing::debug!(is_owner = record.is_owner, "cached ownership not applicable");
            }
        }

        let owned = self
            .find(OwnershipFilter::owned_by(
                resource_id.as_str(),
                caller.as_str(),
                StateConstraint::accessible(policy.allow_archived_state),
            ))
            .await?;

        if let Some(state) = owned {
            if !policy.skip_cache {
                let record = OwnershipCacheRecord::positive(state, Utc::now());
                self.cache.set(&key, &record, self.config.positive_ttl()).await;
            }
            return Ok(OwnershipGrant { resource_id: resource_id.clone(), state, from_cache: false });
        }

        let exists = self.find(OwnershipFilter::existing(resource_id.as_str())).await?.is_some();
        if !policy.skip_cache {
            let record = OwnershipCacheRecord::negative(Utc::now());
            self.cache.set(&key, &record, self.config.negative_ttl()).await;
        }

        if exists {
            tracing::info!("ownership denied");
            Err(AuthError::Unauthorized)
        } else {
            tracing::info!("resource not found");
            Err(AuthError::ResourceNotFound)
        }
    }

    /// Drops the cached verdict for one caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] if either identifier is malformed.
    pub async fn invalidate(&self, resource_id: &str, caller_id: &str) -> Result<bool> {
        let resource_id = ResourceId::parse(resource_id)?;
        let caller = CallerId::parse(caller_id)?;
        Ok(self.cache.del_one(&CacheKey::ownership(resource_id.as_str(), caller.as_str())).await)
    }

    /// Drops every cached verdict for a resource, e.g. after a transfer of
    /// ownership or a state change. Returns the number of verdicts dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] if `resource_id` is malformed.
    pub async fn invalidate_resource(&self, resource_id: &str) -> Result<u64> {
        let resource_id = ResourceId::parse(resource_id)?;
        let pattern = KeyPattern::ownership_of_resource(resource_id.as_str());
        Ok(self.cache.delete_by_pattern(&pattern).await)
    }

    /// Runs one store query; failures are fatal.
    async fn find(&self, filter: OwnershipFilter) -> Result<Option<ResourceState>> {
        fail_point!("ownership-guard-before-store", |_| {
            Err(AuthError::Internal(warden_storage::StorageError::internal(
                "injected ownership store failure",
            )))
        });

        match self.store.find_one(&filter).await {
            Ok(found) => Ok(found.map(|record| record.state)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    by_owner = filter.owner_id.is_some(),
                    "ownership store query failed"
                );
                Err(AuthError::Internal(e))
            },
        }
    }

    /// Returns the verdict a cached record supports under `policy`, or
    /// `None` if the store must be asked.
    fn trusted_verdict(
        &self,
        record: &OwnershipCacheRecord,
        policy: OwnershipPolicy,
        now: DateTime<Utc>,
    ) -> Option<Result<ResourceState>> {
        let ttl =
            if record.is_owner { self.config.positive_ttl() } else { self.config.negative_ttl() };
        if record.age(now)? >= ttl {
            return None;
        }

        if record.is_owner {
            match record.resource_state {
                Some(ResourceState::Active) => Some(Ok(ResourceState::Active)),
                Some(ResourceState::Archived) if policy.allow_archived_state => {
                    Some(Ok(ResourceState::Archived))
                },
                _ => None,
            }
        } else if policy.allow_archived_state {
            // A denial under the narrow filter may not hold under the wide one.
            None
        } else {
            Some(Err(AuthError::Unauthorized))
        }
    }
}

fn log_rejected_input(err: &AuthError) {
    if let AuthError::InvalidInput { reason } = err {
        tracing::debug!(reason = *reason, "ownership check input rejected");
    }
}

impl std::fmt::Debug for ResourceOwnershipGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOwnershipGuard")
            .field("namespace", &self.cache.namespace())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;
    use warden_cache::CacheConfig;
    use warden_storage::{
        MemoryBackend,
        ownership::ResourceRecord,
        testutil::{FlakyBackend, RecordingOwnershipStore},
    };

    use super::*;

    const RID: &str = "8f14e45f-ceea-467a-9575-3a3b2e1d0c9b";

    struct Fixture {
        guard: ResourceOwnershipGuard,
        store: RecordingOwnershipStore,
        backend: MemoryBackend,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let store = RecordingOwnershipStore::new();
        let cache = Arc::new(CacheStore::new(Arc::new(backend.clone()), CacheConfig::default()));
        let guard = ResourceOwnershipGuard::new(
            cache,
            Arc::new(store.clone()),
            OwnershipGuardConfig::default(),
        );
        Fixture { guard, store, backend }
    }

    fn cached_key(caller: &str) -> String {
        format!("warden:ownership:{RID}:{caller}")
    }

    #[tokio::test]
    async fn test_owner_allowed_then_cached() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));

        let grant = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap();
        assert_eq!(grant.state, ResourceState::Active);
        assert!(!grant.from_cache);

        let grant = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap();
        assert!(grant.from_cache);
        assert_eq!(f.store.query_count(), 1);

        let ttl = f.backend.ttl(&cached_key("u1")).unwrap();
        assert!(ttl > Duration::from_secs(290) && ttl <= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_non_owner_two_queries_and_negative_cache() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));

        let err = f.guard.verify(RID, "u2", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
        assert_eq!(f.store.query_count(), 2);

        let ttl = f.backend.ttl(&cached_key("u2")).unwrap();
        assert!(ttl > Duration::from_secs(50) && ttl <= Duration::from_secs(60));

        let err = f.guard.verify(RID, "u2", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
        assert_eq!(f.store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_resource_not_found() {
        let f = fixture();
        let err = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::ResourceNotFound));
        assert!(f.backend.ttl(&cached_key("u1")).is_some());
    }

    #[tokio::test]
    async fn test_missing_resource_reports_unauthorized_from_cache() {
        let f = fixture();

        let first = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(first, AuthError::ResourceNotFound));
        assert_eq!(f.store.query_count(), 2);

        let second = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(second, AuthError::Unauthorized));
        assert_eq!(f.store.query_count(), 2);
        assert_eq!(first.to_string(), second.to_string());

        let key = CacheKey::ownership(RID, "u1");
        let record = f.guard.cache.get::<OwnershipCacheRecord>(&key).await.unwrap();
        assert!(!record.is_owner);
        assert_eq!(record.resource_state, None);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    #[tokio::test]
    async fn test_deleted_never_accessible(#[case] allow_archived: bool) {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Deleted));
        let policy = OwnershipPolicy { allow_archived_state: allow_archived, skip_cache: false };

        let err = f.guard.verify(RID, "u1", policy).await.unwrap_err();
        assert!(matches!(err, AuthError::ResourceNotFound));
    }

    #[tokio::test]
    async fn test_archived_requires_policy() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Archived));

        let err = f.guard.verify(RID, "u1", OwnershipPolicy::active_only()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));

        // the negative verdict above must not block the wider policy
        let grant = f.guard.verify(RID, "u1", OwnershipPolicy::including_archived()).await.unwrap();
        assert_eq!(grant.state, ResourceState::Archived);
        assert!(!grant.from_cache);
    }

    #[tokio::test]
    async fn test_cached_archived_grant_not_used_for_narrow_policy() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Archived));

        f.guard.verify(RID, "u1", OwnershipPolicy::including_archived()).await.unwrap();
        let err = f.guard.verify(RID, "u1", OwnershipPolicy::active_only()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn test_skip_cache_neither_reads_nor_writes() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));
        let policy = OwnershipPolicy::active_only().uncached();

        f.guard.verify(RID, "u1", policy).await.unwrap();
        f.guard.verify(RID, "u1", policy).await.unwrap();
        assert_eq!(f.store.query_count(), 2);
        assert_eq!(f.backend.raw_len(), 0);

        let err = f.guard.verify(RID, "u2", policy).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
        assert_eq!(f.store.query_count(), 4);
        assert_eq!(f.backend.raw_len(), 0);
    }

    #[rstest]
    #[case("not-a-uuid", "u1")]
    #[case("", "u1")]
    #[case(RID, "")]
    #[case(RID, "u 1")]
    #[tokio::test]
    async fn test_invalid_input_touches_nothing(#[case] rid: &str, #[case] caller: &str) {
        let f = fixture();
        let err = f.guard.verify(rid, caller, OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput { .. }));
        assert_eq!(f.store.query_count(), 0);
        assert_eq!(f.backend.raw_len(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let f = fixture();
        f.store.set_failing(true);
        let err = f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(f.backend.raw_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_outage_same_decisions() {
        let backend = FlakyBackend::new();
        backend.fail_all(true);
        let store = RecordingOwnershipStore::new();
        store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));
        let cache = Arc::new(CacheStore::new(Arc::new(backend), CacheConfig::default()));
        let guard = ResourceOwnershipGuard::new(
            cache,
            Arc::new(store.clone()),
            OwnershipGuardConfig::default(),
        );

        assert!(guard.verify(RID, "u1", OwnershipPolicy::default()).await.is_ok());
        assert!(matches!(
            guard.verify(RID, "u2", OwnershipPolicy::default()).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_resource_drops_all_callers() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));
        f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap();
        let _ = f.guard.verify(RID, "u2", OwnershipPolicy::default()).await;

        assert_eq!(f.guard.invalidate_resource(RID).await.unwrap(), 2);
        assert_eq!(f.backend.raw_len(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_single_caller() {
        let f = fixture();
        f.store.insert(ResourceRecord::new(RID, "u1", ResourceState::Active));
        f.guard.verify(RID, "u1", OwnershipPolicy::default()).await.unwrap();

        assert!(f.guard.invalidate(RID, "u1").await.unwrap());
        assert!(!f.guard.invalidate(RID, "u1").await.unwrap());
        assert!(f.guard.invalidate("bad", "u1").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_records_untrusted() {
        let f = fixture();
        let now = Utc::now();
        let policy = OwnershipPolicy::default();

        let fresh = OwnershipCacheRecord::positive(ResourceState::Active, now);
        assert!(f.guard.trusted_verdict(&fresh, policy, now).is_some());

        let stale = OwnershipCacheRecord::positive(
            ResourceState::Active,
            now - chrono::Duration::seconds(300),
        );
        assert!(f.guard.trusted_verdict(&stale, policy, now).is_none());

        let stale_negative = OwnershipCacheRecord::negative(now - chrono::Duration::seconds(61));
        assert!(f.guard.trusted_verdict(&stale_negative, policy, now).is_none());

        let future = OwnershipCacheRecord::negative(now + chrono::Duration::seconds(10));
        assert!(f.guard.trusted_verdict(&future, policy, now).is_none());
    }

    #[test]
    fn test_cache_record_wire_format() {
        let ts = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap().with_timezone(&Utc);

        let negative = serde_json::to_value(OwnershipCacheRecord::negative(ts)).unwrap();
        assert_eq!(negative["isOwner"], false);
        assert_eq!(negative["resourceState"], "unknown");

        let positive = serde_json::to_value(OwnershipCacheRecord::positive(ResourceState::Archived, ts))
            .unwrap();
        assert_eq!(positive["resourceState"], "archived");

        let parsed: OwnershipCacheRecord = serde_json::from_value(negative).unwrap();
        assert_eq!(parsed.resource_state, None);
    }
}
