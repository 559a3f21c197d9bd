//! Ownership record store trait and in-memory implementation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::StorageResult,
    ownership::{OwnershipFilter, ResourceRecord, ResourceState},
};

/// Read access to the authoritative ownership records.
///
/// Unlike the cache, this store is the authority: implementations must
/// surface failures as errors rather than as "not found".
#[async_trait]
pub trait OwnershipRecordStore: Send + Sync {
    /// Returns the first record matching `filter`, projected to
    /// `{id, owner_id, state}`.
    #[must_use = "store lookups may fail and errors must be handled"]
    async fn find_one(&self, filter: &OwnershipFilter) -> StorageResult<Option<ResourceRecord>>;
}

/// In-memory implementation of [`OwnershipRecordStore`] for testing.
///
/// Records are indexed by resource id.
#[derive(Debug, Default, Clone)]
pub struct MemoryOwnershipStore {
    records: Arc<RwLock<HashMap<String, ResourceRecord>>>,
}

impl MemoryOwnershipStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: ResourceRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    /// Changes the state of an existing record. Returns `false` if absent.
    pub fn set_state(&self, resource_id: &str, state: ResourceState) -> bool {
        match self.records.write().get_mut(resource_id) {
            Some(record) => {
                record.state = state;
                true
            },
            None => false,
        }
    }

    /// Removes a record entirely.
    pub fn remove(&self, resource_id: &str) -> Option<ResourceRecord> {
        self.records.write().remove(resource_id)
    }
}

#[async_trait]
impl OwnershipRecordStore for MemoryOwnershipStore {
    #[tracing::instrument(skip(self), fields(resource_id = %filter.resource_id))]
    async fn find_one(&self, filter: &OwnershipFilter) -> StorageResult<Option<ResourceRecord>> {
        let records = self.records.read();
        Ok(records.get(&filter.resource_id).filter(|record| filter.matches(record)).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ownership::StateConstraint;

    fn store_with(record: ResourceRecord) -> MemoryOwnershipStore {
        let store = MemoryOwnershipStore::new();
        store.insert(record);
        store
    }

    #[tokio::test]
    async fn test_find_owned_active() {
        let store = store_with(ResourceRecord::new("r1", "u1", ResourceState::Active));
        let filter = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(false));

        let found = store.find_one(&filter).await.unwrap();
        assert_eq!(found, Some(ResourceRecord::new("r1", "u1", ResourceState::Active)));
    }

    #[tokio::test]
    async fn test_archived_requires_wide_filter() {
        let store = store_with(ResourceRecord::new("r1", "u1", ResourceState::Archived));

        let narrow = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(false));
        assert!(store.find_one(&narrow).await.unwrap().is_none());

        let wide = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(true));
        assert!(store.find_one(&wide).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deleted_never_found() {
        let store = store_with(ResourceRecord::new("r1", "u1", ResourceState::Deleted));

        let wide = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(true));
        assert!(store.find_one(&wide).await.unwrap().is_none());
        assert!(store.find_one(&OwnershipFilter::existing("r1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_state_and_remove() {
        let store = store_with(ResourceRecord::new("r1", "u1", ResourceState::Active));
        assert!(store.set_state("r1", ResourceState::Archived));
        assert!(!store.set_state("missing", ResourceState::Archived));

        assert!(store.remove("r1").is_some());
        assert!(store.find_one(&OwnershipFilter::existing("r1")).await.unwrap().is_none());
    }
}
