//! Group store — where live group aggregates reside
//!
//! Each group is held behind its own async mutex; that mutex is the
//! per-aggregate serialization point the concurrency model requires.
//! There is no global lock — the store's own map lock is held only long
//! enough to look up or insert a handle, never across an operation.

use async_trait::async_trait;
use groupbid_engine::GroupCoordinator;
use groupbid_types::GroupId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A live group aggregate behind its per-group lock
pub type GroupHandle = Arc<Mutex<GroupCoordinator>>;

/// Errors from the group store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Group already exists: {0}")]
    AlreadyExists(GroupId),

    #[error("Group store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for live group aggregates
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Insert a freshly created group
    async fn insert(&self, coordinator: GroupCoordinator) -> StoreResult<GroupHandle>;

    /// Look up a group handle
    async fn get(&self, id: &GroupId) -> StoreResult<Option<GroupHandle>>;

    /// All group handles (for the sweeper and list queries)
    async fn list(&self) -> StoreResult<Vec<GroupHandle>>;

    /// Remove a group; returns whether it existed
    async fn remove(&self, id: &GroupId) -> StoreResult<bool>;
}

/// In-memory group store
pub struct InMemoryGroupStore {
    groups: RwLock<HashMap<GroupId, GroupHandle>>,
}

impl Default for InMemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGroupStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn insert(&self, coordinator: GroupCoordinator) -> StoreResult<GroupHandle> {
        let id = coordinator.id().clone();
        let mut groups = self.groups.write().await;
        if groups.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let handle: GroupHandle = Arc::new(Mutex::new(coordinator));
        groups.insert(id, handle.clone());
        Ok(handle)
    }

    async fn get(&self, id: &GroupId) -> StoreResult<Option<GroupHandle>> {
        let groups = self.groups.read().await;
        Ok(groups.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<GroupHandle>> {
        let groups = self.groups.read().await;
        Ok(groups.values().cloned().collect())
    }

    async fn remove(&self, id: &GroupId) -> StoreResult<bool> {
        let mut groups = self.groups.write().await;
        Ok(groups.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use groupbid_types::{GeoScope, GroupSpec, UserId};

    fn make_coordinator() -> GroupCoordinator {
        let now = Utc::now();
        let spec = GroupSpec::new(
            "Test",
            "roofing",
            GeoScope::Region("here".into()),
            1,
            5,
            now + Duration::days(7),
            now + Duration::days(30),
            UserId::new("creator"),
        );
        GroupCoordinator::new(spec, vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = InMemoryGroupStore::new();
        let coordinator = make_coordinator();
        let id = coordinator.id().clone();

        store.insert(coordinator).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.remove(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(!store.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_handles_share_state() {
        let store = InMemoryGroupStore::new();
        let coordinator = make_coordinator();
        let id = coordinator.id().clone();
        store.insert(coordinator).await.unwrap();

        // Two lookups return the same aggregate
        let a = store.get(&id).await.unwrap().unwrap();
        let b = store.get(&id).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
