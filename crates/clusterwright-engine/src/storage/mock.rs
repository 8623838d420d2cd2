//! In-memory snapshot store for testing

use async_trait::async_trait;
use clusterwright_core::ClusterId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::StateStore;
use crate::error::{EngineError, Result};
use crate::snapshot::StoredCluster;

/// In-memory snapshot store
#[derive(Clone, Default)]
pub struct MockStateStore {
    store: Arc<RwLock<HashMap<ClusterId, StoredCluster>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// When set, every put fails without storing anything
    fail_puts: Arc<AtomicBool>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub puts: usize,
    pub deletes: usize,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated snapshots
    pub fn with_snapshots(snapshots: Vec<StoredCluster>) -> Self {
        let store = Self::new();
        {
            let mut map = store.store.write().unwrap_or_else(PoisonError::into_inner);
            for snapshot in snapshots {
                map.insert(snapshot.id.clone(), snapshot);
            }
        }
        store
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_counts(&self) {
        *self.operations.write().unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    /// Make subsequent puts fail (or succeed again)
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot_count(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        let mut ops = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *ops);
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn get(&self, id: &ClusterId) -> Result<StoredCluster> {
        self.count(|ops| ops.gets += 1);
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SnapshotNotFound { id: id.clone() })
    }

    async fn put(&self, cluster: &StoredCluster) -> Result<()> {
        self.count(|ops| ops.puts += 1);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(EngineError::Storage(format!(
                "write of snapshot '{}' refused",
                cluster.id
            )));
        }
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cluster.id.clone(), cluster.clone());
        Ok(())
    }

    async fn delete(&self, id: &ClusterId) -> Result<StoredCluster> {
        self.count(|ops| ops.deletes += 1);
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| EngineError::SnapshotNotFound { id: id.clone() })
    }

    async fn list(&self) -> Result<Vec<StoredCluster>> {
        self.count(|ops| ops.lists += 1);
        let mut snapshots: Vec<StoredCluster> = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::LifecyclePhase;
    use clusterwright_core::{ClusterSpec, Gateway, Roles, Tier};

    fn snapshot(name: &str) -> StoredCluster {
        let spec = ClusterSpec {
            name: name.to_string(),
            resource_group: "rg".to_string(),
            location: "westeurope".to_string(),
            cluster_version: "3.6".to_string(),
            tier: Tier::Standard,
            rstudio_enabled: false,
            gateway: Gateway::default(),
            storage_accounts: vec![],
            roles: Roles::new(),
        };
        StoredCluster::new(&spec, LifecyclePhase::Running)
    }

    #[tokio::test]
    async fn test_mock_put_and_get() {
        let store = MockStateStore::new();
        let stored = snapshot("c1");
        store.put(&stored).await.unwrap();

        let retrieved = store.get(&stored.id).await.unwrap();
        assert_eq!(retrieved, stored);

        let counts = store.operation_counts();
        assert_eq!(counts.puts, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_mock_get_not_found() {
        let store = MockStateStore::new();
        let result = store.get(&ClusterId::new("rg", "missing")).await;
        assert!(matches!(result, Err(EngineError::SnapshotNotFound { .. })));
        assert!(!store.exists(&ClusterId::new("rg", "missing")).await.unwrap());
        assert!(store.find(&ClusterId::new("rg", "missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_put_replaces() {
        let store = MockStateStore::new();
        let first = snapshot("c1");
        store.put(&first).await.unwrap();

        let second = first.next(&first.spec, LifecyclePhase::failed("boom"));
        store.put(&second).await.unwrap();

        assert_eq!(store.snapshot_count(), 1);
        assert_eq!(store.get(&first.id).await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_mock_list_sorted() {
        let store = MockStateStore::with_snapshots(vec![snapshot("b"), snapshot("a")]);
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mock_delete() {
        let store = MockStateStore::with_snapshots(vec![snapshot("c1")]);
        let id = ClusterId::new("rg", "c1");

        let deleted = store.delete(&id).await.unwrap();
        assert_eq!(deleted.id, id);
        assert!(matches!(
            store.delete(&id).await,
            Err(EngineError::SnapshotNotFound { .. })
        ));

        store.reset_counts();
        assert_eq!(store.operation_counts(), OperationCounts::default());
    }

    #[tokio::test]
    async fn test_mock_put_failure_switch() {
        let store = MockStateStore::new();
        store.set_fail_puts(true);
        assert!(matches!(
            store.put(&snapshot("c1")).await,
            Err(EngineError::Storage(_))
        ));
        assert_eq!(store.snapshot_count(), 0);

        store.set_fail_puts(false);
        store.put(&snapshot("c1")).await.unwrap();
        assert_eq!(store.snapshot_count(), 1);
        assert_eq!(store.operation_counts().puts, 2);
    }
}
