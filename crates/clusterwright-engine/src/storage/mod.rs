//! Snapshot stores for last-applied specs and observed state
//!
//! Two backends ship with the engine:
//! - **File**: one pretty-printed JSON document per cluster, for local use and the CLI
//! - **Mock**: in-memory, with operation counters for test assertions
//!
//! Stores only ever see redacted specs. Write-only fields are stripped before
//! a [`StoredCluster`] is built.

mod file;
mod mock;

pub use file::FileStateStore;
pub use mock::{MockStateStore, OperationCounts};

use async_trait::async_trait;
use clusterwright_core::ClusterId;

use crate::error::{EngineError, Result};
use crate::snapshot::StoredCluster;

/// Persistence for cluster snapshots
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the snapshot for a cluster
    async fn get(&self, id: &ClusterId) -> Result<StoredCluster>;

    /// Insert or replace the snapshot for `cluster.id`
    async fn put(&self, cluster: &StoredCluster) -> Result<()>;

    /// Remove and return the snapshot for a cluster
    async fn delete(&self, id: &ClusterId) -> Result<StoredCluster>;

    /// All snapshots, ordered by identifier
    async fn list(&self) -> Result<Vec<StoredCluster>>;

    /// Check if a snapshot exists
    async fn exists(&self, id: &ClusterId) -> Result<bool> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(EngineError::SnapshotNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get the snapshot, treating a missing one as `None`
    async fn find(&self, id: &ClusterId) -> Result<Option<StoredCluster>> {
        match self.get(id).await {
            Ok(stored) => Ok(Some(stored)),
            Err(EngineError::SnapshotNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Serialize a snapshot to pretty JSON
pub fn serialize_snapshot(cluster: &StoredCluster) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(cluster)?)
}

/// Deserialize a snapshot from JSON
pub fn deserialize_snapshot(data: &[u8]) -> Result<StoredCluster> {
    Ok(serde_json::from_slice(data)?)
}
