//! File-based snapshot store
//!
//! Each cluster is one `<resource-group>+<name>.json` document under the base
//! directory. Useful for local development, offline planning and inspection.

use async_trait::async_trait;
use clusterwright_core::ClusterId;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{StateStore, deserialize_snapshot, serialize_snapshot};
use crate::error::{EngineError, Result};
use crate::snapshot::StoredCluster;

/// File-based snapshot store
#[derive(Debug, Clone)]
pub struct FileStateStore {
    base_dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn snapshot_path(&self, id: &ClusterId) -> Result<PathBuf> {
        // Keys must stay a single file name inside base_dir
        id.check()?;
        Ok(self.base_dir.join(format!("{}.json", id.storage_key())))
    }

    fn read_snapshot(&self, path: &Path) -> Result<StoredCluster> {
        let data = std::fs::read(path)?;
        deserialize_snapshot(&data)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, id: &ClusterId) -> Result<StoredCluster> {
        let path = self.snapshot_path(id)?;
        if !path.exists() {
            return Err(EngineError::SnapshotNotFound { id: id.clone() });
        }
        self.read_snapshot(&path)
    }

    async fn put(&self, cluster: &StoredCluster) -> Result<()> {
        let path = self.snapshot_path(&cluster.id)?;
        let tmp = path.with_extension("json.tmp");

        // Replace atomically via rename
        std::fs::write(&tmp, serialize_snapshot(cluster)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn delete(&self, id: &ClusterId) -> Result<StoredCluster> {
        let stored = self.get(id).await?;
        std::fs::remove_file(self.snapshot_path(id)?)?;
        Ok(stored)
    }

    async fn list(&self) -> Result<Vec<StoredCluster>> {
        let mut snapshots = Vec::new();

        for path in std::fs::read_dir(&self.base_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        {
            match self.read_snapshot(&path) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot"),
            }
        }

        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }
}
