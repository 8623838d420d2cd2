//! Per-identifier serialization
//!
//! At most one mutating reconciliation runs per cluster identifier. Distinct
//! identifiers never contend with each other.

use clusterwright_core::ClusterId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Registry of per-identifier locks
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<ClusterId, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one reconciliation, polling included
#[derive(Debug)]
pub struct ClusterGuard {
    id: ClusterId,
    _guard: OwnedMutexGuard<()>,
}

impl ClusterGuard {
    pub fn id(&self) -> &ClusterId {
        &self.id
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &ClusterId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop entries nobody holds or waits on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id.clone()).or_default().clone()
    }

    /// Wait until the identifier is free, then hold it
    pub async fn acquire(&self, id: &ClusterId) -> ClusterGuard {
        let lock = self.entry(id);
        if lock.try_lock().is_err() {
            debug!(cluster = %id, "Waiting for in-flight reconciliation");
        }
        ClusterGuard {
            id: id.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Hold the identifier or fail immediately with `OperationInProgress`
    pub fn try_acquire(&self, id: &ClusterId) -> Result<ClusterGuard> {
        let lock = self.entry(id);
        let guard = lock
            .try_lock_owned()
            .map_err(|_| EngineError::OperationInProgress {
                id: id.clone(),
                status: "locked by another reconciliation".to_string(),
            })?;
        Ok(ClusterGuard {
            id: id.clone(),
            _guard: guard,
        })
    }

    /// Whether some reconciliation currently holds the identifier
    pub fn is_locked(&self, id: &ClusterId) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
