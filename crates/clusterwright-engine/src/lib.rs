//! Clusterwright Engine - reconciliation of multi-role compute clusters
//!
//! This crate provides:
//! - **Differ**: Compare a desired spec with observed state and the last-applied spec
//! - **Reconciler**: Create, update, replace and delete clusters through a [`ControlPlane`]
//! - **Polling**: Cancellable waits on long-running remote operations
//! - **Importer**: Adopt an existing cluster by reconstructing its spec
//! - **Storage**: Persist last-applied specs and observed state (file or in-memory)
//! - **Locking**: One mutating reconciliation per cluster identifier at a time

pub mod config;
pub mod diff;
pub mod error;
pub mod import;
pub mod lock;
pub mod poll;
pub mod reconciler;
pub mod remote;
pub mod retry;
pub mod snapshot;
pub mod storage;

pub use config::{DEFAULT_DNS_SUFFIX, EngineConfig};
pub use diff::{ChangeSet, ClusterUpdate, Drift, FieldChange, Operation, diff, diff_with_last_applied};
pub use error::{EngineError, Result};
pub use import::reconstruct;
pub use lock::{ClusterGuard, LockRegistry};
pub use poll::{
    CancelHandle, CancelToken, OperationKind, PollHandle, PollOptions, Tracking,
    poll_until_terminal,
};
pub use reconciler::{ApplyOptions, ApplyOutcome, Reconciler};
pub use remote::{
    ControlPlane, MockCall, MockControlPlane, OperationId, OperationStatus, RemoteCounts,
    RemoteError, RemoteResult,
};
pub use retry::{Backoff, RetryConfig, retry_with_backoff};
pub use snapshot::{LifecyclePhase, StoredCluster};
pub use storage::{FileStateStore, MockStateStore, OperationCounts, StateStore};
