//! Control-plane boundary
//!
//! The engine never talks HTTP itself. A [`ControlPlane`] implementation wraps
//! whatever client reaches the vendor API; the engine only needs the five calls
//! below. [`MockControlPlane`] is an in-memory implementation for tests and
//! offline use.

mod mock;

pub use mock::{MockCall, MockControlPlane, RemoteCounts};

use async_trait::async_trait;
use clusterwright_core::{ClusterId, ClusterSpec, ClusterState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::diff::ClusterUpdate;
use crate::error::EngineError;

/// Vendor-agnostic handle to a long-running remote operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed { reason: String },
}

/// Errors a control plane reports
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Throttled or temporarily unavailable
    #[error("{0}")]
    Transient(String),

    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    Conflict,

    /// Rejected for good; the message is the vendor's reason
    #[error("{0}")]
    Terminal(String),
}

impl RemoteError {
    /// Map to the engine taxonomy for a call made on behalf of `id`
    pub fn into_engine(self, operation: &str, id: &ClusterId) -> EngineError {
        match self {
            RemoteError::Transient(message) => EngineError::RemoteTransient {
                operation: operation.to_string(),
                message,
            },
            RemoteError::NotFound => EngineError::NotFound { id: id.clone() },
            RemoteError::Conflict => EngineError::AlreadyExists { id: id.clone() },
            RemoteError::Terminal(reason) => EngineError::RemoteTerminal {
                id: id.clone(),
                reason,
            },
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote control plane for cluster resources
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit a full spec, credentials included, in a single request
    async fn submit_create(&self, spec: &ClusterSpec) -> RemoteResult<OperationId>;

    /// Submit a mutable-field delta
    async fn submit_update(&self, id: &ClusterId, update: &ClusterUpdate)
    -> RemoteResult<OperationId>;

    async fn submit_delete(&self, id: &ClusterId) -> RemoteResult<OperationId>;

    async fn get_operation_status(&self, operation: &OperationId) -> RemoteResult<OperationStatus>;

    /// Current observed state; `NotFound` when the cluster does not exist
    async fn get_resource_state(&self, id: &ClusterId) -> RemoteResult<ClusterState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_mapping() {
        let id = ClusterId::new("rg", "c1");
        assert!(
            RemoteError::Transient("429".into())
                .into_engine("read", &id)
                .is_retryable()
        );
        assert!(RemoteError::NotFound.into_engine("read", &id).is_not_found());
        assert!(matches!(
            RemoteError::Conflict.into_engine("create", &id),
            EngineError::AlreadyExists { .. }
        ));
        match RemoteError::Terminal("SKU not available".into()).into_engine("create", &id) {
            EngineError::RemoteTerminal { reason, .. } => assert_eq!(reason, "SKU not available"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
