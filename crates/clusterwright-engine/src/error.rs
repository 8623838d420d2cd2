//! Error types for clusterwright-engine

use clusterwright_core::{ClusterId, CoreError, ValidationError};
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while reconciling a cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Spec failed pre-flight validation; nothing was sent to the remote
    #[error("spec has {} validation error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// Replacement required but not allowed by the caller
    #[error("cluster '{id}' requires replacement: immutable field(s) changed: {}\nHint: re-run with replacement allowed to delete and recreate the cluster", .fields.join(", "))]
    ImmutableFieldChanged { id: ClusterId, fields: Vec<String> },

    /// Throttling or 5xx-equivalent; retried with backoff
    #[error("transient remote error during {operation}: {message}")]
    RemoteTransient { operation: String, message: String },

    /// Remote reported a terminal failure (reason is verbatim)
    #[error("cluster '{id}' failed: {reason}")]
    RemoteTerminal { id: ClusterId, reason: String },

    /// Local wait abandoned; the remote operation may still be in flight
    #[error("timed out after {elapsed:?} waiting on cluster '{id}'; the remote operation may still be in progress")]
    Timeout { id: ClusterId, elapsed: Duration },

    /// Resource missing remotely when expected present
    #[error("cluster '{id}' not found (deleted out of band?)")]
    NotFound { id: ClusterId },

    /// No persisted snapshot for the identifier
    #[error("no stored snapshot for cluster '{id}'")]
    SnapshotNotFound { id: ClusterId },

    /// Create against a cluster that already exists remotely
    #[error("cluster '{id}' already exists\nHint: import it before managing it")]
    AlreadyExists { id: ClusterId },

    /// Local wait cancelled by the caller
    #[error("wait on cluster '{id}' was cancelled; the remote operation continues")]
    Cancelled { id: ClusterId },

    /// Another mutating operation holds the cluster
    #[error("another operation is in progress for cluster '{id}': {status}")]
    OperationInProgress { id: ClusterId, status: String },

    #[error("invalid cluster identifier: {0}")]
    InvalidIdentifier(String),

    /// Spec document could not be loaded
    #[error("spec error: {0}")]
    Spec(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidIdentifier { .. } => EngineError::InvalidIdentifier(e.to_string()),
            CoreError::Io(io) => EngineError::Io(io),
            CoreError::YamlParse(_) | CoreError::JsonParse(_) => {
                EngineError::Serialization(e.to_string())
            }
            other => EngineError::Spec(other.to_string()),
        }
    }
}

impl EngineError {
    /// Whether the failure is worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::RemoteTransient { .. })
    }

    /// Check if the cluster (or its snapshot) does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. } | EngineError::SnapshotNotFound { .. }
        )
    }

    /// Whether the remote operation may still be running
    pub fn is_wait_abandoned(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::Cancelled { .. }
        )
    }
}
