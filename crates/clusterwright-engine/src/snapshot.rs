//! Persisted cluster snapshots with a lifecycle state machine

use chrono::{DateTime, Duration, Utc};
use clusterwright_core::{ClusterId, ClusterSpec, ClusterState};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::remote::OperationId;

/// Last-applied spec and last-observed state for one cluster
///
/// The spec is always stored redacted; secrets never reach a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCluster {
    pub id: ClusterId,

    /// Last-applied spec, write-only fields stripped
    pub spec: ClusterSpec,

    /// Last observed remote state
    #[serde(default)]
    pub state: Option<ClusterState>,

    pub phase: LifecyclePhase,

    /// Incremented on every write
    pub revision: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredCluster {
    /// First snapshot for a cluster
    pub fn new(spec: &ClusterSpec, phase: LifecyclePhase) -> Self {
        let now = Utc::now();
        Self {
            id: spec.id(),
            spec: spec.redacted(),
            state: None,
            phase,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next revision of this snapshot
    pub fn next(&self, spec: &ClusterSpec, phase: LifecyclePhase) -> Self {
        Self {
            id: self.id.clone(),
            spec: spec.redacted(),
            state: self.state.clone(),
            phase,
            revision: self.revision + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: ClusterState) -> Self {
        self.state = Some(state);
        self
    }

    /// Whether a mutating operation recorded here is still within its timeout
    pub fn is_busy(&self) -> bool {
        self.phase.is_pending() && !self.phase.is_stale()
    }
}

/// Where a cluster is in its Create/Update/Delete lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LifecyclePhase {
    /// Create submitted, not yet Running
    Creating {
        started_at: DateTime<Utc>,
        #[serde(with = "humantime_serde")]
        timeout: std::time::Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<OperationId>,
    },

    Running,

    /// Mutable-field update submitted
    Updating {
        started_at: DateTime<Utc>,
        #[serde(with = "humantime_serde")]
        timeout: std::time::Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<OperationId>,
    },

    /// Delete submitted (also the first half of a replacement)
    Deleting {
        started_at: DateTime<Utc>,
        #[serde(with = "humantime_serde")]
        timeout: std::time::Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<OperationId>,
        #[serde(default)]
        replacing: bool,
    },

    /// Remote reported a terminal failure
    Failed {
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl LifecyclePhase {
    pub fn creating(timeout: std::time::Duration) -> Self {
        Self::Creating {
            started_at: Utc::now(),
            timeout,
            operation: None,
        }
    }

    pub fn updating(timeout: std::time::Duration) -> Self {
        Self::Updating {
            started_at: Utc::now(),
            timeout,
            operation: None,
        }
    }

    pub fn deleting(timeout: std::time::Duration, replacing: bool) -> Self {
        Self::Deleting {
            started_at: Utc::now(),
            timeout,
            operation: None,
            replacing,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }

    /// Record the remote operation id on a pending phase
    pub fn with_operation(mut self, id: Option<&OperationId>) -> Self {
        match &mut self {
            Self::Creating { operation, .. }
            | Self::Updating { operation, .. }
            | Self::Deleting { operation, .. } => *operation = id.cloned(),
            Self::Running | Self::Failed { .. } => {}
        }
        self
    }

    /// Check if this is a pending (transitional) phase
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Creating { .. } | Self::Updating { .. } | Self::Deleting { .. }
        )
    }

    /// Check if this pending phase has outlived its timeout
    pub fn is_stale(&self) -> bool {
        match self.elapsed_and_timeout() {
            Some((elapsed, timeout)) => elapsed > timeout,
            None => false,
        }
    }

    fn elapsed_and_timeout(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Creating {
                started_at,
                timeout,
                ..
            }
            | Self::Updating {
                started_at,
                timeout,
                ..
            }
            | Self::Deleting {
                started_at,
                timeout,
                ..
            } => {
                let timeout = Duration::from_std(*timeout).unwrap_or(Duration::MAX);
                Some((Utc::now().signed_duration_since(*started_at), timeout))
            }
            _ => None,
        }
    }

    /// Human-readable status name
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Creating { .. } => "creating",
            Self::Running => "running",
            Self::Updating { .. } => "updating",
            Self::Deleting {
                replacing: true, ..
            } => "replacing",
            Self::Deleting { .. } => "deleting",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason, .. } => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.status_name()),
        }
    }
}
