//! Long-running operation polling
//!
//! [`poll_until_terminal`] is an explicit loop: probe, check the outcome,
//! sleep, repeat. It runs on the caller's task. A deadline or a
//! [`CancelToken`] stops the local wait promptly; neither touches the remote
//! operation, which keeps running on its own.

use chrono::{DateTime, Utc};
use clusterwright_core::{ClusterId, ClusterState, ProvisioningState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::remote::{ControlPlane, OperationId, OperationStatus};
use crate::retry::{RetryConfig, retry_with_backoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// What a poll handle watches to decide completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum Tracking {
    /// The remote operation's own status
    Operation { operation: OperationId },
    /// The resource state (used when the operation id was lost)
    ResourceState,
    /// Nothing to wait for
    Satisfied,
}

/// Handle to an in-flight mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHandle {
    pub id: ClusterId,
    pub kind: OperationKind,
    pub tracking: Tracking,
    pub submitted_at: DateTime<Utc>,
}

impl PollHandle {
    pub fn for_operation(id: ClusterId, kind: OperationKind, operation: OperationId) -> Self {
        Self::new(id, kind, Tracking::Operation { operation })
    }

    pub fn for_resource(id: ClusterId, kind: OperationKind) -> Self {
        Self::new(id, kind, Tracking::ResourceState)
    }

    /// Handle for an operation whose goal already holds
    pub fn satisfied(id: ClusterId, kind: OperationKind) -> Self {
        Self::new(id, kind, Tracking::Satisfied)
    }

    fn new(id: ClusterId, kind: OperationKind, tracking: Tracking) -> Self {
        Self {
            id,
            kind,
            tracking,
            submitted_at: Utc::now(),
        }
    }

    pub fn operation(&self) -> Option<&OperationId> {
        match &self.tracking {
            Tracking::Operation { operation } => Some(operation),
            _ => None,
        }
    }
}

/// Caller side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Stop every wait holding a token from this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed by waits
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a linked handle/token pair
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_, token) = Self::pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled; pend forever if the handle is dropped first
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Timing policy for one wait
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

enum Probe {
    Pending(String),
    Done(ClusterState),
}

/// Wait for the operation behind `handle` to reach a terminal state
///
/// Returns the observed state once Running (or a tombstone once a delete
/// finishes). A remote `Error` state surfaces as [`EngineError::RemoteTerminal`]
/// with the vendor's reason. Transient failures while probing are retried.
pub async fn poll_until_terminal<C>(
    control_plane: &C,
    handle: &PollHandle,
    options: &PollOptions,
    cancel: &CancelToken,
) -> Result<ClusterState>
where
    C: ControlPlane + ?Sized,
{
    let start = Instant::now();
    let deadline = start + options.timeout;
    let mut cancel = cancel.clone();
    let mut tick = 0u32;

    let timed_out = || EngineError::Timeout {
        id: handle.id.clone(),
        elapsed: start.elapsed(),
    };
    let cancelled = || EngineError::Cancelled {
        id: handle.id.clone(),
    };

    loop {
        tick += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep_until(deadline) => return Err(timed_out()),
            outcome = probe(control_plane, handle, &options.retry) => outcome?,
        };

        match outcome {
            Probe::Done(state) => {
                debug!(
                    cluster = %handle.id,
                    operation = %handle.kind,
                    tick = tick,
                    state = %state.provisioning_state,
                    "Operation reached terminal state"
                );
                return Ok(state);
            }
            Probe::Pending(status) => {
                debug!(
                    cluster = %handle.id,
                    operation = %handle.kind,
                    tick = tick,
                    status = %status,
                    "Operation still in progress"
                );
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep_until(deadline) => return Err(timed_out()),
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
}

async fn probe<C>(control_plane: &C, handle: &PollHandle, retry: &RetryConfig) -> Result<Probe>
where
    C: ControlPlane + ?Sized,
{
    let id = &handle.id;

    match &handle.tracking {
        Tracking::Satisfied => Ok(Probe::Done(ClusterState::deleted(id.clone()))),

        Tracking::Operation { operation } => {
            let status = retry_with_backoff(retry, "get_operation_status", move || async move {
                control_plane
                    .get_operation_status(operation)
                    .await
                    .map_err(|e| e.into_engine("get_operation_status", id))
            })
            .await?;

            match status {
                OperationStatus::InProgress => Ok(Probe::Pending("operation in progress".into())),
                OperationStatus::Failed { reason } => Err(EngineError::RemoteTerminal {
                    id: id.clone(),
                    reason,
                }),
                OperationStatus::Succeeded => probe_resource(control_plane, handle, retry).await,
            }
        }

        Tracking::ResourceState => probe_resource(control_plane, handle, retry).await,
    }
}

async fn probe_resource<C>(
    control_plane: &C,
    handle: &PollHandle,
    retry: &RetryConfig,
) -> Result<Probe>
where
    C: ControlPlane + ?Sized,
{
    let id = &handle.id;
    let state = retry_with_backoff(retry, "get_resource_state", move || async move {
        control_plane
            .get_resource_state(id)
            .await
            .map_err(|e| e.into_engine("get_resource_state", id))
    })
    .await;

    match (handle.kind, state) {
        (OperationKind::Delete, Err(e)) if e.is_not_found() => {
            Ok(Probe::Done(ClusterState::deleted(id.clone())))
        }
        (_, Err(e)) => Err(e),
        (OperationKind::Delete, Ok(state)) => match state.provisioning_state {
            ProvisioningState::Deleted => Ok(Probe::Done(state)),
            ProvisioningState::Error => Err(terminal(state)),
            other => Ok(Probe::Pending(other.to_string())),
        },
        (_, Ok(state)) => match state.provisioning_state {
            ProvisioningState::Running => Ok(Probe::Done(state)),
            ProvisioningState::Error => Err(terminal(state)),
            other => Ok(Probe::Pending(other.to_string())),
        },
    }
}

fn terminal(state: ClusterState) -> EngineError {
    EngineError::RemoteTerminal {
        reason: state
            .failure_reason
            .unwrap_or_else(|| "cluster entered the Error state".to_string()),
        id: state.id,
    }
}
