//! Reconciler - drives a cluster from observed state to desired state
//!
//! The low-level operations (`create`, `update`, `delete`, `read`,
//! `poll_until_terminal`, `import_from`) each map onto one step of the
//! lifecycle. `plan`, `apply` and `destroy` compose them under the
//! per-identifier lock and record every transition in the [`StateStore`].
//!
//! ```text
//! Absent -> Creating -> Running -> Updating -> Running -> Deleting -> Absent
//!              |                      |                      |
//!              +-------> Error <------+----------------------+
//! ```
//!
//! Replacement is `Deleting` followed by `Creating`; the old cluster is never
//! mutated in place.

use clusterwright_core::{ClusterId, ClusterSpec, ClusterState, ProvisioningState};
use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::diff::{self, ChangeSet, ClusterUpdate, Operation};
use crate::error::{EngineError, Result};
use crate::import::{reconstruct, unrecoverable_fields};
use crate::lock::{ClusterGuard, LockRegistry};
use crate::poll::{self, CancelToken, OperationKind, PollHandle, PollOptions};
use crate::remote::{ControlPlane, RemoteError};
use crate::retry::{Backoff, retry_with_backoff};
use crate::snapshot::{LifecyclePhase, StoredCluster};
use crate::storage::StateStore;

/// Caller controls for [`Reconciler::apply`]
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Carry out a delete-then-create when an immutable field changed
    pub allow_replace: bool,

    /// Wait for another reconciliation of the same cluster instead of failing
    pub wait_for_lock: bool,

    pub cancel: CancelToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            allow_replace: false,
            wait_for_lock: true,
            cancel: CancelToken::never(),
        }
    }
}

impl ApplyOptions {
    pub fn allow_replace(mut self) -> Self {
        self.allow_replace = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.wait_for_lock = false;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What one `apply` did
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub change_set: ChangeSet,

    /// Observed state after the change set was carried out
    pub state: ClusterState,
}

/// Reconciliation engine over a control plane and a snapshot store
pub struct Reconciler<C, S> {
    control_plane: C,
    store: S,
    config: EngineConfig,
    locks: LockRegistry,
}

impl<C: ControlPlane, S: StateStore> Reconciler<C, S> {
    pub fn new(control_plane: C, store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            control_plane,
            store,
            config,
            locks: LockRegistry::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pre-flight validation; never contacts the remote
    pub fn validate(&self, spec: &ClusterSpec) -> Result<()> {
        let errors = clusterwright_core::validate(spec);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(errors))
        }
    }

    /// Compare desired state with observed state
    pub fn diff(&self, desired: &ClusterSpec, observed: Option<&ClusterState>) -> ChangeSet {
        diff::diff(desired, observed)
    }

    /// Submit the full spec, credentials included, and return without waiting
    ///
    /// Fails with `AlreadyExists` when the identifier already exists remotely.
    pub async fn create(&self, spec: &ClusterSpec) -> Result<(ClusterId, PollHandle)> {
        self.validate(spec)?;
        let id = spec.id();

        if self.find_remote(&id).await?.is_some() {
            return Err(EngineError::AlreadyExists { id });
        }

        let handle = self.submit_create(spec).await?;
        info!(cluster = %id, operation = ?handle.operation(), "Create submitted");
        Ok((id, handle))
    }

    /// Submit a create; after a transient failure, confirm the cluster is
    /// still absent before submitting again
    async fn submit_create(&self, spec: &ClusterSpec) -> Result<PollHandle> {
        let id = spec.id();
        let retry = &self.config.retry;
        let mut backoff = Backoff::new(retry);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.control_plane.submit_create(spec).await {
                Ok(operation) => {
                    return Ok(PollHandle::for_operation(id, OperationKind::Create, operation));
                }
                Err(RemoteError::Transient(message)) if attempt < retry.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        cluster = %id,
                        attempt = attempt,
                        error = %message,
                        delay_ms = delay.as_millis(),
                        "Create submission failed, confirming absence before resubmitting"
                    );
                    tokio::time::sleep(delay).await;

                    if let Some(state) = self.find_remote(&id).await? {
                        info!(
                            cluster = %id,
                            state = %state.provisioning_state,
                            "Create landed despite the failed response, tracking resource state"
                        );
                        return Ok(PollHandle::for_resource(id, OperationKind::Create));
                    }
                }
                Err(e) => return Err(e.into_engine("submit_create", &id)),
            }
        }
    }

    /// Submit a mutable-field delta and return without waiting
    pub async fn update(&self, id: &ClusterId, update: &ClusterUpdate) -> Result<PollHandle> {
        if update.is_empty() {
            return Ok(PollHandle::for_resource(id.clone(), OperationKind::Update));
        }

        let control_plane = &self.control_plane;
        let operation = retry_with_backoff(&self.config.retry, "submit_update", move || async move {
            control_plane
                .submit_update(id, update)
                .await
                .map_err(|e| e.into_engine("submit_update", id))
        })
        .await?;

        info!(cluster = %id, operation = %operation, "Update submitted");
        Ok(PollHandle::for_operation(id.clone(), OperationKind::Update, operation))
    }

    /// Submit a delete and return without waiting
    ///
    /// Deleting a cluster that is already gone succeeds with a satisfied handle.
    pub async fn delete(&self, id: &ClusterId) -> Result<PollHandle> {
        let retry = &self.config.retry;
        let mut backoff = Backoff::new(retry);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.control_plane.submit_delete(id).await {
                Ok(operation) => {
                    info!(cluster = %id, operation = %operation, "Delete submitted");
                    return Ok(PollHandle::for_operation(
                        id.clone(),
                        OperationKind::Delete,
                        operation,
                    ));
                }
                Err(RemoteError::NotFound) => {
                    debug!(cluster = %id, "Cluster already absent, nothing to delete");
                    return Ok(PollHandle::satisfied(id.clone(), OperationKind::Delete));
                }
                Err(RemoteError::Transient(message)) if attempt < retry.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        cluster = %id,
                        attempt = attempt,
                        error = %message,
                        delay_ms = delay.as_millis(),
                        "Delete submission failed, confirming state before resubmitting"
                    );
                    tokio::time::sleep(delay).await;

                    match self.find_remote(id).await? {
                        None => {
                            return Ok(PollHandle::satisfied(id.clone(), OperationKind::Delete));
                        }
                        Some(state) if state.provisioning_state == ProvisioningState::Deleting => {
                            info!(cluster = %id, "Delete landed despite the failed response");
                            return Ok(PollHandle::for_resource(id.clone(), OperationKind::Delete));
                        }
                        Some(_) => {}
                    }
                }
                Err(e) => return Err(e.into_engine("submit_delete", id)),
            }
        }
    }

    /// Current observed state, endpoints derived
    ///
    /// A missing (or deleted) cluster is `NotFound` and is never retried.
    pub async fn read(&self, id: &ClusterId) -> Result<ClusterState> {
        let control_plane = &self.control_plane;
        let fetch = retry_with_backoff(&self.config.retry, "read", move || async move {
            control_plane
                .get_resource_state(id)
                .await
                .map_err(|e| e.into_engine("read", id))
        });

        let state = tokio::time::timeout(self.config.read_timeout, fetch)
            .await
            .map_err(|_| EngineError::Timeout {
                id: id.clone(),
                elapsed: self.config.read_timeout,
            })??;

        if state.provisioning_state == ProvisioningState::Deleted {
            return Err(EngineError::NotFound { id: id.clone() });
        }
        Ok(state.with_derived_endpoints(&self.config.dns_suffix))
    }

    async fn find_remote(&self, id: &ClusterId) -> Result<Option<ClusterState>> {
        match self.read(id).await {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Wait for the operation behind `handle` to settle
    ///
    /// `timeout` defaults to the configured timeout for the operation kind.
    pub async fn poll_until_terminal(
        &self,
        handle: &PollHandle,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<ClusterState> {
        let options = PollOptions {
            interval: self.config.poll_interval,
            timeout: timeout.unwrap_or_else(|| self.config.timeout_for(handle.kind)),
            retry: self.config.retry.clone(),
        };
        let state = poll::poll_until_terminal(&self.control_plane, handle, &options, cancel).await?;
        Ok(state.with_derived_endpoints(&self.config.dns_suffix))
    }

    /// Reconstruct a spec from remote state and adopt the cluster
    ///
    /// The reconstructed spec becomes the stored last-applied spec. A cluster
    /// still being created or deleted is refused with `OperationInProgress`.
    pub async fn import_from(&self, id: &ClusterId) -> Result<ClusterSpec> {
        let _guard = self.locks.acquire(id).await;

        let state = self.read(id).await?;
        if state.provisioning_state.is_in_flight() {
            return Err(EngineError::OperationInProgress {
                id: id.clone(),
                status: state.provisioning_state.to_string(),
            });
        }
        let spec = reconstruct(&state);

        let stored = match self.store.find(id).await? {
            Some(previous) => previous.next(&spec, settled_phase(&state)),
            None => StoredCluster::new(&spec, settled_phase(&state)),
        };
        self.store.put(&stored.with_state(state)).await?;

        debug!(
            cluster = %id,
            fields = ?unrecoverable_fields(),
            "Fields left unset by import"
        );
        info!(cluster = %id, "Cluster imported");
        Ok(spec)
    }

    /// Validate, read and diff against the stored last-applied spec
    pub async fn plan(&self, desired: &ClusterSpec) -> Result<ChangeSet> {
        self.validate(desired)?;
        let id = desired.id();

        let observed = self.find_remote(&id).await?;
        let stored = self.store.find(&id).await?;
        Ok(diff::diff_with_last_applied(
            desired,
            observed.as_ref(),
            stored.as_ref().map(|s| &s.spec),
        ))
    }

    /// Bring the cluster in line with `desired` and wait for it to settle
    pub async fn apply(&self, desired: &ClusterSpec, options: &ApplyOptions) -> Result<ApplyOutcome> {
        self.validate(desired)?;
        let id = desired.id();
        let _guard = self.lock(&id, options.wait_for_lock).await?;

        let mut stored = self.store.find(&id).await?;
        let observed = self.find_remote(&id).await?;

        if let Some(state) = &observed {
            if state.provisioning_state.is_in_flight() {
                return Err(EngineError::OperationInProgress {
                    id,
                    status: state.provisioning_state.to_string(),
                });
            }
            if stored.is_none() {
                // Existing clusters must be imported before they are managed
                return Err(EngineError::AlreadyExists { id });
            }
        }
        if let Some(previous) = &stored
            && previous.phase.is_pending()
        {
            debug!(
                cluster = %id,
                phase = %previous.phase,
                busy = previous.is_busy(),
                "Recovering from an interrupted operation"
            );
        }

        let change_set = diff::diff_with_last_applied(
            desired,
            observed.as_ref(),
            stored.as_ref().map(|s| &s.spec),
        );
        for drift in &change_set.drift {
            warn!(cluster = %id, drift = %drift, "Drift detected");
        }
        info!(
            cluster = %id,
            operation = %change_set.operation,
            updates = change_set.changes.len(),
            replacements = change_set.replacements.len(),
            "Applying change set"
        );

        let result = match change_set.operation {
            Operation::NoOp => observed.ok_or_else(|| EngineError::NotFound { id: id.clone() }),
            Operation::Create => self.run_create(desired, &mut stored, &options.cancel).await,
            Operation::Update => {
                self.run_update(desired, &change_set.updates, &mut stored, &options.cancel)
                    .await
            }
            Operation::Replace => {
                if !options.allow_replace {
                    return Err(EngineError::ImmutableFieldChanged {
                        id,
                        fields: change_set.replacement_fields(),
                    });
                }
                info!(
                    cluster = %id,
                    fields = ?change_set.replacement_fields(),
                    "Replacing cluster"
                );
                self.run_delete(&id, &mut stored, true, &options.cancel).await?;
                self.run_create(desired, &mut stored, &options.cancel).await
            }
        };

        match result {
            Ok(state) => {
                let phase = settled_phase(&state);
                self.record(&mut stored, desired, phase, Some(state.clone()))
                    .await?;
                info!(cluster = %id, state = %state.provisioning_state, "Cluster reconciled");
                Ok(ApplyOutcome { change_set, state })
            }
            Err(e) => Err(self.record_failure(&mut stored, desired, e).await),
        }
    }

    /// Apply several specs concurrently; same-identifier specs run one at a time
    pub async fn apply_many(
        &self,
        specs: &[ClusterSpec],
        options: &ApplyOptions,
    ) -> Vec<Result<ApplyOutcome>> {
        join_all(specs.iter().map(|spec| self.apply(spec, options))).await
    }

    /// Delete the cluster, wait for it to go, and drop its snapshot
    pub async fn destroy(&self, id: &ClusterId, cancel: &CancelToken) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut stored = self.store.find(id).await?;

        if let Err(e) = self.run_delete(id, &mut stored, false, cancel).await {
            let spec = stored.as_ref().map(|s| s.spec.clone());
            return Err(match spec {
                Some(spec) => self.record_failure(&mut stored, &spec, e).await,
                None => e,
            });
        }

        if stored.is_some() {
            self.store.delete(id).await?;
        }
        info!(cluster = %id, "Cluster destroyed");
        Ok(())
    }

    async fn lock(&self, id: &ClusterId, wait: bool) -> Result<ClusterGuard> {
        if wait {
            Ok(self.locks.acquire(id).await)
        } else {
            self.locks.try_acquire(id)
        }
    }

    async fn run_create(
        &self,
        desired: &ClusterSpec,
        stored: &mut Option<StoredCluster>,
        cancel: &CancelToken,
    ) -> Result<ClusterState> {
        let timeout = self.config.create_timeout;
        let phase = LifecyclePhase::creating(timeout);
        let handle = self
            .submit_recorded(stored, desired, phase, || async {
                self.create(desired).await.map(|(_, handle)| handle)
            })
            .await?;

        self.poll_until_terminal(&handle, Some(timeout), cancel).await
    }

    async fn run_update(
        &self,
        desired: &ClusterSpec,
        update: &ClusterUpdate,
        stored: &mut Option<StoredCluster>,
        cancel: &CancelToken,
    ) -> Result<ClusterState> {
        let timeout = self.config.update_timeout;
        let id = desired.id();
        let spec = last_applied_or(stored, desired);
        let phase = LifecyclePhase::updating(timeout);
        let handle = self
            .submit_recorded(stored, &spec, phase, || self.update(&id, update))
            .await?;

        self.poll_until_terminal(&handle, Some(timeout), cancel).await
    }

    async fn run_delete(
        &self,
        id: &ClusterId,
        stored: &mut Option<StoredCluster>,
        replacing: bool,
        cancel: &CancelToken,
    ) -> Result<ClusterState> {
        let timeout = self.config.delete_timeout;
        let handle = match stored.as_ref().map(|s| s.spec.clone()) {
            Some(spec) => {
                let phase = LifecyclePhase::deleting(timeout, replacing);
                self.submit_recorded(stored, &spec, phase, || self.delete(id))
                    .await?
            }
            None => self.delete(id).await?,
        };

        self.poll_until_terminal(&handle, Some(timeout), cancel).await
    }

    /// Persist `phase` before submitting, then attach the remote operation id
    ///
    /// Nothing is submitted when the pending phase cannot be stored. A
    /// submission rejected outright is recorded as failed; terminal remote
    /// failures are left to the caller.
    async fn submit_recorded<F, Fut>(
        &self,
        stored: &mut Option<StoredCluster>,
        spec: &ClusterSpec,
        phase: LifecyclePhase,
        submit: F,
    ) -> Result<PollHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PollHandle>>,
    {
        self.record(stored, spec, phase.clone(), None).await?;

        let handle = match submit().await {
            Ok(handle) => handle,
            Err(e @ EngineError::RemoteTerminal { .. }) => return Err(e),
            Err(e) => {
                if let Err(store_error) = self
                    .record(stored, spec, LifecyclePhase::failed(e.to_string()), None)
                    .await
                {
                    warn!(error = %store_error, "Failed to record rejected submission");
                }
                return Err(e);
            }
        };

        if let Some(operation) = handle.operation()
            && let Err(store_error) = self
                .record(stored, spec, phase.with_operation(Some(operation)), None)
                .await
        {
            // The pending phase is already stored; polling can go ahead
            warn!(
                cluster = %handle.id,
                operation = %operation,
                error = %store_error,
                "Failed to record remote operation id"
            );
        }
        Ok(handle)
    }

    /// Persist the next snapshot revision
    async fn record(
        &self,
        stored: &mut Option<StoredCluster>,
        spec: &ClusterSpec,
        phase: LifecyclePhase,
        state: Option<ClusterState>,
    ) -> Result<()> {
        let mut next = match stored.as_ref() {
            Some(previous) => previous.next(spec, phase),
            None => StoredCluster::new(spec, phase),
        };
        if let Some(state) = state {
            next.state = Some(state);
        }

        self.store.put(&next).await?;
        debug!(
            cluster = %next.id,
            phase = %next.phase,
            revision = next.revision,
            "Snapshot recorded"
        );
        *stored = Some(next);
        Ok(())
    }

    /// Record a terminal remote failure; other errors leave the snapshot as is
    async fn record_failure(
        &self,
        stored: &mut Option<StoredCluster>,
        desired: &ClusterSpec,
        error: EngineError,
    ) -> EngineError {
        let EngineError::RemoteTerminal { reason, .. } = &error else {
            if error.is_wait_abandoned() {
                warn!(error = %error, "Local wait abandoned, remote operation may still be running");
            }
            return error;
        };

        let spec = last_applied_or(stored, desired);
        if let Err(store_error) = self
            .record(stored, &spec, LifecyclePhase::failed(reason.clone()), None)
            .await
        {
            warn!(error = %store_error, "Failed to record terminal failure");
        }
        error
    }
}

fn last_applied_or(stored: &Option<StoredCluster>, desired: &ClusterSpec) -> ClusterSpec {
    stored
        .as_ref()
        .map(|s| s.spec.clone())
        .unwrap_or_else(|| desired.clone())
}

/// Lifecycle phase for a cluster observed at rest
fn settled_phase(state: &ClusterState) -> LifecyclePhase {
    match state.provisioning_state {
        ProvisioningState::Error => LifecyclePhase::failed(
            state
                .failure_reason
                .clone()
                .unwrap_or_else(|| "cluster is in the Error state".to_string()),
        ),
        _ => LifecyclePhase::Running,
    }
}
