//! In-memory control plane for testing
//!
//! Operations complete after a configurable number of polls. Failures can be
//! injected per call, and out-of-band changes (deletion, scaling) can be
//! applied directly to the stored clusters.

use async_trait::async_trait;
use chrono::Utc;
use clusterwright_core::{
    ClusterId, ClusterSpec, ClusterState, ObservedGateway, ObservedRole, ProvisioningState,
    RoleKind,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ControlPlane, OperationId, OperationStatus, RemoteError, RemoteResult};
use crate::diff::ClusterUpdate;

/// Control-plane call kinds, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    SubmitCreate,
    SubmitUpdate,
    SubmitDelete,
    OperationStatus,
    ResourceState,
}

/// Counts of calls received, for assertions
#[derive(Debug, Default, Clone)]
pub struct RemoteCounts {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status_polls: usize,
    pub reads: usize,
}

#[derive(Debug)]
enum Injection {
    /// Fail without side effect
    Fail(RemoteError),
    /// Apply the side effect, then report a transient failure
    LostResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug)]
struct PendingOperation {
    cluster: ClusterId,
    kind: OperationKind,
    remaining_polls: u32,
    update: Option<ClusterUpdate>,
    failure: Option<String>,
    status: OperationStatus,
}

#[derive(Debug)]
struct Inner {
    clusters: HashMap<ClusterId, ClusterState>,
    operations: HashMap<OperationId, PendingOperation>,
    next_operation: u64,
    polls_to_complete: u32,
    hang: bool,
    lowercase_vm_sizes: bool,
    fail_next_operation: Option<String>,
    injections: Vec<(MockCall, Injection)>,
    counts: RemoteCounts,
    submitted_creates: Vec<ClusterSpec>,
    submitted_updates: Vec<(ClusterId, ClusterUpdate)>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            clusters: HashMap::new(),
            operations: HashMap::new(),
            next_operation: 1,
            polls_to_complete: 1,
            hang: false,
            lowercase_vm_sizes: false,
            fail_next_operation: None,
            injections: Vec::new(),
            counts: RemoteCounts::default(),
            submitted_creates: Vec::new(),
            submitted_updates: Vec::new(),
        }
    }
}

impl Inner {
    fn take_injection(&mut self, call: MockCall) -> Option<Injection> {
        let index = self.injections.iter().position(|(c, _)| *c == call)?;
        Some(self.injections.remove(index).1)
    }

    fn start_operation(
        &mut self,
        cluster: &ClusterId,
        kind: OperationKind,
        update: Option<ClusterUpdate>,
    ) -> OperationId {
        let id = OperationId(format!("op-{:04}", self.next_operation));
        self.next_operation += 1;
        self.operations.insert(
            id.clone(),
            PendingOperation {
                cluster: cluster.clone(),
                kind,
                remaining_polls: self.polls_to_complete,
                update,
                failure: self.fail_next_operation.take(),
                status: OperationStatus::InProgress,
            },
        );
        id
    }

    fn advance(&mut self, operation_id: &OperationId) {
        if self.hang {
            return;
        }
        let Some(operation) = self.operations.get_mut(operation_id) else {
            return;
        };
        if operation.status != OperationStatus::InProgress {
            return;
        }
        operation.remaining_polls = operation.remaining_polls.saturating_sub(1);
        if operation.remaining_polls == 0 {
            self.complete(operation_id);
        }
    }

    fn advance_cluster(&mut self, cluster: &ClusterId) {
        let pending: Vec<OperationId> = self
            .operations
            .iter()
            .filter(|(_, op)| &op.cluster == cluster && op.status == OperationStatus::InProgress)
            .map(|(id, _)| id.clone())
            .collect();
        for id in pending {
            self.advance(&id);
        }
    }

    fn complete(&mut self, operation_id: &OperationId) {
        let Some(operation) = self.operations.get_mut(operation_id) else {
            return;
        };
        let cluster_id = operation.cluster.clone();

        if let Some(reason) = operation.failure.clone() {
            operation.status = OperationStatus::Failed {
                reason: reason.clone(),
            };
            if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                cluster.provisioning_state = ProvisioningState::Error;
                cluster.failure_reason = Some(reason);
            }
            return;
        }

        operation.status = OperationStatus::Succeeded;
        match operation.kind {
            OperationKind::Create => {
                if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                    cluster.provisioning_state = ProvisioningState::Running;
                    cluster.actual_instance_counts = cluster
                        .roles
                        .iter()
                        .filter_map(|(kind, role)| role.target_instance_count.map(|n| (*kind, n)))
                        .collect();
                }
            }
            OperationKind::Update => {
                let update = operation.update.clone().unwrap_or_default();
                if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                    for (kind, count) in &update.target_instance_counts {
                        if let Some(role) = cluster.roles.get_mut(kind) {
                            role.target_instance_count = Some(*count);
                        }
                        cluster.actual_instance_counts.insert(*kind, *count);
                    }
                    if let Some(enabled) = update.rstudio_enabled {
                        cluster.rstudio_enabled = enabled;
                    }
                }
            }
            OperationKind::Delete => {
                self.clusters.remove(&cluster_id);
            }
        }
    }
}

/// In-memory control plane
#[derive(Clone, Default)]
pub struct MockControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations report `InProgress` for `polls - 1` queries before settling
    pub fn with_polls_to_complete(self, polls: u32) -> Self {
        self.lock().polls_to_complete = polls.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Never complete any operation
    pub fn set_hang(&self, hang: bool) {
        self.lock().hang = hang;
    }

    /// Report VM sizes lower-cased, the way some vendors normalize them
    pub fn set_lowercase_vm_sizes(&self, lowercase: bool) {
        self.lock().lowercase_vm_sizes = lowercase;
    }

    /// The next submitted operation fails with `reason` when it settles
    pub fn fail_next_operation(&self, reason: impl Into<String>) {
        self.lock().fail_next_operation = Some(reason.into());
    }

    /// The next `call` fails with `error` and has no side effect
    pub fn inject_failure(&self, call: MockCall, error: RemoteError) {
        self.lock().injections.push((call, Injection::Fail(error)));
    }

    /// The next submit of `call` takes effect but its response is lost
    pub fn inject_lost_response(&self, call: MockCall) {
        self.lock().injections.push((call, Injection::LostResponse));
    }

    /// Place a cluster directly, bypassing create
    pub fn insert_cluster(&self, state: ClusterState) {
        self.lock().clusters.insert(state.id.clone(), state);
    }

    /// Delete a cluster out of band
    pub fn remove_cluster(&self, id: &ClusterId) -> bool {
        self.lock().clusters.remove(id).is_some()
    }

    pub fn cluster(&self, id: &ClusterId) -> Option<ClusterState> {
        self.lock().clusters.get(id).cloned()
    }

    pub fn cluster_count(&self) -> usize {
        self.lock().clusters.len()
    }

    /// Change the running instance count without touching the target
    pub fn set_actual_instance_count(&self, id: &ClusterId, kind: RoleKind, count: u32) {
        if let Some(cluster) = self.lock().clusters.get_mut(id) {
            cluster.actual_instance_counts.insert(kind, count);
        }
    }

    /// Scale a role out of band
    pub fn set_target_instance_count(&self, id: &ClusterId, kind: RoleKind, count: u32) {
        if let Some(cluster) = self.lock().clusters.get_mut(id) {
            if let Some(role) = cluster.roles.get_mut(&kind) {
                role.target_instance_count = Some(count);
            }
            cluster.actual_instance_counts.insert(kind, count);
        }
    }

    pub fn set_rstudio_enabled(&self, id: &ClusterId, enabled: bool) {
        if let Some(cluster) = self.lock().clusters.get_mut(id) {
            cluster.rstudio_enabled = enabled;
        }
    }

    pub fn counts(&self) -> RemoteCounts {
        self.lock().counts.clone()
    }

    /// Every spec received by `submit_create`, secrets included
    pub fn submitted_creates(&self) -> Vec<ClusterSpec> {
        self.lock().submitted_creates.clone()
    }

    pub fn submitted_updates(&self) -> Vec<(ClusterId, ClusterUpdate)> {
        self.lock().submitted_updates.clone()
    }

    /// Operations not yet settled
    pub fn in_flight_operations(&self) -> usize {
        self.lock()
            .operations
            .values()
            .filter(|op| op.status == OperationStatus::InProgress)
            .count()
    }
}

/// State a freshly accepted create reports
fn accepted_state(spec: &ClusterSpec) -> ClusterState {
    let mut state = ClusterState::deleted(spec.id());
    state.provisioning_state = ProvisioningState::Creating;
    state.location = spec.location.clone();
    state.cluster_version = spec.cluster_version.clone();
    state.tier = spec.tier;
    state.rstudio_enabled = spec.rstudio_enabled;
    state.gateway = ObservedGateway {
        enabled: spec.gateway.enabled,
        username: spec.gateway.username.clone(),
    };
    state.roles = spec
        .roles
        .iter()
        .map(|(kind, group)| {
            (
                kind,
                ObservedRole {
                    vm_size: group.vm_size.clone(),
                    username: group.username.clone(),
                    target_instance_count: group.effective_instance_count(kind),
                    subnet_id: group.subnet_id.clone(),
                    virtual_network_id: group.virtual_network_id.clone(),
                },
            )
        })
        .collect();
    state
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn submit_create(&self, spec: &ClusterSpec) -> RemoteResult<OperationId> {
        let mut inner = self.lock();
        inner.counts.creates += 1;
        inner.submitted_creates.push(spec.clone());

        let lost_response = match inner.take_injection(MockCall::SubmitCreate) {
            Some(Injection::Fail(e)) => return Err(e),
            Some(Injection::LostResponse) => true,
            None => false,
        };

        let id = spec.id();
        if inner.clusters.contains_key(&id) {
            return Err(RemoteError::Conflict);
        }
        inner.clusters.insert(id.clone(), accepted_state(spec));
        let operation = inner.start_operation(&id, OperationKind::Create, None);

        if lost_response {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        Ok(operation)
    }

    async fn submit_update(
        &self,
        id: &ClusterId,
        update: &ClusterUpdate,
    ) -> RemoteResult<OperationId> {
        let mut inner = self.lock();
        inner.counts.updates += 1;

        let lost_response = match inner.take_injection(MockCall::SubmitUpdate) {
            Some(Injection::Fail(e)) => return Err(e),
            Some(Injection::LostResponse) => true,
            None => false,
        };

        if !inner.clusters.contains_key(id) {
            return Err(RemoteError::NotFound);
        }
        inner.submitted_updates.push((id.clone(), update.clone()));
        let operation = inner.start_operation(id, OperationKind::Update, Some(update.clone()));

        if lost_response {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        Ok(operation)
    }

    async fn submit_delete(&self, id: &ClusterId) -> RemoteResult<OperationId> {
        let mut inner = self.lock();
        inner.counts.deletes += 1;

        let lost_response = match inner.take_injection(MockCall::SubmitDelete) {
            Some(Injection::Fail(e)) => return Err(e),
            Some(Injection::LostResponse) => true,
            None => false,
        };

        let Some(cluster) = inner.clusters.get_mut(id) else {
            return Err(RemoteError::NotFound);
        };
        cluster.provisioning_state = ProvisioningState::Deleting;

        let existing = inner
            .operations
            .iter()
            .find(|(_, op)| {
                &op.cluster == id
                    && op.kind == OperationKind::Delete
                    && op.status == OperationStatus::InProgress
            })
            .map(|(op_id, _)| op_id.clone());
        let operation = match existing {
            Some(op_id) => op_id,
            None => inner.start_operation(id, OperationKind::Delete, None),
        };

        if lost_response {
            return Err(RemoteError::Transient("connection reset".to_string()));
        }
        Ok(operation)
    }

    async fn get_operation_status(&self, operation: &OperationId) -> RemoteResult<OperationStatus> {
        let mut inner = self.lock();
        inner.counts.status_polls += 1;

        if let Some(Injection::Fail(e)) = inner.take_injection(MockCall::OperationStatus) {
            return Err(e);
        }

        inner.advance(operation);
        inner
            .operations
            .get(operation)
            .map(|op| op.status.clone())
            .ok_or_else(|| RemoteError::Terminal(format!("unknown operation {}", operation)))
    }

    async fn get_resource_state(&self, id: &ClusterId) -> RemoteResult<ClusterState> {
        let mut inner = self.lock();
        inner.counts.reads += 1;

        if let Some(Injection::Fail(e)) = inner.take_injection(MockCall::ResourceState) {
            return Err(e);
        }

        inner.advance_cluster(id);
        let lowercase = inner.lowercase_vm_sizes;
        let mut state = inner.clusters.get(id).cloned().ok_or(RemoteError::NotFound)?;

        if lowercase {
            for role in state.roles.values_mut() {
                role.vm_size = role.vm_size.to_lowercase();
            }
        }
        state.observed_at = Utc::now();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterwright_core::{Gateway, RoleGroup, Roles, StorageAccount, Tier};

    fn spec(name: &str) -> ClusterSpec {
        let mut roles = Roles::new();
        roles.insert(
            RoleKind::HeadNode,
            RoleGroup {
                vm_size: "Standard_D14_V2".into(),
                username: "admin".into(),
                password: Some("pw".into()),
                ..Default::default()
            },
        );
        roles.insert(
            RoleKind::WorkerNode,
            RoleGroup {
                vm_size: "Standard_D14_V2".into(),
                username: "admin".into(),
                password: Some("pw".into()),
                target_instance_count: Some(2),
                ..Default::default()
            },
        );
        ClusterSpec {
            name: name.into(),
            resource_group: "rg".into(),
            location: "westeurope".into(),
            cluster_version: "3.6".into(),
            tier: Tier::Standard,
            rstudio_enabled: false,
            gateway: Gateway {
                enabled: true,
                username: "gw".into(),
                password: Some("gw-pw".into()),
            },
            storage_accounts: vec![StorageAccount {
                storage_container_id: "c".into(),
                storage_account_key: Some("k".into()),
                is_default: true,
            }],
            roles,
        }
    }

    #[tokio::test]
    async fn test_create_completes_after_polls() {
        let remote = MockControlPlane::new().with_polls_to_complete(3);
        let spec = spec("c1");

        let op = remote.submit_create(&spec).await.unwrap();
        let state = remote.get_resource_state(&spec.id()).await.unwrap();
        assert_eq!(state.provisioning_state, ProvisioningState::Creating);

        // The read above advanced the operation once
        assert_eq!(
            remote.get_operation_status(&op).await.unwrap(),
            OperationStatus::InProgress
        );
        assert_eq!(
            remote.get_operation_status(&op).await.unwrap(),
            OperationStatus::Succeeded
        );

        let state = remote.get_resource_state(&spec.id()).await.unwrap();
        assert_eq!(state.provisioning_state, ProvisioningState::Running);
        assert_eq!(state.actual_instance_count(RoleKind::WorkerNode), Some(2));
        assert_eq!(state.actual_instance_count(RoleKind::HeadNode), Some(2));
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let remote = MockControlPlane::new();
        remote.submit_create(&spec("c1")).await.unwrap();
        assert_eq!(
            remote.submit_create(&spec("c1")).await.unwrap_err(),
            RemoteError::Conflict
        );
    }

    #[tokio::test]
    async fn test_injected_failure_has_no_side_effect() {
        let remote = MockControlPlane::new();
        remote.inject_failure(MockCall::SubmitCreate, RemoteError::Transient("429".into()));

        assert!(remote.submit_create(&spec("c1")).await.is_err());
        assert_eq!(remote.cluster_count(), 0);
        assert!(remote.submit_create(&spec("c1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_lost_response_still_creates() {
        let remote = MockControlPlane::new();
        remote.inject_lost_response(MockCall::SubmitCreate);

        let err = remote.submit_create(&spec("c1")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transient(_)));
        assert_eq!(remote.cluster_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let remote = MockControlPlane::new();
        let err = remote
            .submit_delete(&ClusterId::new("rg", "ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::NotFound);
    }

    #[tokio::test]
    async fn test_update_applies_on_completion() {
        let remote = MockControlPlane::new();
        let spec = spec("c1");
        let op = remote.submit_create(&spec).await.unwrap();
        remote.get_operation_status(&op).await.unwrap();

        let mut update = ClusterUpdate::default();
        update.target_instance_counts.insert(RoleKind::WorkerNode, 5);
        let op = remote.submit_update(&spec.id(), &update).await.unwrap();
        assert_eq!(
            remote.get_operation_status(&op).await.unwrap(),
            OperationStatus::Succeeded
        );

        let state = remote.cluster(&spec.id()).unwrap();
        assert_eq!(
            state.role(RoleKind::WorkerNode).unwrap().target_instance_count,
            Some(5)
        );
        assert_eq!(remote.submitted_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_operation_reports_reason() {
        let remote = MockControlPlane::new();
        remote.fail_next_operation("InternalServerError: provisioning failed");
        let spec = spec("c1");
        let op = remote.submit_create(&spec).await.unwrap();

        assert_eq!(
            remote.get_operation_status(&op).await.unwrap(),
            OperationStatus::Failed {
                reason: "InternalServerError: provisioning failed".into()
            }
        );
        let state = remote.cluster(&spec.id()).unwrap();
        assert_eq!(state.provisioning_state, ProvisioningState::Error);
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let remote = MockControlPlane::new();
        remote.set_hang(true);
        let op = remote.submit_create(&spec("c1")).await.unwrap();
        for _ in 0..5 {
            assert_eq!(
                remote.get_operation_status(&op).await.unwrap(),
                OperationStatus::InProgress
            );
        }
        assert_eq!(remote.in_flight_operations(), 1);
    }
}
