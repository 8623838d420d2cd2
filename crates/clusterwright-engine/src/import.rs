//! Reconstruct a spec from observed remote state
//!
//! Only what the control plane reports comes back. Write-only fields
//! (gateway password, role credentials, storage account keys) stay unset and
//! the differ never compares them, so an imported spec plans clean against the
//! state it came from.

use clusterwright_core::{
    ClusterId, ClusterSpec, ClusterState, Gateway, Mutability, RoleGroup, Roles, Schema,
};

/// Build the spec that best describes `state`
pub fn reconstruct(state: &ClusterState) -> ClusterSpec {
    let roles: Roles = state
        .roles
        .iter()
        .map(|(&kind, observed)| {
            // Fixed-count kinds are implied by the kind itself
            let target_instance_count = if kind.is_scalable() {
                observed
                    .target_instance_count
                    .or_else(|| state.actual_instance_count(kind))
            } else {
                None
            };

            let group = RoleGroup {
                vm_size: observed.vm_size.clone(),
                username: observed.username.clone(),
                password: None,
                ssh_keys: Vec::new(),
                target_instance_count,
                subnet_id: observed.subnet_id.clone(),
                virtual_network_id: observed.virtual_network_id.clone(),
            };
            (kind, group)
        })
        .collect();

    ClusterSpec {
        name: state.id.name().to_string(),
        resource_group: state.id.resource_group().to_string(),
        location: state.location.clone(),
        cluster_version: state.cluster_version.clone(),
        tier: state.tier,
        rstudio_enabled: state.rstudio_enabled,
        gateway: Gateway {
            enabled: state.gateway.enabled,
            username: state.gateway.username.clone(),
            password: None,
        },
        // Never reported by the remote
        storage_accounts: Vec::new(),
        roles,
    }
}

/// Paths left unset by [`reconstruct`] because the remote never returns them
pub fn unrecoverable_fields() -> Vec<String> {
    let probe = ClusterState::deleted(ClusterId::new("probe", "probe"));
    Schema::global()
        .constraints()
        .iter()
        .filter(|c| c.mutability != Mutability::Computed)
        .filter(|c| c.field.observed(&probe).is_none())
        .map(|c| c.field.path())
        .collect()
}
