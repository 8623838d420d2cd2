//! Observed remote state
//!
//! [`ClusterState`] is what the control plane reports after any call. It never
//! contains secrets: the remote does not return them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::id::ClusterId;
use crate::role::RoleKind;
use crate::spec::Tier;

/// Provisioning state reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProvisioningState {
    #[default]
    Creating,
    Running,
    Deleting,
    Error,
    Deleted,
}

impl ProvisioningState {
    /// Whether a long-running operation has settled
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProvisioningState::Running | ProvisioningState::Error | ProvisioningState::Deleted
        )
    }

    /// Whether a mutating operation is currently in flight on the remote
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ProvisioningState::Creating | ProvisioningState::Deleting
        )
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningState::Creating => "Creating",
            ProvisioningState::Running => "Running",
            ProvisioningState::Deleting => "Deleting",
            ProvisioningState::Error => "Error",
            ProvisioningState::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Endpoints a Running cluster exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointKind {
    Https,
    Ssh,
    EdgeSsh,
}

impl EndpointKind {
    fn host(self, name: &str, dns_suffix: &str) -> String {
        match self {
            EndpointKind::Https => format!("https://{}.{}", name, dns_suffix),
            EndpointKind::Ssh => format!("{}-ssh.{}", name, dns_suffix),
            EndpointKind::EdgeSsh => format!("{}-ed-ssh.{}", name, dns_suffix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_ssh_endpoint: Option<String>,
}

impl Endpoints {
    /// Compute endpoints from the identifier and the role groups present
    ///
    /// Deterministic: the same identifier, roles and suffix always yield the
    /// same URIs. No discovery call is involved.
    pub fn derive<I>(id: &ClusterId, roles: I, dns_suffix: &str) -> Self
    where
        I: IntoIterator<Item = RoleKind>,
    {
        let mut endpoints = Self::default();
        for kind in roles {
            for endpoint in kind.constraints().endpoints {
                let uri = Some(endpoint.host(id.name(), dns_suffix));
                match endpoint {
                    EndpointKind::Https => endpoints.https_endpoint = uri,
                    EndpointKind::Ssh => endpoints.ssh_endpoint = uri,
                    EndpointKind::EdgeSsh => endpoints.edge_ssh_endpoint = uri,
                }
            }
        }
        endpoints
    }

    pub fn get(&self, kind: EndpointKind) -> Option<&str> {
        match kind {
            EndpointKind::Https => self.https_endpoint.as_deref(),
            EndpointKind::Ssh => self.ssh_endpoint.as_deref(),
            EndpointKind::EdgeSsh => self.edge_ssh_endpoint.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.https_endpoint.is_none() && self.ssh_endpoint.is_none() && self.edge_ssh_endpoint.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedGateway {
    pub enabled: bool,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRole {
    pub vm_size: String,
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_instance_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_id: Option<String>,
}

/// Snapshot of a cluster as the control plane reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    pub id: ClusterId,
    pub provisioning_state: ProvisioningState,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub cluster_version: String,

    #[serde(default)]
    pub tier: Tier,

    #[serde(default)]
    pub rstudio_enabled: bool,

    #[serde(default)]
    pub gateway: ObservedGateway,

    #[serde(default)]
    pub roles: BTreeMap<RoleKind, ObservedRole>,

    #[serde(default)]
    pub actual_instance_counts: BTreeMap<RoleKind, u32>,

    #[serde(default)]
    pub endpoints: Endpoints,

    /// Verbatim failure reason when in `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub observed_at: DateTime<Utc>,
}

impl ClusterState {
    /// Tombstone for a cluster that no longer exists remotely
    pub fn deleted(id: ClusterId) -> Self {
        Self {
            id,
            provisioning_state: ProvisioningState::Deleted,
            location: String::new(),
            cluster_version: String::new(),
            tier: Tier::default(),
            rstudio_enabled: false,
            gateway: ObservedGateway::default(),
            roles: BTreeMap::new(),
            actual_instance_counts: BTreeMap::new(),
            endpoints: Endpoints::default(),
            failure_reason: None,
            observed_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.provisioning_state == ProvisioningState::Running
    }

    pub fn role(&self, kind: RoleKind) -> Option<&ObservedRole> {
        self.roles.get(&kind)
    }

    pub fn actual_instance_count(&self, kind: RoleKind) -> Option<u32> {
        self.actual_instance_counts.get(&kind).copied()
    }

    /// Fill endpoints when Running, clear them otherwise
    pub fn with_derived_endpoints(mut self, dns_suffix: &str) -> Self {
        self.endpoints = if self.is_running() {
            Endpoints::derive(&self.id, self.roles.keys().copied(), dns_suffix)
        } else {
            Endpoints::default()
        };
        self
    }
}
