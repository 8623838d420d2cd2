//! Role kinds and their per-kind constraint tables
//!
//! The four node groups share one field layout ([`crate::RoleGroup`]) but differ
//! in how many instances they run, whether that count can change, whether the
//! group is required, and which endpoints it produces. Those differences live
//! in a static table keyed by [`RoleKind`] instead of in the group type itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::EndpointKind;

/// The closed set of node groups a cluster can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleKind {
    HeadNode,
    WorkerNode,
    ZookeeperNode,
    EdgeNode,
}

impl RoleKind {
    /// All role kinds in declaration order
    pub const ALL: [RoleKind; 4] = [
        RoleKind::HeadNode,
        RoleKind::WorkerNode,
        RoleKind::ZookeeperNode,
        RoleKind::EdgeNode,
    ];

    /// Key used in documents and field paths
    pub fn as_str(self) -> &'static str {
        match self {
            RoleKind::HeadNode => "headNode",
            RoleKind::WorkerNode => "workerNode",
            RoleKind::ZookeeperNode => "zookeeperNode",
            RoleKind::EdgeNode => "edgeNode",
        }
    }

    /// Parse a document key back into a role kind
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Constraint table for this kind
    pub fn constraints(self) -> &'static RoleConstraints {
        match self {
            RoleKind::HeadNode => &HEAD_NODE,
            RoleKind::WorkerNode => &WORKER_NODE,
            RoleKind::ZookeeperNode => &ZOOKEEPER_NODE,
            RoleKind::EdgeNode => &EDGE_NODE,
        }
    }

    /// Whether the instance count of this kind has an in-place update path
    pub fn is_scalable(self) -> bool {
        matches!(
            self.constraints().instance_count,
            InstanceCountRule::Scalable { .. }
        )
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many instances a role group runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceCountRule {
    /// Vendor-fixed count; a caller may restate it but never change it
    Fixed(u32),
    /// Caller-chosen count, updatable in place
    Scalable { min: u32 },
}

impl InstanceCountRule {
    /// Whether `count` is acceptable under this rule
    pub fn accepts(self, count: u32) -> bool {
        match self {
            InstanceCountRule::Fixed(n) => count == n,
            InstanceCountRule::Scalable { min } => count >= min,
        }
    }
}

/// Static per-kind constraints
#[derive(Debug)]
pub struct RoleConstraints {
    pub kind: RoleKind,
    pub instance_count: InstanceCountRule,
    /// Whether the group must be declared
    pub required: bool,
    /// Endpoints a Running cluster exposes because this group exists
    pub endpoints: &'static [EndpointKind],
}

impl RoleConstraints {
    /// Instance count a Running cluster reports when the caller gave none
    pub fn default_instance_count(&self) -> Option<u32> {
        match self.instance_count {
            InstanceCountRule::Fixed(n) => Some(n),
            InstanceCountRule::Scalable { .. } => None,
        }
    }
}

static HEAD_NODE: RoleConstraints = RoleConstraints {
    kind: RoleKind::HeadNode,
    instance_count: InstanceCountRule::Fixed(2),
    required: true,
    endpoints: &[EndpointKind::Https, EndpointKind::Ssh],
};

static WORKER_NODE: RoleConstraints = RoleConstraints {
    kind: RoleKind::WorkerNode,
    instance_count: InstanceCountRule::Scalable { min: 1 },
    required: true,
    endpoints: &[],
};

static ZOOKEEPER_NODE: RoleConstraints = RoleConstraints {
    kind: RoleKind::ZookeeperNode,
    instance_count: InstanceCountRule::Fixed(3),
    required: true,
    endpoints: &[],
};

static EDGE_NODE: RoleConstraints = RoleConstraints {
    kind: RoleKind::EdgeNode,
    instance_count: InstanceCountRule::Fixed(1),
    required: false,
    endpoints: &[EndpointKind::EdgeSsh],
};
