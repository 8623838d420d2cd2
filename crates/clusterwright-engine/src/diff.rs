//! Change-set computation
//!
//! The differ walks the schema table and classifies every compared field:
//!
//! - unchanged: ignored
//! - force-replace: the whole change-set becomes `Replace`
//! - mutable: recorded in `updates`
//! - write-only / computed: never compared
//!
//! Fields the remote never reports (storage accounts) are compared against
//! the last-applied spec instead, and only when one exists.

use clusterwright_core::{
    ClusterId, ClusterSpec, ClusterState, Field, FieldValue, ProvisioningState, RoleField,
    RoleKind, Schema,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mutable-field delta sent to the remote on update
///
/// Only the fields with an in-place update path exist here, so an update can
/// never carry credentials or immutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUpdate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_instance_counts: BTreeMap<RoleKind, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rstudio_enabled: Option<bool>,
}

impl ClusterUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_instance_counts.is_empty() && self.rstudio_enabled.is_none()
    }

    /// Record a new value for a mutable field; false if the field has no update path
    fn set(&mut self, field: Field, value: &FieldValue) -> bool {
        match (field, value) {
            (Field::RstudioEnabled, FieldValue::Bool(enabled)) => {
                self.rstudio_enabled = Some(*enabled);
                true
            }
            (Field::Role(kind, RoleField::TargetInstanceCount), FieldValue::Count(count)) => {
                self.target_instance_counts.insert(kind, *count);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Create,
    /// Delete then create
    Replace,
    Update,
    NoOp,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Replace => write!(f, "replace"),
            Operation::Update => write!(f, "update"),
            Operation::NoOp => write!(f, "no-op"),
        }
    }
}

/// One field whose value differs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: Field,
    pub from: FieldValue,
    pub to: FieldValue,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.from, self.to)
    }
}

/// A difference surfaced to the caller but never corrected automatically
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Drift {
    /// The remote runs a different number of instances than it targets
    InstanceCount {
        role: RoleKind,
        target: u32,
        actual: u32,
    },
    /// The cluster is not Running
    ProvisioningState {
        state: ProvisioningState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A field changed remotely since it was last applied
    OutOfBand {
        field: Field,
        last_applied: FieldValue,
        observed: FieldValue,
    },
    /// A cluster with a stored snapshot is gone from the remote
    DeletedOutOfBand,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::InstanceCount {
                role,
                target,
                actual,
            } => write!(f, "{} runs {} of {} target instances", role, actual, target),
            Drift::ProvisioningState { state, reason } => match reason {
                Some(reason) => write!(f, "cluster is {}: {}", state, reason),
                None => write!(f, "cluster is {}", state),
            },
            Drift::OutOfBand {
                field,
                last_applied,
                observed,
            } => write!(
                f,
                "{} changed out of band: applied {}, observed {}",
                field, last_applied, observed
            ),
            Drift::DeletedOutOfBand => write!(f, "cluster was deleted out of band"),
        }
    }
}

/// Result of comparing desired state with observed state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub id: ClusterId,
    pub operation: Operation,

    /// Mutable-field delta (empty unless `operation` is `Update`)
    pub updates: ClusterUpdate,

    /// Per-field detail for `updates`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,

    /// Fields that force replacement
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<FieldChange>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<Drift>,
}

impl ChangeSet {
    fn new(id: ClusterId, operation: Operation) -> Self {
        Self {
            id,
            operation,
            updates: ClusterUpdate::default(),
            changes: Vec::new(),
            replacements: Vec::new(),
            drift: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.operation == Operation::NoOp
    }

    /// Paths of the fields forcing replacement
    pub fn replacement_fields(&self) -> Vec<String> {
        self.replacements.iter().map(|c| c.field.path()).collect()
    }
}

/// Compare desired state with observed state (absent means "does not exist")
pub fn diff(desired: &ClusterSpec, observed: Option<&ClusterState>) -> ChangeSet {
    diff_with_last_applied(desired, observed, None)
}

/// Compare desired state with observed state and the last-applied spec
pub fn diff_with_last_applied(
    desired: &ClusterSpec,
    observed: Option<&ClusterState>,
    last_applied: Option<&ClusterSpec>,
) -> ChangeSet {
    let id = desired.id();

    let Some(observed) = observed.filter(|s| s.provisioning_state != ProvisioningState::Deleted)
    else {
        let mut change_set = ChangeSet::new(id, Operation::Create);
        if last_applied.is_some() {
            change_set.drift.push(Drift::DeletedOutOfBand);
        }
        return change_set;
    };

    let mut change_set = ChangeSet::new(id, Operation::NoOp);

    for constraint in Schema::global().constraints() {
        if !constraint.mutability.is_compared() {
            continue;
        }

        let field = constraint.field;
        let wanted = field.desired(desired);
        let current = match field.observed(observed) {
            Some(value) => value,
            None => match last_applied.map(|spec| field.desired(spec)) {
                Some(value) if !is_blank(&value) => value,
                _ => continue,
            },
        };

        if constraint.comparison.equal(&wanted, &current) {
            continue;
        }

        let change = FieldChange {
            field,
            from: current,
            to: wanted.clone(),
        };

        if constraint.mutability.forces_replacement(desired.tier) {
            change_set.replacements.push(change);
        } else if constraint.mutability.is_updatable(desired.tier)
            && change_set.updates.set(field, &wanted)
        {
            change_set.changes.push(change);
        } else {
            change_set.replacements.push(change);
        }
    }

    if !change_set.replacements.is_empty() {
        // A replacement subsumes every in-place change
        change_set.operation = Operation::Replace;
        change_set.updates = ClusterUpdate::default();
        change_set.changes.clear();
    } else if !change_set.updates.is_empty() {
        change_set.operation = Operation::Update;
    }

    change_set.drift = detect_drift(observed, last_applied);
    change_set
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Unset => true,
        FieldValue::List(items) => items.is_empty(),
        _ => false,
    }
}

fn detect_drift(observed: &ClusterState, last_applied: Option<&ClusterSpec>) -> Vec<Drift> {
    let mut drift = Vec::new();

    if observed.provisioning_state != ProvisioningState::Running {
        drift.push(Drift::ProvisioningState {
            state: observed.provisioning_state,
            reason: observed.failure_reason.clone(),
        });
    }

    for (kind, role) in &observed.roles {
        let target = role
            .target_instance_count
            .or_else(|| kind.constraints().default_instance_count());
        if let (Some(target), Some(actual)) = (target, observed.actual_instance_count(*kind))
            && target != actual
        {
            drift.push(Drift::InstanceCount {
                role: *kind,
                target,
                actual,
            });
        }
    }

    if let Some(last_applied) = last_applied {
        for constraint in Schema::global().constraints() {
            if !constraint.mutability.is_updatable(last_applied.tier) {
                continue;
            }
            let field = constraint.field;
            let Some(current) = field.observed(observed) else {
                continue;
            };
            let applied = field.desired(last_applied);
            if !is_blank(&applied) && !constraint.comparison.equal(&applied, &current) {
                drift.push(Drift::OutOfBand {
                    field,
                    last_applied: applied,
                    observed: current,
                });
            }
        }
    }

    drift
}
