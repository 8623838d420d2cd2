//! Schema model
//!
//! A static table of per-field constraints. Every field of a [`ClusterSpec`]
//! and every computed field of a [`ClusterState`] has exactly one
//! [`FieldConstraint`]; the Differ walks this table instead of hard-coding
//! field comparisons. The table is built once per process and never mutated.

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::role::{InstanceCountRule, RoleKind};
use crate::spec::{ClusterSpec, Tier};
use crate::state::ClusterState;

/// Attributes shared by every role group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleField {
    VmSize,
    Username,
    Password,
    SshKeys,
    TargetInstanceCount,
    SubnetId,
    VirtualNetworkId,
}

impl RoleField {
    pub const ALL: [RoleField; 7] = [
        RoleField::VmSize,
        RoleField::Username,
        RoleField::Password,
        RoleField::SshKeys,
        RoleField::TargetInstanceCount,
        RoleField::SubnetId,
        RoleField::VirtualNetworkId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoleField::VmSize => "vmSize",
            RoleField::Username => "username",
            RoleField::Password => "password",
            RoleField::SshKeys => "sshKeys",
            RoleField::TargetInstanceCount => "targetInstanceCount",
            RoleField::SubnetId => "subnetId",
            RoleField::VirtualNetworkId => "virtualNetworkId",
        }
    }
}

/// Address of a single field in the desired or observed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    ResourceGroup,
    Location,
    ClusterVersion,
    Tier,
    RstudioEnabled,
    GatewayEnabled,
    GatewayUsername,
    GatewayPassword,
    StorageAccounts,
    StorageAccountKey,
    Role(RoleKind, RoleField),
    ProvisioningState,
    Endpoints,
    ActualInstanceCount(RoleKind),
}

impl Field {
    /// Dotted path of the field, as used in documents and error reports
    pub fn path(&self) -> String {
        match self {
            Field::Name => "name".to_string(),
            Field::ResourceGroup => "resourceGroup".to_string(),
            Field::Location => "location".to_string(),
            Field::ClusterVersion => "clusterVersion".to_string(),
            Field::Tier => "tier".to_string(),
            Field::RstudioEnabled => "rstudioEnabled".to_string(),
            Field::GatewayEnabled => "gateway.enabled".to_string(),
            Field::GatewayUsername => "gateway.username".to_string(),
            Field::GatewayPassword => "gateway.password".to_string(),
            Field::StorageAccounts => "storageAccounts".to_string(),
            Field::StorageAccountKey => "storageAccounts[].storageAccountKey".to_string(),
            Field::Role(kind, field) => format!("roles.{}.{}", kind, field.as_str()),
            Field::ProvisioningState => "provisioningState".to_string(),
            Field::Endpoints => "endpoints".to_string(),
            Field::ActualInstanceCount(kind) => format!("actualInstanceCounts.{}", kind),
        }
    }

    /// Parse a dotted path back into a field
    pub fn parse(path: &str) -> Option<Field> {
        if let Some(rest) = path.strip_prefix("roles.") {
            let (kind, attr) = rest.split_once('.')?;
            let kind = RoleKind::from_key(kind)?;
            let attr = RoleField::ALL.into_iter().find(|f| f.as_str() == attr)?;
            return Some(Field::Role(kind, attr));
        }
        if let Some(kind) = path.strip_prefix("actualInstanceCounts.") {
            return RoleKind::from_key(kind).map(Field::ActualInstanceCount);
        }
        Schema::global()
            .fields()
            .find(|f| !matches!(f, Field::Role(..) | Field::ActualInstanceCount(_)) && f.path() == path)
    }

    /// Value of this field in a desired-state document
    ///
    /// Write-only and computed fields have no desired value worth comparing
    /// and report [`FieldValue::Unset`].
    pub fn desired(&self, spec: &ClusterSpec) -> FieldValue {
        match self {
            Field::Name => FieldValue::Str(spec.name.clone()),
            Field::ResourceGroup => FieldValue::Str(spec.resource_group.clone()),
            Field::Location => FieldValue::Str(spec.location.clone()),
            Field::ClusterVersion => FieldValue::Str(spec.cluster_version.clone()),
            Field::Tier => FieldValue::Tier(spec.tier),
            Field::RstudioEnabled => FieldValue::Bool(spec.rstudio_enabled),
            Field::GatewayEnabled => FieldValue::Bool(spec.gateway.enabled),
            Field::GatewayUsername => FieldValue::Str(spec.gateway.username.clone()),
            Field::StorageAccounts => FieldValue::List(
                spec.storage_accounts
                    .iter()
                    .map(|s| {
                        if s.is_default {
                            format!("{} (default)", s.storage_container_id)
                        } else {
                            s.storage_container_id.clone()
                        }
                    })
                    .collect(),
            ),
            Field::Role(kind, attr) => {
                let Some(group) = spec.role(*kind) else {
                    return FieldValue::Unset;
                };
                match attr {
                    RoleField::VmSize => FieldValue::Str(group.vm_size.clone()),
                    RoleField::Username => FieldValue::Str(group.username.clone()),
                    RoleField::TargetInstanceCount => group
                        .effective_instance_count(*kind)
                        .map(FieldValue::Count)
                        .unwrap_or(FieldValue::Unset),
                    RoleField::SubnetId => FieldValue::from_opt(group.subnet_id.as_deref()),
                    RoleField::VirtualNetworkId => {
                        FieldValue::from_opt(group.virtual_network_id.as_deref())
                    }
                    RoleField::Password | RoleField::SshKeys => FieldValue::Unset,
                }
            }
            Field::GatewayPassword
            | Field::StorageAccountKey
            | Field::ProvisioningState
            | Field::Endpoints
            | Field::ActualInstanceCount(_) => FieldValue::Unset,
        }
    }

    /// Value of this field as the remote reports it
    ///
    /// `None` when the control plane never returns the field at all.
    pub fn observed(&self, state: &ClusterState) -> Option<FieldValue> {
        let value = match self {
            Field::Name => FieldValue::Str(state.id.name().to_string()),
            Field::ResourceGroup => FieldValue::Str(state.id.resource_group().to_string()),
            Field::Location => FieldValue::Str(state.location.clone()),
            Field::ClusterVersion => FieldValue::Str(state.cluster_version.clone()),
            Field::Tier => FieldValue::Tier(state.tier),
            Field::RstudioEnabled => FieldValue::Bool(state.rstudio_enabled),
            Field::GatewayEnabled => FieldValue::Bool(state.gateway.enabled),
            Field::GatewayUsername => FieldValue::Str(state.gateway.username.clone()),
            Field::Role(kind, attr) => {
                let Some(role) = state.role(*kind) else {
                    return match attr {
                        RoleField::Password | RoleField::SshKeys => None,
                        _ => Some(FieldValue::Unset),
                    };
                };
                match attr {
                    RoleField::VmSize => FieldValue::Str(role.vm_size.clone()),
                    RoleField::Username => FieldValue::Str(role.username.clone()),
                    RoleField::TargetInstanceCount => role
                        .target_instance_count
                        .or_else(|| kind.constraints().default_instance_count())
                        .map(FieldValue::Count)
                        .unwrap_or(FieldValue::Unset),
                    RoleField::SubnetId => FieldValue::from_opt(role.subnet_id.as_deref()),
                    RoleField::VirtualNetworkId => {
                        FieldValue::from_opt(role.virtual_network_id.as_deref())
                    }
                    RoleField::Password | RoleField::SshKeys => return None,
                }
            }
            Field::ProvisioningState => FieldValue::Str(state.provisioning_state.to_string()),
            Field::ActualInstanceCount(kind) => state
                .actual_instance_count(*kind)
                .map(FieldValue::Count)
                .unwrap_or(FieldValue::Unset),
            Field::GatewayPassword
            | Field::StorageAccounts
            | Field::StorageAccountKey
            | Field::Endpoints => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path())
    }
}

/// A comparable field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    Count(u32),
    Tier(Tier),
    List(Vec<String>),
    Unset,
}

impl FieldValue {
    fn from_opt(value: Option<&str>) -> Self {
        value
            .map(|v| FieldValue::Str(v.to_string()))
            .unwrap_or(FieldValue::Unset)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Count(n) => write!(f, "{}", n),
            FieldValue::Tier(t) => write!(f, "{}", t),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
            FieldValue::Unset => f.write_str("(unset)"),
        }
    }
}

/// How a field may change over the life of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "tiers")]
pub enum Mutability {
    /// Fixed by the vendor; any other value is rejected before submission
    Immutable,
    /// A change destroys and recreates the cluster
    ForceReplace,
    /// Updatable in place
    Mutable,
    /// Updatable in place on the listed tiers, force-replace elsewhere
    MutableOnTiers(&'static [Tier]),
    /// Reported by the remote, never authored
    Computed,
    /// Sent on create, never read back, never compared
    WriteOnly,
}

impl Mutability {
    /// Whether a change to the field is an in-place update on `tier`
    pub fn is_updatable(self, tier: Tier) -> bool {
        match self {
            Mutability::Mutable => true,
            Mutability::MutableOnTiers(tiers) => tiers.contains(&tier),
            _ => false,
        }
    }

    /// Whether a change to the field requires replacement on `tier`
    pub fn forces_replacement(self, tier: Tier) -> bool {
        match self {
            Mutability::Immutable | Mutability::ForceReplace => true,
            Mutability::MutableOnTiers(tiers) => !tiers.contains(&tier),
            _ => false,
        }
    }

    /// Whether the Differ ever looks at the field
    pub fn is_compared(self) -> bool {
        !matches!(self, Mutability::Computed | Mutability::WriteOnly)
    }
}

/// How two values of a field are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparison {
    #[default]
    Exact,
    /// The remote normalizes casing
    CaseInsensitive,
}

impl Comparison {
    pub fn equal(self, a: &FieldValue, b: &FieldValue) -> bool {
        match (self, a, b) {
            (Comparison::CaseInsensitive, FieldValue::Str(a), FieldValue::Str(b)) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => a == b,
        }
    }
}

/// Constraint attached to one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraint {
    pub field: Field,
    pub mutability: Mutability,
    pub required: bool,
    pub comparison: Comparison,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_with: Vec<Field>,
    pub description: &'static str,
}

impl FieldConstraint {
    fn new(field: Field, mutability: Mutability, description: &'static str) -> Self {
        Self {
            field,
            mutability,
            required: false,
            comparison: Comparison::Exact,
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
            description,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn case_insensitive(mut self) -> Self {
        self.comparison = Comparison::CaseInsensitive;
        self
    }

    fn conflicts_with(mut self, field: Field) -> Self {
        self.conflicts_with.push(field);
        self
    }

    fn required_with(mut self, fields: &[Field]) -> Self {
        self.required_with.extend_from_slice(fields);
        self
    }
}

/// Tiers on which rstudio can be toggled in place
const RSTUDIO_UPDATABLE_TIERS: &[Tier] = &[Tier::Standard];

static SCHEMA: Lazy<Schema> = Lazy::new(Schema::build);

/// The process-wide field constraint table
#[derive(Debug)]
pub struct Schema {
    constraints: Vec<FieldConstraint>,
}

impl Schema {
    /// The shared, read-only schema
    pub fn global() -> &'static Schema {
        &SCHEMA
    }

    /// Constraint for a field
    pub fn describe(field: Field) -> &'static FieldConstraint {
        Self::global()
            .constraints
            .iter()
            .find(|c| c.field == field)
            .unwrap_or_else(|| unreachable!("schema table covers every field: {}", field))
    }

    /// Constraint for a dotted field path
    pub fn describe_path(path: &str) -> Result<&'static FieldConstraint> {
        let field = Field::parse(path).ok_or_else(|| CoreError::UnknownField {
            path: path.to_string(),
        })?;
        Ok(Self::describe(field))
    }

    /// Every field in table order
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.constraints.iter().map(|c| c.field)
    }

    pub fn constraints(&self) -> &[FieldConstraint] {
        &self.constraints
    }

    fn build() -> Self {
        use Mutability::*;

        let mut constraints = vec![
            FieldConstraint::new(Field::Name, ForceReplace, "Globally unique cluster name").required(),
            FieldConstraint::new(Field::ResourceGroup, ForceReplace, "Resource group the cluster lives in")
                .required(),
            FieldConstraint::new(Field::Location, ForceReplace, "Region").required(),
            FieldConstraint::new(Field::ClusterVersion, ForceReplace, "Cluster software version").required(),
            FieldConstraint::new(Field::Tier, ForceReplace, "Pricing tier").required(),
            FieldConstraint::new(
                Field::RstudioEnabled,
                MutableOnTiers(RSTUDIO_UPDATABLE_TIERS),
                "Whether the RStudio server is installed",
            ),
            FieldConstraint::new(Field::GatewayEnabled, ForceReplace, "Gateway must be enabled")
                .required()
                .required_with(&[Field::GatewayUsername, Field::GatewayPassword]),
            FieldConstraint::new(Field::GatewayUsername, ForceReplace, "Gateway login")
                .required()
                .required_with(&[Field::GatewayEnabled, Field::GatewayPassword]),
            FieldConstraint::new(Field::GatewayPassword, WriteOnly, "Gateway password")
                .required()
                .required_with(&[Field::GatewayEnabled, Field::GatewayUsername]),
            FieldConstraint::new(
                Field::StorageAccounts,
                ForceReplace,
                "Attached storage containers; exactly one is the default. \
                 Not reported by the remote, compared against the last-applied spec",
            )
            .required(),
            FieldConstraint::new(Field::StorageAccountKey, WriteOnly, "Storage access key").required(),
        ];

        for kind in RoleKind::ALL {
            constraints.extend(role_constraints(kind));
        }

        constraints.push(FieldConstraint::new(
            Field::ProvisioningState,
            Computed,
            "Reported provisioning state",
        ));
        constraints.push(FieldConstraint::new(
            Field::Endpoints,
            Computed,
            "Derived from the identifier once Running",
        ));
        for kind in RoleKind::ALL {
            constraints.push(FieldConstraint::new(
                Field::ActualInstanceCount(kind),
                Computed,
                "Instances the remote is actually running",
            ));
        }

        Self { constraints }
    }
}

fn role_constraints(kind: RoleKind) -> Vec<FieldConstraint> {
    use Mutability::*;

    let role = |f| Field::Role(kind, f);
    let required = kind.constraints().required;
    let count_mutability = match kind.constraints().instance_count {
        InstanceCountRule::Fixed(_) => Immutable,
        InstanceCountRule::Scalable { .. } => Mutable,
    };

    let mut vm_size = FieldConstraint::new(role(RoleField::VmSize), ForceReplace, "VM size")
        .case_insensitive();
    let mut username = FieldConstraint::new(role(RoleField::Username), ForceReplace, "Login user");
    let mut count = FieldConstraint::new(
        role(RoleField::TargetInstanceCount),
        count_mutability,
        "Number of instances",
    );
    if required {
        vm_size = vm_size.required();
        username = username.required();
    }
    if kind.is_scalable() {
        count = count.required();
    }

    vec![
        vm_size,
        username,
        FieldConstraint::new(role(RoleField::Password), WriteOnly, "Login password")
            .conflicts_with(role(RoleField::SshKeys)),
        FieldConstraint::new(role(RoleField::SshKeys), WriteOnly, "Authorized public keys")
            .conflicts_with(role(RoleField::Password)),
        count,
        FieldConstraint::new(role(RoleField::SubnetId), ForceReplace, "Subnet reference")
            .required_with(&[role(RoleField::VirtualNetworkId)]),
        FieldConstraint::new(
            role(RoleField::VirtualNetworkId),
            ForceReplace,
            "Virtual network reference",
        )
        .required_with(&[role(RoleField::SubnetId)]),
    ]
}
