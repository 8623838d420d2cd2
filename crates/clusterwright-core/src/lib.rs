//! Clusterwright Core - desired-state model for multi-role compute clusters
//!
//! This crate provides the foundational types used throughout Clusterwright:
//! - `ClusterSpec`: The desired state of a cluster (roles, gateway, storage)
//! - `ClusterState`: What the remote control plane reports back
//! - `ClusterId`: The identifier a cluster is addressed by
//! - `Schema`: Per-field constraints (immutable, mutable, computed, write-only)
//! - `validate`: Pure pre-flight validation of a spec

pub mod error;
pub mod id;
pub mod role;
pub mod schema;
pub mod spec;
pub mod state;
pub mod validate;

pub use error::{CoreError, Result};
pub use id::ClusterId;
pub use role::{InstanceCountRule, RoleConstraints, RoleKind};
pub use schema::{Comparison, Field, FieldConstraint, FieldValue, Mutability, RoleField, Schema};
pub use spec::{ClusterSpec, Credential, Gateway, RoleGroup, Roles, StorageAccount, Tier};
pub use state::{
    ClusterState, EndpointKind, Endpoints, ObservedGateway, ObservedRole, ProvisioningState,
};
pub use validate::{ValidationError, ValidationErrorKind, validate};
