//! Pre-flight validation
//!
//! [`validate`] inspects a spec against the schema's cross-field rules and
//! returns every violation it finds. It is pure: nothing here talks to the
//! control plane, and this is the only place role credentials are looked at.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::role::{InstanceCountRule, RoleKind};
use crate::schema::{Field, RoleField};
use crate::spec::{ClusterSpec, Credential, RoleGroup};

static CLUSTER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{1,57}[a-zA-Z0-9]$").expect("valid regex")
});

static RESOURCE_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-\w.()]{0,89}[-\w()]$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationErrorKind {
    MultipleDefaults,
    NoDefault,
    MissingCredential,
    ConflictingCredential,
    IncompletePairing,
    UnsupportedInstanceCount,
    MissingField,
    MissingRole,
    IncompleteGateway,
    InvalidName,
    InvalidValue,
}

/// A single violation, addressed by field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({:?})", self.path, self.message, self.kind)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a spec, returning all violations (empty when valid)
pub fn validate(spec: &ClusterSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_scalars(spec, &mut errors);
    validate_gateway(spec, &mut errors);
    validate_storage(spec, &mut errors);
    validate_roles(spec, &mut errors);
    errors
}

fn validate_scalars(spec: &ClusterSpec, errors: &mut Vec<ValidationError>) {
    let scalars = [
        (Field::Name, &spec.name),
        (Field::ResourceGroup, &spec.resource_group),
        (Field::Location, &spec.location),
        (Field::ClusterVersion, &spec.cluster_version),
    ];
    for (field, value) in scalars {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::MissingField,
                field.path(),
                "must not be empty",
            ));
        }
    }

    if !spec.name.is_empty() && !CLUSTER_NAME.is_match(&spec.name) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidName,
            Field::Name.path(),
            format!(
                "'{}' must be 3-59 characters of letters, digits and hyphens, \
                 starting and ending with a letter or digit",
                spec.name
            ),
        ));
    }

    if !spec.resource_group.trim().is_empty() && !RESOURCE_GROUP.is_match(&spec.resource_group) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidName,
            Field::ResourceGroup.path(),
            format!(
                "'{}' must be 1-90 characters of letters, digits, '-', '_', '.', '(' and ')', \
                 not ending with '.'",
                spec.resource_group
            ),
        ));
    }
}

fn validate_gateway(spec: &ClusterSpec, errors: &mut Vec<ValidationError>) {
    let gateway = &spec.gateway;

    let mut missing = Vec::new();
    if gateway.username.trim().is_empty() {
        missing.push("username");
    }
    if gateway.password.as_deref().is_none_or(str::is_empty) {
        missing.push("password");
    }
    if !missing.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::IncompleteGateway,
            "gateway",
            format!(
                "enabled, username and password are required together; missing {}",
                missing.join(", ")
            ),
        ));
    }

    if !gateway.enabled {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidValue,
            Field::GatewayEnabled.path(),
            "the gateway cannot be disabled",
        ));
    }
}

fn validate_storage(spec: &ClusterSpec, errors: &mut Vec<ValidationError>) {
    let defaults = spec.storage_accounts.iter().filter(|s| s.is_default).count();
    match defaults {
        0 => errors.push(ValidationError::new(
            ValidationErrorKind::NoDefault,
            Field::StorageAccounts.path(),
            "exactly one storage account must be marked isDefault",
        )),
        1 => {}
        n => errors.push(ValidationError::new(
            ValidationErrorKind::MultipleDefaults,
            Field::StorageAccounts.path(),
            format!("{} storage accounts are marked isDefault, expected one", n),
        )),
    }

    for (i, account) in spec.storage_accounts.iter().enumerate() {
        if account.storage_container_id.trim().is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::MissingField,
                format!("storageAccounts[{}].storageContainerId", i),
                "must not be empty",
            ));
        }
        if account.storage_account_key.as_deref().is_none_or(str::is_empty) {
            errors.push(ValidationError::new(
                ValidationErrorKind::MissingField,
                format!("storageAccounts[{}].storageAccountKey", i),
                "must be set",
            ));
        }
    }
}

fn validate_roles(spec: &ClusterSpec, errors: &mut Vec<ValidationError>) {
    for kind in RoleKind::ALL {
        match spec.role(kind) {
            Some(group) => validate_role(kind, group, errors),
            None if kind.constraints().required => errors.push(ValidationError::new(
                ValidationErrorKind::MissingRole,
                format!("roles.{}", kind),
                "role group is required",
            )),
            None => {}
        }
    }
}

fn validate_role(kind: RoleKind, group: &RoleGroup, errors: &mut Vec<ValidationError>) {
    let path = |field: RoleField| Field::Role(kind, field).path();

    if group.vm_size.trim().is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingField,
            path(RoleField::VmSize),
            "must not be empty",
        ));
    }
    if group.username.trim().is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingField,
            path(RoleField::Username),
            "must not be empty",
        ));
    }

    match group.credential() {
        Credential::Missing => errors.push(ValidationError::new(
            ValidationErrorKind::MissingCredential,
            format!("roles.{}", kind),
            "one of password or sshKeys is required",
        )),
        Credential::Conflicting => errors.push(ValidationError::new(
            ValidationErrorKind::ConflictingCredential,
            format!("roles.{}", kind),
            "password and sshKeys are mutually exclusive",
        )),
        Credential::Password | Credential::SshKeys(_) => {}
    }

    for (i, key) in group.ssh_keys.iter().enumerate() {
        if key.trim().is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!("{}[{}]", path(RoleField::SshKeys), i),
                "SSH key must not be blank",
            ));
        }
    }

    if group.subnet_id.is_some() != group.virtual_network_id.is_some() {
        errors.push(ValidationError::new(
            ValidationErrorKind::IncompletePairing,
            format!("roles.{}", kind),
            "subnetId and virtualNetworkId must be set together",
        ));
    }

    let count_path = path(RoleField::TargetInstanceCount);
    match (kind.constraints().instance_count, group.target_instance_count) {
        (InstanceCountRule::Fixed(_), None | Some(0)) => {}
        (InstanceCountRule::Fixed(fixed), Some(n)) if n != fixed => {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnsupportedInstanceCount,
                count_path,
                format!("{} runs exactly {} instances, got {}", kind, fixed, n),
            ))
        }
        (InstanceCountRule::Fixed(_), Some(_)) => {}
        (InstanceCountRule::Scalable { .. }, None) => errors.push(ValidationError::new(
            ValidationErrorKind::UnsupportedInstanceCount,
            count_path,
            "must be set",
        )),
        (InstanceCountRule::Scalable { min }, Some(n)) if n < min => {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnsupportedInstanceCount,
                count_path,
                format!("must be at least {}, got {}", min, n),
            ))
        }
        (InstanceCountRule::Scalable { .. }, Some(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Gateway, Roles, StorageAccount, Tier};

    fn group(vm_size: &str) -> RoleGroup {
        RoleGroup {
            vm_size: vm_size.to_string(),
            username: "acctestusrvm".to_string(),
            password: Some("AccTestvdSC4daf986!".to_string()),
            ..Default::default()
        }
    }

    fn valid_spec() -> ClusterSpec {
        let mut roles = Roles::new();
        roles.insert(RoleKind::HeadNode, group("Standard_D14_V2"));
        roles.insert(
            RoleKind::WorkerNode,
            RoleGroup {
                target_instance_count: Some(2),
                ..group("Standard_D14_V2")
            },
        );
        roles.insert(RoleKind::ZookeeperNode, group("Standard_D3_V2"));

        ClusterSpec {
            name: "acctesthdi-01".to_string(),
            resource_group: "acctestrg".to_string(),
            location: "westeurope".to_string(),
            cluster_version: "3.6".to_string(),
            tier: Tier::Standard,
            rstudio_enabled: true,
            gateway: Gateway {
                enabled: true,
                username: "acctestusrgw".to_string(),
                password: Some("TerrAform123!".to_string()),
            },
            storage_accounts: vec![StorageAccount {
                storage_container_id: "https://acct.blob.internal/data".to_string(),
                storage_account_key: Some("key".to_string()),
                is_default: true,
            }],
            roles,
        }
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_spec_has_no_errors() {
        assert!(validate(&valid_spec()).is_empty());
    }

    #[test]
    fn test_no_default_storage() {
        let mut spec = valid_spec();
        spec.storage_accounts[0].is_default = false;
        assert_eq!(kinds(&validate(&spec)), vec![ValidationErrorKind::NoDefault]);

        spec.storage_accounts.clear();
        assert_eq!(kinds(&validate(&spec)), vec![ValidationErrorKind::NoDefault]);
    }

    #[test]
    fn test_multiple_default_storage() {
        let mut spec = valid_spec();
        let extra = spec.storage_accounts[0].clone();
        spec.storage_accounts.push(extra);
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::MultipleDefaults]
        );
    }

    #[test]
    fn test_credential_exclusivity() {
        let mut spec = valid_spec();
        spec.roles
            .get_mut(RoleKind::HeadNode)
            .unwrap()
            .ssh_keys
            .push("ssh-rsa AAAA".to_string());
        let errors = validate(&spec);
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::ConflictingCredential]);
        assert_eq!(errors[0].path, "roles.headNode");

        let mut spec = valid_spec();
        spec.roles.get_mut(RoleKind::ZookeeperNode).unwrap().password = None;
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::MissingCredential]
        );
    }

    #[test]
    fn test_ssh_keys_only_is_valid() {
        let mut spec = valid_spec();
        let worker = spec.roles.get_mut(RoleKind::WorkerNode).unwrap();
        worker.password = None;
        worker.ssh_keys = vec!["ssh-rsa AAAA".to_string()];
        assert!(validate(&spec).is_empty());

        spec.roles
            .get_mut(RoleKind::WorkerNode)
            .unwrap()
            .ssh_keys
            .push("  ".to_string());
        let errors = validate(&spec);
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::InvalidValue]);
        assert_eq!(errors[0].path, "roles.workerNode.sshKeys[1]");
    }

    #[test]
    fn test_incomplete_network_pairing() {
        let mut spec = valid_spec();
        spec.roles.get_mut(RoleKind::HeadNode).unwrap().subnet_id = Some("subnet-1".to_string());
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::IncompletePairing]
        );

        spec.roles.get_mut(RoleKind::HeadNode).unwrap().virtual_network_id =
            Some("vnet-1".to_string());
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn test_fixed_instance_counts() {
        let mut spec = valid_spec();
        // Restating the fixed count, or zero, is fine
        spec.roles.get_mut(RoleKind::HeadNode).unwrap().target_instance_count = Some(2);
        spec.roles.get_mut(RoleKind::ZookeeperNode).unwrap().target_instance_count = Some(0);
        assert!(validate(&spec).is_empty());

        spec.roles.get_mut(RoleKind::ZookeeperNode).unwrap().target_instance_count = Some(5);
        let errors = validate(&spec);
        assert_eq!(
            kinds(&errors),
            vec![ValidationErrorKind::UnsupportedInstanceCount]
        );
        assert_eq!(errors[0].path, "roles.zookeeperNode.targetInstanceCount");
    }

    #[test]
    fn test_worker_count_required() {
        let mut spec = valid_spec();
        spec.roles.get_mut(RoleKind::WorkerNode).unwrap().target_instance_count = None;
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::UnsupportedInstanceCount]
        );

        spec.roles.get_mut(RoleKind::WorkerNode).unwrap().target_instance_count = Some(0);
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::UnsupportedInstanceCount]
        );
    }

    #[test]
    fn test_missing_roles() {
        let mut spec = valid_spec();
        spec.roles.remove(RoleKind::ZookeeperNode);
        let errors = validate(&spec);
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::MissingRole]);
        assert_eq!(errors[0].path, "roles.zookeeperNode");

        // Edge node is optional
        let spec = valid_spec();
        assert!(spec.role(RoleKind::EdgeNode).is_none());
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn test_gateway_rules() {
        let mut spec = valid_spec();
        spec.gateway.password = None;
        assert_eq!(
            kinds(&validate(&spec)),
            vec![ValidationErrorKind::IncompleteGateway]
        );

        let mut spec = valid_spec();
        spec.gateway.enabled = false;
        assert_eq!(kinds(&validate(&spec)), vec![ValidationErrorKind::InvalidValue]);
    }

    #[test]
    fn test_cluster_name_rules() {
        let too_long = "a".repeat(60);
        for bad in ["ab", "-leading", "trailing-", "has_underscore", too_long.as_str()] {
            let mut spec = valid_spec();
            spec.name = bad.to_string();
            assert_eq!(
                kinds(&validate(&spec)),
                vec![ValidationErrorKind::InvalidName],
                "{}",
                bad
            );
        }

        let mut spec = valid_spec();
        spec.name = "a".repeat(59);
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn test_resource_group_rules() {
        let too_long = "g".repeat(91);
        for bad in ["team/analytics", "..", "trailing.", "a+b", "back\\slash", too_long.as_str()] {
            let mut spec = valid_spec();
            spec.resource_group = bad.to_string();
            let errors = validate(&spec);
            assert_eq!(kinds(&errors), vec![ValidationErrorKind::InvalidName], "{}", bad);
            assert_eq!(errors[0].path, "resourceGroup");
        }

        for good in ["analytics", "team.analytics", "rg_(eu)-1", "g".repeat(90).as_str()] {
            let mut spec = valid_spec();
            spec.resource_group = good.to_string();
            assert!(validate(&spec).is_empty(), "{}", good);
            assert!(spec.id().check().is_ok(), "{}", good);
        }
    }

    #[test]
    fn test_all_violations_reported() {
        let mut spec = valid_spec();
        spec.location = String::new();
        spec.storage_accounts[0].is_default = false;
        spec.roles.get_mut(RoleKind::HeadNode).unwrap().vm_size = String::new();
        spec.roles.get_mut(RoleKind::HeadNode).unwrap().password = None;

        let errors = validate(&spec);
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationErrorKind::MissingField,
                ValidationErrorKind::NoDefault,
                ValidationErrorKind::MissingField,
                ValidationErrorKind::MissingCredential,
            ]
        );
        assert_eq!(errors[0].path, "location");
        assert_eq!(errors[2].path, "roles.headNode.vmSize");
    }
}
