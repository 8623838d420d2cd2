//! Desired-state documents
//!
//! A [`ClusterSpec`] is what the caller authors. Secrets (gateway password,
//! storage keys, role credentials) are write-only: they travel to the control
//! plane on create and nowhere else. [`ClusterSpec::redacted`] produces the
//! copy that is safe to persist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::id::ClusterId;
use crate::role::RoleKind;

/// Pricing tier of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Standard,
    Premium,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Standard => f.write_str("Standard"),
            Tier::Premium => f.write_str("Premium"),
        }
    }
}

/// HTTP gateway in front of the cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Gateway {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub username: String,

    /// Write-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Storage container attached to the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageAccount {
    /// Opaque reference to an existing container
    pub storage_container_id: String,

    /// Write-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_account_key: Option<String>,

    #[serde(default)]
    pub is_default: bool,
}

/// Which credential mechanism a role group declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Password,
    SshKeys(usize),
    /// Neither a password nor any SSH key
    Missing,
    /// Both a password and SSH keys
    Conflicting,
}

/// One node group of the cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleGroup {
    #[serde(default)]
    pub vm_size: String,

    #[serde(default)]
    pub username: String,

    /// Write-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Write-only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_instance_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_id: Option<String>,
}

impl RoleGroup {
    /// Classify the declared credential without exposing it
    pub fn credential(&self) -> Credential {
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        match (has_password, self.ssh_keys.is_empty()) {
            (true, false) => Credential::Conflicting,
            (true, true) => Credential::Password,
            (false, false) => Credential::SshKeys(self.ssh_keys.len()),
            (false, true) => Credential::Missing,
        }
    }

    /// Instance count the group runs with, falling back to the vendor-fixed count
    ///
    /// An explicit zero on a fixed-count kind means "not set".
    pub fn effective_instance_count(&self, kind: RoleKind) -> Option<u32> {
        match self.target_instance_count {
            Some(0) if !kind.is_scalable() => kind.constraints().default_instance_count(),
            Some(n) => Some(n),
            None => kind.constraints().default_instance_count(),
        }
    }

    fn redact(&mut self) {
        self.password = None;
        self.ssh_keys.clear();
    }
}

/// Role groups keyed by kind
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roles(BTreeMap<RoleKind, RoleGroup>);

impl Roles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: RoleKind) -> Option<&RoleGroup> {
        self.0.get(&kind)
    }

    pub fn get_mut(&mut self, kind: RoleKind) -> Option<&mut RoleGroup> {
        self.0.get_mut(&kind)
    }

    pub fn insert(&mut self, kind: RoleKind, group: RoleGroup) -> Option<RoleGroup> {
        self.0.insert(kind, group)
    }

    pub fn remove(&mut self, kind: RoleKind) -> Option<RoleGroup> {
        self.0.remove(&kind)
    }

    pub fn contains(&self, kind: RoleKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = RoleKind> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RoleKind, &RoleGroup)> {
        self.0.iter().map(|(k, g)| (*k, g))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(RoleKind, RoleGroup)> for Roles {
    fn from_iter<I: IntoIterator<Item = (RoleKind, RoleGroup)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Desired state of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub cluster_version: String,
    pub tier: Tier,

    #[serde(default)]
    pub rstudio_enabled: bool,

    #[serde(default)]
    pub gateway: Gateway,

    #[serde(default)]
    pub storage_accounts: Vec<StorageAccount>,

    #[serde(default)]
    pub roles: Roles,
}

impl ClusterSpec {
    /// Load a spec from a YAML or JSON file (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::SpecNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Identifier this spec addresses
    pub fn id(&self) -> ClusterId {
        ClusterId::new(&self.resource_group, &self.name)
    }

    pub fn role(&self, kind: RoleKind) -> Option<&RoleGroup> {
        self.roles.get(kind)
    }

    /// The storage account marked as default, if exactly one is
    pub fn default_storage_account(&self) -> Option<&StorageAccount> {
        let mut defaults = self.storage_accounts.iter().filter(|s| s.is_default);
        match (defaults.next(), defaults.next()) {
            (Some(account), None) => Some(account),
            _ => None,
        }
    }

    /// Copy with every write-only field removed
    pub fn redacted(&self) -> Self {
        let mut spec = self.clone();
        spec.gateway.password = None;
        for account in &mut spec.storage_accounts {
            account.storage_account_key = None;
        }
        for group in spec.roles.0.values_mut() {
            group.redact();
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_YAML: &str = r#"
name: ml-prod
resourceGroup: analytics-rg
location: westeurope
clusterVersion: "3.6"
tier: Standard
rstudioEnabled: true
gateway:
  enabled: true
  username: acctestusrgw
  password: TerrAform123!
storageAccounts:
  - storageContainerId: https://acct.blob.internal/data
    storageAccountKey: secret-key
    isDefault: true
roles:
  headNode:
    vmSize: Standard_D14_V2
    username: acctestusrvm
    password: AccTestvdSC4daf986!
  workerNode:
    vmSize: Standard_D14_V2
    username: acctestusrvm
    sshKeys:
      - ssh-rsa AAAAB3NzaC1yc2E worker
    targetInstanceCount: 3
  zookeeperNode:
    vmSize: Standard_D3_V2
    username: acctestusrvm
    password: AccTestvdSC4daf986!
"#;

    #[test]
    fn test_parse_yaml() {
        let spec = ClusterSpec::from_yaml(SPEC_YAML).unwrap();
        assert_eq!(spec.name, "ml-prod");
        assert_eq!(spec.tier, Tier::Standard);
        assert!(spec.rstudio_enabled);
        assert_eq!(spec.roles.len(), 3);
        assert_eq!(
            spec.role(RoleKind::WorkerNode).unwrap().target_instance_count,
            Some(3)
        );
        assert_eq!(spec.id(), ClusterId::new("analytics-rg", "ml-prod"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = SPEC_YAML.replace("rstudioEnabled", "rstudio");
        assert!(ClusterSpec::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_credential_classification() {
        let mut group = RoleGroup {
            vm_size: "Standard_D3_V2".to_string(),
            username: "admin".to_string(),
            ..Default::default()
        };
        assert_eq!(group.credential(), Credential::Missing);

        group.password = Some(String::new());
        assert_eq!(group.credential(), Credential::Missing);

        group.password = Some("pw".to_string());
        assert_eq!(group.credential(), Credential::Password);

        group.ssh_keys.push("ssh-rsa AAA".to_string());
        assert_eq!(group.credential(), Credential::Conflicting);

        group.password = None;
        assert_eq!(group.credential(), Credential::SshKeys(1));
    }

    #[test]
    fn test_effective_instance_count() {
        let group = RoleGroup::default();
        assert_eq!(group.effective_instance_count(RoleKind::HeadNode), Some(2));
        assert_eq!(group.effective_instance_count(RoleKind::WorkerNode), None);

        let zeroed = RoleGroup {
            target_instance_count: Some(0),
            ..Default::default()
        };
        assert_eq!(zeroed.effective_instance_count(RoleKind::ZookeeperNode), Some(3));
        assert_eq!(zeroed.effective_instance_count(RoleKind::WorkerNode), Some(0));

        let worker = RoleGroup {
            target_instance_count: Some(4),
            ..Default::default()
        };
        assert_eq!(worker.effective_instance_count(RoleKind::WorkerNode), Some(4));
    }

    #[test]
    fn test_redacted_strips_secrets() {
        let spec = ClusterSpec::from_yaml(SPEC_YAML).unwrap();
        let redacted = spec.redacted();

        assert!(redacted.gateway.password.is_none());
        assert!(redacted.storage_accounts[0].storage_account_key.is_none());
        for (_, group) in redacted.roles.iter() {
            assert!(group.password.is_none());
            assert!(group.ssh_keys.is_empty());
        }

        let yaml = redacted.to_yaml().unwrap();
        assert!(!yaml.contains("TerrAform123!"));
        assert!(!yaml.contains("secret-key"));
        assert!(!yaml.contains("ssh-rsa"));

        // Non-secret fields survive
        assert_eq!(redacted.gateway.username, "acctestusrgw");
        assert_eq!(redacted.roles.len(), 3);
    }

    #[test]
    fn test_default_storage_account() {
        let mut spec = ClusterSpec::from_yaml(SPEC_YAML).unwrap();
        assert!(spec.default_storage_account().is_some());

        spec.storage_accounts.push(StorageAccount {
            storage_container_id: "other".to_string(),
            storage_account_key: None,
            is_default: true,
        });
        assert!(spec.default_storage_account().is_none());
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("cluster.yaml");
        std::fs::write(&yaml_path, SPEC_YAML).unwrap();
        let from_yaml = ClusterSpec::from_file(&yaml_path).unwrap();

        let json_path = dir.path().join("cluster.json");
        std::fs::write(&json_path, serde_json::to_string(&from_yaml).unwrap()).unwrap();
        let from_json = ClusterSpec::from_file(&json_path).unwrap();

        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ClusterSpec::from_file("/nonexistent/cluster.yaml").unwrap_err();
        assert!(matches!(err, CoreError::SpecNotFound { .. }));
    }
}
