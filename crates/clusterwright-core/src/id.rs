//! Cluster identifiers
//!
//! A cluster is addressed by its resource group and name. The canonical
//! string form is `/resourceGroups/{group}/clusters/{name}`; segment keys are
//! matched case-insensitively when parsing because control planes are not
//! consistent about their casing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

const GROUP_SEGMENT: &str = "resourceGroups";
const CLUSTER_SEGMENT: &str = "clusters";

/// Joins group and name in [`ClusterId::storage_key`]; never valid in either
const STORAGE_SEPARATOR: char = '+';

/// Identifier of a cluster resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterId {
    resource_group: String,
    name: String,
}

impl ClusterId {
    /// Create an identifier from parts already known to be well formed
    ///
    /// Use [`ClusterId::try_new`] for untrusted input.
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// Create an identifier, rejecting parts that cannot round-trip
    pub fn try_new(resource_group: impl Into<String>, name: impl Into<String>) -> Result<Self, CoreError> {
        let id = Self::new(resource_group, name);
        id.check()?;
        Ok(id)
    }

    /// Check both segments are usable in the canonical form and as a storage key
    pub fn check(&self) -> Result<(), CoreError> {
        for (label, segment) in [("resource group", &self.resource_group), ("name", &self.name)] {
            let reason = if segment.trim().is_empty() {
                format!("{} must not be empty", label)
            } else if segment == "." || segment == ".." {
                format!("{} must not be '{}'", label, segment)
            } else if let Some(c) = segment
                .chars()
                .find(|c| matches!(*c, '/' | '\\') || *c == STORAGE_SEPARATOR || c.is_control())
            {
                format!("{} must not contain '{}'", label, c.escape_default())
            } else {
                continue;
            };
            return Err(CoreError::InvalidIdentifier {
                id: self.to_string(),
                reason,
            });
        }
        Ok(())
    }

    /// Resource group the cluster lives in
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File-system friendly key (used by file-backed stores)
    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.resource_group, STORAGE_SEPARATOR, self.name)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}",
            GROUP_SEGMENT, self.resource_group, CLUSTER_SEGMENT, self.name
        )
    }
}

impl FromStr for ClusterId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidIdentifier {
            id: s.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        let [group_key, group, cluster_key, name] = segments.as_slice() else {
            return Err(invalid(
                "expected /resourceGroups/{group}/clusters/{name}",
            ));
        };

        if !group_key.eq_ignore_ascii_case(GROUP_SEGMENT) {
            return Err(invalid("missing 'resourceGroups' segment"));
        }
        if !cluster_key.eq_ignore_ascii_case(CLUSTER_SEGMENT) {
            return Err(invalid("missing 'clusters' segment"));
        }
        Self::try_new(*group, *name)
    }
}

impl TryFrom<String> for ClusterId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = ClusterId::new("analytics-rg", "ml-prod");
        let rendered = id.to_string();
        assert_eq!(rendered, "/resourceGroups/analytics-rg/clusters/ml-prod");

        let parsed: ClusterId = rendered.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_is_case_insensitive_on_segment_keys() {
        let parsed: ClusterId = "/resourcegroups/rg1/Clusters/c1".parse().unwrap();
        assert_eq!(parsed.resource_group(), "rg1");
        assert_eq!(parsed.name(), "c1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("rg1/c1".parse::<ClusterId>().is_err());
        assert!("/resourceGroups/rg1/servers/c1".parse::<ClusterId>().is_err());
        assert!("/resourceGroups//clusters/c1".parse::<ClusterId>().is_err());
        assert!("".parse::<ClusterId>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = ClusterId::new("rg", "c");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"/resourceGroups/rg/clusters/c\"");

        let back: ClusterId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(ClusterId::new("rg", "c").storage_key(), "rg+c");
        assert_ne!(
            ClusterId::new("team.a", "b").storage_key(),
            ClusterId::new("team", "a.b").storage_key()
        );
    }

    #[test]
    fn test_try_new_rejects_unsafe_segments() {
        assert!(ClusterId::try_new("team/analytics", "ml-prod").is_err());
        assert!(ClusterId::try_new("..", "ml-prod").is_err());
        assert!(ClusterId::try_new("rg", "a+b").is_err());
        assert!(ClusterId::try_new("rg", " ").is_err());
        assert!(ClusterId::try_new("my.rg(eu)", "ml-prod").is_ok());
    }

    #[test]
    fn test_parse_rejects_slash_in_segment() {
        let err = "/resourceGroups/team/analytics/clusters/ml-prod"
            .parse::<ClusterId>()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentifier { .. }));
        assert!("/resourceGroups/../clusters/ml-prod".parse::<ClusterId>().is_err());
    }
}
