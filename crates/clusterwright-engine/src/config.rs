//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::retry::RetryConfig;

/// Default DNS suffix used to derive endpoint URIs
pub const DEFAULT_DNS_SUFFIX: &str = "clusters.internal";

/// Polling, timeout and retry policy for the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Interval between operation status queries
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub create_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub update_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub delete_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    pub retry: RetryConfig,

    /// Vendor DNS suffix appended to the cluster name in endpoints
    pub dns_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            create_timeout: Duration::from_secs(60 * 60),
            update_timeout: Duration::from_secs(60 * 60),
            delete_timeout: Duration::from_secs(60 * 60),
            read_timeout: Duration::from_secs(5 * 60),
            retry: RetryConfig::default(),
            dns_suffix: DEFAULT_DNS_SUFFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a YAML config file and validate it
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("pollInterval", self.poll_interval),
            ("createTimeout", self.create_timeout),
            ("updateTimeout", self.update_timeout),
            ("deleteTimeout", self.delete_timeout),
            ("readTimeout", self.read_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(EngineError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(EngineError::InvalidConfig(
                "retry.backoffMultiplier must be >= 1.0".to_string(),
            ));
        }
        if self.dns_suffix.trim().is_empty() {
            return Err(EngineError::InvalidConfig("dnsSuffix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Timeout for the wait that follows the given operation kind
    pub fn timeout_for(&self, kind: crate::poll::OperationKind) -> Duration {
        use crate::poll::OperationKind;
        match kind {
            OperationKind::Create => self.create_timeout,
            OperationKind::Update => self.update_timeout,
            OperationKind::Delete => self.delete_timeout,
        }
    }
}
