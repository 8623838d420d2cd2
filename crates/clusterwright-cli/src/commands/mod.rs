//! CLI commands

pub mod describe;
pub mod plan;
pub mod state;
pub mod validate;

use clusterwright_core::ClusterSpec;
use std::path::Path;

use crate::error::Result;

/// Load a spec document, YAML or JSON by extension
pub fn load_spec(path: &Path) -> Result<ClusterSpec> {
    tracing::debug!(path = %path.display(), "Loading spec");
    Ok(ClusterSpec::from_file(path)?)
}
