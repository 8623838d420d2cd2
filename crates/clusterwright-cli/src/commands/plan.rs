//! Plan command - diff a spec against its stored snapshot
//!
//! Runs offline: the last observed state in the snapshot stands in for a
//! live read, and the stored last-applied spec covers fields the remote never
//! reports.

use clusterwright_core::{ProvisioningState, validate};
use clusterwright_engine::{FileStateStore, StateStore, diff_with_last_applied};
use console::style;
use std::path::Path;
use tracing::debug;

use crate::commands::load_spec;
use crate::display::{print_change_set, print_validation_errors};
use crate::error::Result;
use crate::exit_codes;

pub async fn run(
    path: &Path,
    state_dir: &Path,
    detailed_exitcode: bool,
    json_output: bool,
) -> Result<i32> {
    let desired = load_spec(path)?;

    let errors = validate(&desired);
    if !errors.is_empty() {
        if json_output {
            let output = serde_json::json!({ "valid": false, "errors": errors });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_validation_errors(&path.display().to_string(), &errors);
        }
        return Ok(exit_codes::VALIDATION_ERROR);
    }

    let store = FileStateStore::new(state_dir)?;
    let stored = store.find(&desired.id()).await?;
    debug!(
        cluster = %desired.id(),
        snapshot = stored.is_some(),
        "Planning against stored snapshot"
    );

    let observed = stored
        .as_ref()
        .and_then(|s| s.state.as_ref())
        .filter(|state| state.provisioning_state != ProvisioningState::Deleted);
    let change_set = diff_with_last_applied(
        &desired,
        observed,
        stored.as_ref().map(|s| &s.spec),
    );

    if json_output {
        println!("{}", serde_json::to_string_pretty(&change_set)?);
    } else {
        print_change_set(&change_set);
        if let Some(stored) = &stored
            && let Some(state) = &stored.state
        {
            println!();
            println!(
                "{}",
                style(format!(
                    "Observed state from {} (snapshot revision {})",
                    state.observed_at.format("%Y-%m-%d %H:%M:%S"),
                    stored.revision
                ))
                .dim()
            );
        }
    }

    Ok(if detailed_exitcode && !change_set.is_noop() {
        exit_codes::PLAN_HAS_CHANGES
    } else {
        exit_codes::SUCCESS
    })
}
