//! State command - show stored snapshots

use clusterwright_core::ClusterId;
use clusterwright_engine::{FileStateStore, StateStore, StoredCluster};
use console::style;
use std::path::Path;

use crate::error::Result;
use crate::exit_codes;

pub async fn run(id: Option<&str>, state_dir: &Path, json_output: bool) -> Result<i32> {
    let store = FileStateStore::new(state_dir)?;

    let Some(id) = id else {
        let all = store.list().await?;
        if json_output {
            println!("{}", serde_json::to_string_pretty(&all)?);
        } else if all.is_empty() {
            println!("No stored clusters in {}", state_dir.display());
        } else {
            for stored in &all {
                println!(
                    "{:<60} {:<10} rev {}",
                    stored.id.to_string(),
                    stored.phase.status_name(),
                    stored.revision
                );
            }
        }
        return Ok(exit_codes::SUCCESS);
    };

    let id: ClusterId = id.parse()?;
    let stored = store.get(&id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        print_snapshot(&stored)?;
    }
    Ok(exit_codes::SUCCESS)
}

fn print_snapshot(stored: &StoredCluster) -> Result<()> {
    println!("{}", style("CLUSTER").bold().underlined());
    println!("  Id:         {}", style(&stored.id).cyan());
    println!("  Revision:   {}", style(stored.revision).yellow());

    let phase = match stored.phase.status_name() {
        "running" => style(stored.phase.to_string()).green(),
        "failed" => style(stored.phase.to_string()).red(),
        _ => style(stored.phase.to_string()).yellow(),
    };
    println!("  Phase:      {}", phase);
    println!(
        "  Updated:    {}",
        stored.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(state) = &stored.state {
        println!("\n{}", style("OBSERVED").bold().underlined());
        println!("  State:      {}", state.provisioning_state);
        for (kind, count) in &state.actual_instance_counts {
            println!("  {:<11} {} instance(s)", format!("{}:", kind), count);
        }
        for (label, endpoint) in [
            ("HTTPS", &state.endpoints.https_endpoint),
            ("SSH", &state.endpoints.ssh_endpoint),
            ("Edge SSH", &state.endpoints.edge_ssh_endpoint),
        ] {
            if let Some(endpoint) = endpoint {
                println!("  {:<11} {}", format!("{}:", label), endpoint);
            }
        }
        if let Some(reason) = &state.failure_reason {
            println!("  Failure:    {}", style(reason).red());
        }
    }

    println!("\n{}", style("LAST APPLIED").bold().underlined());
    print!("{}", stored.spec.to_yaml()?);
    Ok(())
}
