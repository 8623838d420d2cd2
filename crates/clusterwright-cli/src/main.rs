//! Clusterwright CLI - plan and inspect multi-role compute clusters

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "clusterwright")]
#[command(author = "Clusterwright Contributors")]
#[command(version)]
#[command(about = "Desired-state reconciliation for multi-role compute clusters", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Directory holding cluster snapshots
    #[arg(long, global = true, env = "CLUSTERWRIGHT_STATE_DIR")]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a cluster spec without contacting the control plane
    Validate {
        /// Spec file (YAML, or JSON with a .json extension)
        file: PathBuf,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the field schema (mutability, requirements, comparison)
    Describe {
        /// Field path, e.g. roles.workerNode.targetInstanceCount
        field: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what applying a spec would change, against the stored snapshot
    Plan {
        /// Spec file (YAML, or JSON with a .json extension)
        file: PathBuf,

        /// Exit with 3 when the plan has changes
        #[arg(long)]
        detailed_exitcode: bool,

        /// Output the change set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored cluster snapshots
    State {
        /// Cluster identifier (/resourceGroups/<group>/clusters/<name>); lists all when omitted
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Initialize tracing subscriber with environment filter, logging to stderr
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clusterwright")
        .join("state")
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);
    let state_dir = cli.state_dir.unwrap_or_else(default_state_dir);

    let result = match cli.command {
        Commands::Validate { file, json } => commands::validate::run(&file, json),
        Commands::Describe { field, json } => commands::describe::run(field.as_deref(), json),
        Commands::Plan {
            file,
            detailed_exitcode,
            json,
        } => commands::plan::run(&file, &state_dir, detailed_exitcode, json).await,
        Commands::State { id, json } => commands::state::run(id.as_deref(), &state_dir, json).await,
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            code
        }
    };
    std::process::exit(code);
}
