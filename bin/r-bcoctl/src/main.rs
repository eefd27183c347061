//! ---
//! bco_section: "05-networking-external-interfaces"
//! bco_subsection: "binary"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Control CLI for operators driving failover planning and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use r_bco_common::config::EngineConfig;
use r_bco_continuity::ContinuityError;
use r_bco_logging as logging;

mod commands;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "R-BCO failover orchestration utility",
    long_about = None
)]
struct Cli {
    /// Engine configuration file (overridden by R_BCO_CONFIG).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute a failover plan from topology and policy documents.
    Plan(commands::PlanArgs),
    /// Run a seeded what-if failover without touching real systems.
    Simulate(commands::SimulateArgs),
    /// Execute a previously computed plan, then verify and audit it.
    Execute(commands::ExecuteArgs),
    /// Report node health and quorum for a cluster.
    Status(commands::StatusArgs),
    /// Inspect and verify the audit trail.
    Audit(commands::AuditArgs),
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ContinuityError>() {
                Some(engine) => {
                    eprintln!("error[{}]: {err:#}", engine.code());
                    ExitCode::from(2)
                }
                None => {
                    eprintln!("error: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;
    match cli.command {
        Commands::Plan(args) => commands::plan(&config, args),
        Commands::Simulate(args) => commands::simulate(&config, args),
        Commands::Execute(args) => commands::execute(&config, args),
        Commands::Status(args) => commands::status(&config, args),
        Commands::Audit(args) => commands::audit(&config, args),
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<EngineConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        candidates.push(path);
    }
    candidates.push(PathBuf::from("configs/r-bco.toml"));
    Ok(EngineConfig::load_or_default(&candidates)?.config)
}
