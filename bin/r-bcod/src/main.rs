//! ---
//! bco_section: "01-core-functionality"
//! bco_subsection: "binary"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Binary entrypoint for the R-BCO daemon."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;
use r_bco_api::{spawn_api_server, ApiState};
use r_bco_common::config::EngineConfig;
use r_bco_common::logging::init_tracing;
use r_bco_metrics::new_registry;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "R-BCO continuity API daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "ADDR", help = "Override api.listen")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-bco.toml"));

    let load_started = Instant::now();
    let loaded = EngineConfig::load_or_default(&candidates)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }

    init_tracing("r-bcod", &config.logging)?;
    info!(
        source = %loaded
            .source
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "defaults".to_owned()),
        load_ms = load_duration.as_millis() as u64,
        "configuration loaded"
    );

    if !config.api.enabled {
        bail!("api is disabled in configuration; r-bcod has nothing to serve");
    }
    if config.api.keys.is_empty() {
        tracing::warn!("no api keys configured; every engine request will be rejected");
    }

    let listen = config.api.listen;
    let state = Arc::new(ApiState::new(config, new_registry())?);
    let server = spawn_api_server(state, listen)?;

    info!(address = %server.addr(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}
