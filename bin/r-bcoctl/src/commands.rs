//! ---
//! bco_section: "05-networking-external-interfaces"
//! bco_subsection: "binary"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Control CLI for operators driving failover planning and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use r_bco_common::config::EngineConfig;
use r_bco_common::time::{SharedClock, SystemClock};
use r_bco_continuity::{
    AuditRecord, AuditStore, ContinuityEngine, ContinuityPlan, FailoverOutcome, Scenario,
};
use r_bco_logging::{log_system_event, LogContext, SystemEventOutcome};
use r_bco_metrics::NoopRecorder;
use r_bco_topology::{load_cluster, load_policy, Cluster};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Cluster topology document (YAML).
    #[arg(long, value_name = "FILE")]
    cluster: PathBuf,
    /// Failover policy document (YAML).
    #[arg(long, value_name = "FILE")]
    policy: PathBuf,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[arg(long, value_name = "FILE")]
    cluster: PathBuf,
    #[arg(long, value_name = "FILE")]
    policy: PathBuf,
    /// primary_failure, random_failures or region_failure.
    #[arg(long, value_name = "KIND")]
    scenario: Scenario,
    /// Random seed; defaults to `simulation.default_seed`.
    #[arg(long)]
    seed: Option<u64>,
    /// Region to fail for region_failure; defaults to the primary's region.
    #[arg(long, value_name = "REGION")]
    region: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Plan JSON as printed by `plan`.
    #[arg(long, value_name = "FILE")]
    plan: PathBuf,
    /// Simulate every action instead of applying it.
    #[arg(long)]
    dry_run: bool,
    /// Operator approval for manual-strategy plans.
    #[arg(long)]
    approve: bool,
    /// Audit trail to append to; defaults to `audit.log_path`.
    #[arg(long, value_name = "FILE")]
    audit_log: Option<PathBuf>,
    /// Exit non-zero when verification fails.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long, value_name = "FILE")]
    cluster: PathBuf,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Audit trail; defaults to `audit.log_path`.
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,
    /// Show the latest record for this plan.
    #[arg(long, value_name = "ID")]
    plan_id: Option<String>,
}

pub fn plan(config: &EngineConfig, args: PlanArgs) -> Result<()> {
    let cluster = load_cluster(&args.cluster)?;
    let policy = load_policy(&args.policy)?;
    let engine = engine(config, cluster);
    engine.observe_topology();
    let plan = engine.plan(&policy)?;
    print_json(&plan)
}

pub fn simulate(config: &EngineConfig, args: SimulateArgs) -> Result<()> {
    let cluster = load_cluster(&args.cluster)?;
    let policy = load_policy(&args.policy)?;
    let scenario = args.scenario.with_region(args.region);
    let seed = args.seed.unwrap_or(config.simulation.default_seed);
    debug!(%scenario, seed, "running simulation");
    let result = engine(config, cluster).simulate(&policy, &scenario, seed)?;
    print_json(&result)
}

pub fn execute(config: &EngineConfig, args: ExecuteArgs) -> Result<()> {
    let contents = fs::read_to_string(&args.plan)
        .with_context(|| format!("unable to read plan file {}", args.plan.display()))?;
    let plan: ContinuityPlan = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse plan file {}", args.plan.display()))?;

    let engine = engine(config, plan.cluster().clone());
    engine.observe_topology();
    let execution_log = engine.execute(&plan, args.dry_run, args.approve)?;
    let verification = engine.verify(&plan, &execution_log, plan.policy())?;
    let audit = engine.audit(&plan, &execution_log, &verification)?;

    let audit_path = args
        .audit_log
        .unwrap_or_else(|| config.audit.log_path.clone());
    let mut store = AuditStore::open(&audit_path, clock())?;
    store.append(&audit)?;
    log_system_event(
        Some(
            &LogContext::new()
                .with_cluster(plan.cluster().id())
                .with_plan(plan.plan_id())
                .with_stage("execute"),
        ),
        "cli.execute",
        &format!("audit appended to {}", audit_path.display()),
        if verification.passed {
            SystemEventOutcome::Success
        } else {
            SystemEventOutcome::Fault
        },
    );

    let strict_failure = if args.strict {
        verification.clone().into_result().err()
    } else {
        None
    };
    print_json(&FailoverOutcome {
        plan,
        execution_log,
        verification,
        audit,
    })?;
    match strict_failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

pub fn status(config: &EngineConfig, args: StatusArgs) -> Result<()> {
    let cluster = load_cluster(&args.cluster)?;
    let engine = engine(config, cluster);
    engine.observe_topology();
    print_json(&engine.status())
}

#[derive(Debug, Serialize)]
struct AuditSummary {
    path: PathBuf,
    records: usize,
    chain_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<AuditRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest_valid: Option<bool>,
}

pub fn audit(config: &EngineConfig, args: AuditArgs) -> Result<()> {
    let path = args.log.unwrap_or_else(|| config.audit.log_path.clone());
    if !path.exists() {
        return Err(anyhow!("audit trail {} does not exist", path.display()));
    }
    let store = AuditStore::open(&path, clock())?;
    let records = store.entries()?.len();
    let chain_valid = store.verify()?;

    let record = match &args.plan_id {
        Some(plan_id) => Some(
            store
                .find(plan_id)?
                .ok_or_else(|| anyhow!("no audit record for plan '{plan_id}'"))?,
        ),
        None => None,
    };
    let manifest_valid = record.as_ref().map(|record| record.pack.verify_manifest());
    let tampered = !chain_valid || manifest_valid == Some(false);

    print_json(&AuditSummary {
        path: path.clone(),
        records,
        chain_valid,
        record,
        manifest_valid,
    })?;
    if tampered {
        return Err(anyhow!(
            "audit trail {} failed integrity verification",
            path.display()
        ));
    }
    Ok(())
}

fn clock() -> SharedClock {
    Arc::new(SystemClock)
}

fn engine(config: &EngineConfig, cluster: Cluster) -> ContinuityEngine {
    ContinuityEngine::from_config(cluster, config, clock(), Arc::new(NoopRecorder))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value).context("failed to render JSON output")?;
    writeln!(handle)?;
    Ok(())
}
