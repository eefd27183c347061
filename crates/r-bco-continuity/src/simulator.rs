//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Seeded what-if runs of the full plan, execute and verify chain.
//!
//! Every run owns its RNG and a virtual clock anchored at the configured
//! epoch, so the same cluster, policy, scenario and seed always serialise to
//! the same bytes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r_bco_common::config::{EngineConfig, SimulationConfig};
use r_bco_common::time::{ManualClock, SharedClock};
use r_bco_logging::{bco_info, LogContext};
use r_bco_redundancy::{Heartbeat, HeartbeatMonitor, MonitorSettings};
use r_bco_topology::{Cluster, FailoverPolicy, Node, NodeStatus};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, Result};
use crate::executor::{ExecutionLog, FailoverExecutor};
use crate::planner::{ContinuityPlan, ContinuityPlanner};
use crate::verifier::{FailoverVerifier, VerificationReport};

/// Fault to inject before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    PrimaryFailure,
    /// Between one and half (rounded up) of the non-primary nodes fail.
    RandomFailures,
    /// Every node in `region` fails; defaults to the primary's region.
    RegionFailure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::PrimaryFailure => "primary_failure",
            Scenario::RandomFailures => "random_failures",
            Scenario::RegionFailure { .. } => "region_failure",
        }
    }

    /// Sets the region of a region failure; other scenarios are unchanged.
    pub fn with_region(self, region: Option<String>) -> Self {
        match self {
            Scenario::RegionFailure { .. } => Scenario::RegionFailure { region },
            other => other,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ContinuityError;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim() {
            "primary_failure" => Ok(Scenario::PrimaryFailure),
            "random_failures" => Ok(Scenario::RandomFailures),
            "region_failure" => Ok(Scenario::RegionFailure { region: None }),
            other => Err(ContinuityError::InvalidScenario {
                reason: format!(
                    "unknown scenario '{other}', expected primary_failure, random_failures or region_failure"
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub scenario: Scenario,
    pub seed: u64,
    pub failed_nodes: Vec<String>,
    pub faulted_cluster: Cluster,
    pub plan: ContinuityPlan,
    pub execution_log: ExecutionLog,
    pub verification: VerificationReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSettings {
    pub epoch: DateTime<Utc>,
    pub heartbeat_latency: Duration,
    pub monitor: MonitorSettings,
    pub freshness_sla: Duration,
}

impl SimulationSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.simulation, MonitorSettings::from(&config.monitor), config.verifier.freshness_sla)
    }

    pub fn new(simulation: &SimulationConfig, monitor: MonitorSettings, freshness_sla: Duration) -> Self {
        Self {
            epoch: simulation.epoch,
            heartbeat_latency: simulation.heartbeat_latency,
            monitor,
            freshness_sla,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct FailoverSimulator {
    settings: SimulationSettings,
}

impl FailoverSimulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn simulate(
        &self,
        cluster: &Cluster,
        policy: &FailoverPolicy,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<SimulationResult> {
        let manual = Arc::new(ManualClock::new(self.settings.epoch));
        let clock: SharedClock = manual.clone();
        let mut rng = StdRng::seed_from_u64(seed);

        let failed_nodes = select_failures(cluster, scenario, &mut rng)?;
        let ctx = LogContext::new()
            .with_cluster(cluster.id())
            .with_stage("simulate");
        bco_info!(
            context = ctx,
            "injecting {} (seed {}): failing [{}]",
            scenario,
            seed,
            failed_nodes.join(", ")
        );

        let monitor = Arc::new(HeartbeatMonitor::new(
            cluster,
            clock.clone(),
            self.settings.monitor,
        ));
        self.report_heartbeats(&monitor, cluster, &failed_nodes);
        let faulted_cluster = monitor.snapshot(cluster);
        let quorum = monitor.compute_quorum(cluster);

        let plan = ContinuityPlanner::new(clock.clone()).plan_with_quorum(
            &faulted_cluster,
            policy,
            Some(&quorum),
        )?;
        let execution_log = FailoverExecutor::new(clock).execute(&plan, true)?;
        let post_failover = execution_log.resulting_cluster(&plan)?;

        // survivors report again once the simulated execution has finished
        if let Some(completed_at) = execution_log.completed_at() {
            manual.set(completed_at);
        }
        self.report_heartbeats(&monitor, cluster, &failed_nodes);

        let verification =
            FailoverVerifier::new(monitor, policy.clone(), self.settings.freshness_sla).verify(
                &plan,
                &execution_log,
                &post_failover,
            );

        Ok(SimulationResult {
            scenario: scenario.clone(),
            seed,
            failed_nodes,
            faulted_cluster,
            plan,
            execution_log,
            verification,
        })
    }

    fn report_heartbeats(&self, monitor: &HeartbeatMonitor, cluster: &Cluster, failed: &[String]) {
        let now = monitor.now();
        for node in cluster.nodes() {
            let status = if failed.iter().any(|id| id == node.id()) {
                NodeStatus::Unhealthy
            } else {
                NodeStatus::Healthy
            };
            monitor.record_heartbeat(Heartbeat::new(
                node.id(),
                now,
                status,
                self.settings.heartbeat_latency,
            ));
        }
    }
}

/// Node ids failed by `scenario`, in cluster order.
fn select_failures(cluster: &Cluster, scenario: &Scenario, rng: &mut StdRng) -> Result<Vec<String>> {
    let ids = |nodes: Vec<&Node>| -> Vec<String> {
        nodes.into_iter().map(|node| node.id().to_owned()).collect()
    };
    match scenario {
        Scenario::PrimaryFailure => {
            let primary = cluster.primary().ok_or_else(|| ContinuityError::InsufficientTopology {
                cluster: cluster.id().to_owned(),
                reason: "no primary node to fail".to_owned(),
            })?;
            Ok(vec![primary.id().to_owned()])
        }
        Scenario::RandomFailures => {
            let pool: Vec<&Node> = cluster.nodes().iter().filter(|node| !node.is_primary()).collect();
            if pool.is_empty() {
                return Ok(Vec::new());
            }
            let upper = pool.len().div_ceil(2);
            let count = rng.gen_range(1..=upper);
            let mut picked = sample(rng, pool.len(), count).into_vec();
            picked.sort_unstable();
            Ok(ids(picked.into_iter().map(|index| pool[index]).collect()))
        }
        Scenario::RegionFailure { region } => {
            let region = match region {
                Some(region) => region.as_str(),
                None => cluster
                    .primary()
                    .map(Node::region)
                    .ok_or_else(|| ContinuityError::InvalidScenario {
                        reason: "region_failure needs a region when the cluster has no primary"
                            .to_owned(),
                    })?,
            };
            if !cluster.has_region(region) {
                return Err(ContinuityError::InvalidScenario {
                    reason: format!("region '{region}' is not part of cluster '{}'", cluster.id()),
                });
            }
            Ok(ids(cluster.nodes_in_region(region).collect()))
        }
    }
}
