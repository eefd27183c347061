//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r_bco_common::config::EngineConfig;
use r_bco_common::time::{duration_to_millis, elapsed_between, SharedClock};
use r_bco_logging::{bco_debug, log_system_event, LogContext, SystemEventOutcome};
use r_bco_metrics::{ExecutionStatus, SharedRecorder};
use r_bco_redundancy::{Heartbeat, HeartbeatMonitor, HeartbeatOutcome, MonitorSettings};
use r_bco_topology::{Cluster, FailoverPolicy, NodeRole, NodeStatus, QuorumStatus};
use serde::{Deserialize, Serialize};

use crate::auditor::{AuditPack, ContinuityAuditor};
use crate::error::Result;
use crate::executor::{ActionDriver, ExecutionLog, FailoverExecutor, SimulatedDriver};
use crate::planner::{ContinuityPlan, ContinuityPlanner};
use crate::simulator::{FailoverSimulator, Scenario, SimulationResult, SimulationSettings};
use crate::verifier::{FailoverVerifier, VerificationReport};

/// Engine tunables derived from [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub monitor: MonitorSettings,
    pub freshness_sla: Duration,
    pub simulation: SimulationSettings,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            monitor: MonitorSettings::from(&config.monitor),
            freshness_sla: config.verifier.freshness_sla,
            simulation: SimulationSettings::from_config(config),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub id: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub region: String,
    pub site: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Monitor view of a cluster at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster_id: String,
    pub primary: Option<String>,
    pub nodes: Vec<NodeHealth>,
    pub quorum: QuorumStatus,
    pub observed_at: DateTime<Utc>,
}

/// Everything produced by one end-to-end failover run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverOutcome {
    pub plan: ContinuityPlan,
    pub execution_log: ExecutionLog,
    pub verification: VerificationReport,
    pub audit: AuditPack,
}

/// Façade wiring the monitor, planner, executor, verifier, simulator and
/// auditor around one cluster.
#[derive(Debug, Clone)]
pub struct ContinuityEngine {
    cluster: Cluster,
    clock: SharedClock,
    settings: EngineSettings,
    recorder: SharedRecorder,
    monitor: Arc<HeartbeatMonitor>,
    driver: Arc<dyn ActionDriver>,
    signing_key: Option<Vec<u8>>,
}

impl ContinuityEngine {
    pub fn new(
        cluster: Cluster,
        settings: EngineSettings,
        clock: SharedClock,
        recorder: SharedRecorder,
    ) -> Self {
        let monitor = Arc::new(HeartbeatMonitor::new(
            &cluster,
            clock.clone(),
            settings.monitor,
        ));
        Self {
            cluster,
            clock,
            settings,
            recorder,
            monitor,
            driver: Arc::new(SimulatedDriver),
            signing_key: None,
        }
    }

    /// Builds an engine from configuration, including the audit signing key
    /// when its environment variable is set.
    pub fn from_config(
        cluster: Cluster,
        config: &EngineConfig,
        clock: SharedClock,
        recorder: SharedRecorder,
    ) -> Self {
        Self::new(cluster, EngineSettings::from_config(config), clock, recorder)
            .with_signing_key(config.audit.signing_key())
    }

    pub fn with_signing_key(mut self, key: Option<Vec<u8>>) -> Self {
        self.signing_key = key;
        self
    }

    /// Rebuilds the monitor so that nodes silent since `at` are judged
    /// against the staleness window from that instant.
    pub fn with_observation_start(mut self, at: DateTime<Utc>) -> Self {
        self.monitor = Arc::new(
            HeartbeatMonitor::new(&self.cluster, self.clock.clone(), self.settings.monitor)
                .with_registered_at(at),
        );
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn ActionDriver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.monitor
    }

    pub fn record_heartbeat(&self, heartbeat: Heartbeat) -> HeartbeatOutcome {
        self.monitor.record_heartbeat(heartbeat)
    }

    /// Treats the topology document as the freshest observation of every node.
    pub fn observe_topology(&self) {
        self.monitor.observe_cluster(&self.cluster);
    }

    pub fn status(&self) -> ClusterStatus {
        let snapshot = self.monitor.snapshot(&self.cluster);
        let quorum = QuorumStatus::from_cluster(&snapshot);
        self.recorder
            .update_status(quorum.healthy_nodes(), quorum.has_quorum());
        ClusterStatus {
            cluster_id: snapshot.id().to_owned(),
            primary: snapshot.primary().map(|node| node.id().to_owned()),
            nodes: snapshot
                .nodes()
                .iter()
                .map(|node| NodeHealth {
                    id: node.id().to_owned(),
                    role: node.role(),
                    status: node.status(),
                    region: node.region().to_owned(),
                    site: node.site().to_owned(),
                    last_heartbeat: self
                        .monitor
                        .last_heartbeat(node.id())
                        .map(|heartbeat| heartbeat.timestamp),
                })
                .collect(),
            quorum,
            observed_at: self.clock.now(),
        }
    }

    /// Plans against the monitor's current view of the cluster.
    pub fn plan(&self, policy: &FailoverPolicy) -> Result<ContinuityPlan> {
        let snapshot = self.monitor.snapshot(&self.cluster);
        let quorum = QuorumStatus::from_cluster(&snapshot);
        self.recorder
            .update_status(quorum.healthy_nodes(), quorum.has_quorum());
        ContinuityPlanner::new(self.clock.clone()).plan_with_quorum(&snapshot, policy, Some(&quorum))
    }

    pub fn execute(&self, plan: &ContinuityPlan, dry_run: bool, approved: bool) -> Result<ExecutionLog> {
        let log = FailoverExecutor::new(self.clock.clone())
            .with_driver(self.driver.clone())
            .with_approval(approved)
            .execute(plan, dry_run)?;
        let status = if log.succeeded() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        };
        self.recorder.record_execution(
            plan.cluster().id(),
            status,
            duration_to_millis(log.elapsed()) as f64,
        );
        Ok(log)
    }

    /// Verifies the cluster produced by `execution_log` against `policy`.
    pub fn verify(
        &self,
        plan: &ContinuityPlan,
        execution_log: &ExecutionLog,
        policy: &FailoverPolicy,
    ) -> Result<VerificationReport> {
        let started = self.clock.now();
        let post_failover = execution_log.resulting_cluster(plan)?;
        let report = FailoverVerifier::new(
            self.monitor.clone(),
            policy.clone(),
            self.settings.freshness_sla,
        )
        .verify(plan, execution_log, &post_failover);
        let elapsed = elapsed_between(started, self.clock.now());
        self.recorder
            .record_validation(plan.cluster().id(), elapsed.as_secs_f64() * 1000.0);
        Ok(report)
    }

    pub fn simulate(
        &self,
        policy: &FailoverPolicy,
        scenario: &Scenario,
        seed: u64,
    ) -> Result<SimulationResult> {
        FailoverSimulator::new(self.settings.simulation).simulate(&self.cluster, policy, scenario, seed)
    }

    pub fn audit(
        &self,
        plan: &ContinuityPlan,
        execution_log: &ExecutionLog,
        verification: &VerificationReport,
    ) -> Result<AuditPack> {
        ContinuityAuditor::new(self.clock.clone())
            .with_signing_key(self.signing_key.clone())
            .audit(plan, execution_log, verification)
    }

    /// Plan, execute, verify and audit in one pass.
    pub fn run_failover(
        &self,
        policy: &FailoverPolicy,
        dry_run: bool,
        approved: bool,
    ) -> Result<FailoverOutcome> {
        let ctx = LogContext::new()
            .with_cluster(self.cluster.id())
            .with_stage("failover");
        let result = self.run_stages(policy, dry_run, approved);
        match &result {
            Ok(outcome) => {
                let ctx = ctx.with_plan(outcome.plan.plan_id());
                bco_debug!(
                    context = ctx,
                    "failover run complete with confidence {}",
                    outcome.audit.confidence
                );
                let event_outcome = if outcome.verification.passed {
                    SystemEventOutcome::Success
                } else {
                    SystemEventOutcome::Fault
                };
                log_system_event(
                    Some(&ctx),
                    "failover.run",
                    &format!(
                        "{} -> {} verified={}",
                        outcome.plan.old_primary(),
                        outcome.plan.new_primary(),
                        outcome.verification.passed
                    ),
                    event_outcome,
                );
            }
            Err(err) => {
                log_system_event(Some(&ctx), "failover.run", &err.to_string(), SystemEventOutcome::Fault);
            }
        }
        result
    }

    fn run_stages(
        &self,
        policy: &FailoverPolicy,
        dry_run: bool,
        approved: bool,
    ) -> Result<FailoverOutcome> {
        let plan = self.plan(policy)?;
        let execution_log = self.execute(&plan, dry_run, approved)?;
        let verification = self.verify(&plan, &execution_log, policy)?;
        let audit = self.audit(&plan, &execution_log, &verification)?;
        Ok(FailoverOutcome {
            plan,
            execution_log,
            verification,
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use r_bco_common::time::ManualClock;
    use r_bco_metrics::{MemoryRecorder, RecordedCall};
    use r_bco_topology::{FailoverStrategy, Node};

    use super::*;

    fn engine(recorder: Arc<MemoryRecorder>) -> ContinuityEngine {
        let cluster = Cluster::new(
            "c1",
            vec![
                Node::new("n1", NodeRole::Primary, NodeStatus::Unhealthy, "r1", "s1", 1, 1.0)
                    .unwrap(),
                Node::new("n2", NodeRole::Secondary, NodeStatus::Healthy, "r1", "s1", 2, 1.0)
                    .unwrap(),
                Node::new("n3", NodeRole::Secondary, NodeStatus::Healthy, "r2", "s2", 1, 1.0)
                    .unwrap(),
            ],
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap(),
        ));
        let engine = ContinuityEngine::new(cluster, EngineSettings::default(), clock, recorder)
            .with_signing_key(Some(b"audit-key".to_vec()));
        engine.observe_topology();
        engine
    }

    #[test]
    fn run_failover_records_metrics_and_signs() {
        let recorder = Arc::new(MemoryRecorder::default());
        let engine = engine(recorder.clone());
        let policy = FailoverPolicy::new("p1", FailoverStrategy::Automatic)
            .unwrap()
            .with_region_priority(["r1", "r2"])
            .unwrap()
            .with_min_healthy_nodes(2);
        let outcome = engine.run_failover(&policy, true, false).unwrap();
        assert_eq!(outcome.plan.new_primary(), "n2");
        assert!(outcome.verification.passed);
        assert_eq!(outcome.audit.confidence, 100);
        assert!(outcome.audit.verify_manifest());
        assert!(outcome.audit.verify_signature(b"audit-key"));
        assert!(!outcome.audit.verify_signature(b"other-key"));

        let calls = recorder.calls();
        assert!(calls.iter().any(|call| matches!(
            call,
            RecordedCall::Execution { status: ExecutionStatus::Success, .. }
        )));
        assert!(calls
            .iter()
            .any(|call| matches!(call, RecordedCall::Validation { .. })));
        assert!(calls.iter().any(|call| matches!(
            call,
            RecordedCall::Status { healthy_nodes: 2, has_quorum: true }
        )));
    }

    #[test]
    fn status_reflects_monitor_view() {
        let engine = engine(Arc::new(MemoryRecorder::default()));
        let status = engine.status();
        assert_eq!(status.primary.as_deref(), Some("n1"));
        assert_eq!(status.quorum.healthy_nodes(), 2);
        assert!(status.nodes.iter().all(|node| node.last_heartbeat.is_some()));
    }
}
