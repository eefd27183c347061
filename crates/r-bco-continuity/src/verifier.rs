//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r_bco_common::time::{duration_to_millis, elapsed_between};
use r_bco_logging::{bco_info, bco_warn, LogContext};
use r_bco_redundancy::HeartbeatMonitor;
use r_bco_topology::{Cluster, FailoverPolicy, Node, QuorumStatus};
use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, Result};
use crate::executor::{ActionOutcome, ExecutionLog};
use crate::planner::{rank_candidates, ContinuityPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Consistency,
    PolicyAdherence,
    Quorum,
    DataFreshness,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Consistency => "consistency",
            CheckKind::PolicyAdherence => "policy_adherence",
            CheckKind::Quorum => "quorum",
            CheckKind::DataFreshness => "data_freshness",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub check: CheckKind,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub plan_id: String,
    pub cluster_id: String,
    pub policy_id: String,
    pub passed: bool,
    pub checks: Vec<VerificationCheck>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Quorum of the post-failover cluster as seen by the monitor.
    pub quorum: QuorumStatus,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    pub fn check(&self, kind: CheckKind) -> Option<&VerificationCheck> {
        self.checks.iter().find(|check| check.check == kind)
    }

    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|check| check.passed).count()
    }

    /// Converts a failing report into the typed error of its first failing
    /// check, or of the failed execution when every check passed.
    pub fn into_result(self) -> Result<Self> {
        if self.passed {
            return Ok(self);
        }
        let Some(failed) = self.checks.iter().find(|check| !check.passed) else {
            let reason = self
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| "execution did not complete".to_owned());
            return Err(ContinuityError::ActionExecution {
                plan: self.plan_id,
                sequence: 0,
                reason,
            });
        };
        let reason = failed.detail.clone();
        Err(match failed.check {
            CheckKind::Consistency => ContinuityError::InsufficientTopology {
                cluster: self.cluster_id,
                reason,
            },
            CheckKind::Quorum => ContinuityError::InsufficientQuorum {
                cluster: self.cluster_id,
                healthy: self.quorum.healthy_nodes(),
                total: self.quorum.total_nodes(),
                threshold: self.quorum.threshold(),
            },
            CheckKind::PolicyAdherence | CheckKind::DataFreshness => {
                ContinuityError::PolicyViolation {
                    policy: self.policy_id,
                    reason,
                }
            }
        })
    }
}

/// Post-failover checks against the current policy and monitor state.
#[derive(Debug, Clone)]
pub struct FailoverVerifier {
    monitor: Arc<HeartbeatMonitor>,
    policy: FailoverPolicy,
    freshness_sla: Duration,
}

impl FailoverVerifier {
    pub fn new(monitor: Arc<HeartbeatMonitor>, policy: FailoverPolicy, freshness_sla: Duration) -> Self {
        Self {
            monitor,
            policy,
            freshness_sla,
        }
    }

    pub fn verify(
        &self,
        plan: &ContinuityPlan,
        execution_log: &ExecutionLog,
        post_failover: &Cluster,
    ) -> VerificationReport {
        let ctx = LogContext::new()
            .with_cluster(post_failover.id())
            .with_plan(plan.plan_id())
            .with_stage("verify");
        let now = self.monitor.now();
        let observed = self.monitor.snapshot(post_failover);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let quorum = self.monitor.compute_quorum(post_failover);
        let checks = vec![
            consistency(plan, post_failover),
            self.policy_adherence(plan, &observed, &mut warnings),
            quorum_check(&quorum, &mut warnings),
            self.data_freshness(plan, now, &mut warnings),
        ];
        for check in checks.iter().filter(|check| !check.passed) {
            errors.push(format!("{}: {}", check.check, check.detail));
        }
        if let Some(entry) = execution_log.failed_entry() {
            let reason = match &entry.outcome {
                ActionOutcome::Failed { reason } => reason.as_str(),
                _ => "",
            };
            errors.push(format!(
                "execution: action {} {} on '{}' failed: {}",
                entry.action.sequence(),
                entry.action.kind(),
                entry.action.target(),
                reason
            ));
        }

        let passed = errors.is_empty();
        let report = VerificationReport {
            plan_id: plan.plan_id().to_owned(),
            cluster_id: post_failover.id().to_owned(),
            policy_id: self.policy.id().to_owned(),
            passed,
            checks,
            errors,
            warnings,
            quorum,
            verified_at: now,
        };
        for warning in &report.warnings {
            bco_warn!(context = ctx, "{}", warning);
        }
        bco_info!(
            context = ctx,
            "verification passed={} ({} of {} checks)",
            report.passed,
            report.passed_checks(),
            report.checks.len()
        );
        report
    }

    fn policy_adherence(
        &self,
        plan: &ContinuityPlan,
        observed: &Cluster,
        warnings: &mut Vec<String>,
    ) -> VerificationCheck {
        let ranked = rank_candidates(plan.cluster(), &self.policy);
        let best = ranked.first().map(|node| node.id());
        let healthy = observed.healthy_count();
        let min_healthy = self.policy.min_healthy_nodes();

        if let (Some(top_region), Some(target)) = (
            self.policy.region_priority().first(),
            plan.cluster().node(plan.new_primary()),
        ) {
            if target.region() != top_region {
                warnings.push(format!(
                    "new primary '{}' is in region '{}', outside preferred region '{}'",
                    target.id(),
                    target.region(),
                    top_region
                ));
            }
        }

        let (passed, detail) = match best {
            Some(best) if best != plan.new_primary() => (
                false,
                format!(
                    "current policy prefers '{}' over planned target '{}'",
                    best,
                    plan.new_primary()
                ),
            ),
            None => (
                false,
                "current policy admits no promotion candidate".to_owned(),
            ),
            Some(_) if healthy < min_healthy => (
                false,
                format!("{healthy} healthy nodes, policy requires {min_healthy}"),
            ),
            Some(best) => (
                true,
                format!("'{best}' is the top-ranked candidate; {healthy} healthy nodes"),
            ),
        };
        VerificationCheck {
            check: CheckKind::PolicyAdherence,
            passed,
            detail,
        }
    }

    fn data_freshness(
        &self,
        plan: &ContinuityPlan,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> VerificationCheck {
        let sla_ms = duration_to_millis(self.freshness_sla);
        let (passed, detail) = match self.monitor.last_heartbeat(plan.new_primary()) {
            None => (
                false,
                format!("no heartbeat recorded for '{}'", plan.new_primary()),
            ),
            Some(heartbeat) => {
                let gap = elapsed_between(heartbeat.timestamp, now);
                let gap_ms = duration_to_millis(gap);
                if gap > self.freshness_sla {
                    (false, format!("last heartbeat {gap_ms}ms old, SLA {sla_ms}ms"))
                } else {
                    if gap > self.freshness_sla / 2 {
                        warnings.push(format!(
                            "new primary heartbeat {gap_ms}ms old, over half the {sla_ms}ms SLA"
                        ));
                    }
                    (true, format!("last heartbeat {gap_ms}ms old, SLA {sla_ms}ms"))
                }
            }
        };
        VerificationCheck {
            check: CheckKind::DataFreshness,
            passed,
            detail,
        }
    }
}

fn quorum_check(quorum: &QuorumStatus, warnings: &mut Vec<String>) -> VerificationCheck {
    if quorum.has_quorum() && quorum.at_threshold() {
        warnings.push(format!(
            "quorum held exactly at threshold {} of {}",
            quorum.threshold(),
            quorum.total_nodes()
        ));
    }
    VerificationCheck {
        check: CheckKind::Quorum,
        passed: quorum.has_quorum(),
        detail: format!(
            "{} healthy of {}, threshold {}",
            quorum.healthy_nodes(),
            quorum.total_nodes(),
            quorum.threshold()
        ),
    }
}

fn consistency(plan: &ContinuityPlan, post_failover: &Cluster) -> VerificationCheck {
    let primaries: Vec<&str> = post_failover
        .nodes()
        .iter()
        .filter(|node| node.is_primary())
        .map(Node::id)
        .collect();
    let (passed, detail) = match primaries.as_slice() {
        [only] if *only == plan.new_primary() => (true, format!("'{only}' is the sole primary")),
        [only] => (
            false,
            format!(
                "primary is '{}', expected '{}'",
                only,
                plan.new_primary()
            ),
        ),
        [] => (false, "no primary after failover".to_owned()),
        many => (false, format!("multiple primaries: {}", many.join(", "))),
    };
    VerificationCheck {
        check: CheckKind::Consistency,
        passed,
        detail,
    }
}
