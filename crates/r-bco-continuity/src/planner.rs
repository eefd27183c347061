//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r_bco_common::time::{duration_to_millis, elapsed_between, SharedClock};
use r_bco_logging::{bco_info, bco_warn, LogContext};
use r_bco_topology::{
    Cluster, FailoverPolicy, FailoverStrategy, Node, NodeRole, QuorumStatus, ALL_NODES_TARGET,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use sha2::{Digest, Sha256};

use crate::error::{ContinuityError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Demote,
    Promote,
    DnsFlip,
    Restart,
    Notify,
    Verify,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Demote => "demote",
            ActionKind::Promote => "promote",
            ActionKind::DnsFlip => "dns_flip",
            ActionKind::Restart => "restart",
            ActionKind::Notify => "notify",
            ActionKind::Verify => "verify",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a failover plan.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverAction {
    kind: ActionKind,
    target: String,
    sequence: usize,
    #[serde(rename = "estimated_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    estimated: Duration,
}

impl FailoverAction {
    pub fn new(
        kind: ActionKind,
        target: impl Into<String>,
        sequence: usize,
        estimated: Duration,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            sequence,
            estimated,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn estimated(&self) -> Duration {
        self.estimated
    }

    pub fn targets_all(&self) -> bool {
        self.target == ALL_NODES_TARGET
    }
}

/// Ordered, immutable failover plan produced by [`ContinuityPlanner`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityPlan {
    plan_id: String,
    cluster: Cluster,
    policy: FailoverPolicy,
    old_primary: String,
    new_primary: String,
    actions: Vec<FailoverAction>,
    #[serde(rename = "total_estimated_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    total_estimated: Duration,
    requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quorum: Option<QuorumStatus>,
    created_at: DateTime<Utc>,
}

impl ContinuityPlan {
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    /// Cluster the plan was computed from.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    pub fn old_primary(&self) -> &str {
        &self.old_primary
    }

    pub fn new_primary(&self) -> &str {
        &self.new_primary
    }

    pub fn actions(&self) -> &[FailoverAction] {
        &self.actions
    }

    pub fn total_estimated(&self) -> Duration {
        self.total_estimated
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn quorum(&self) -> Option<&QuorumStatus> {
        self.quorum.as_ref()
    }

    /// Checks that the action list is the fixed demote, promote, dns_flip,
    /// notify, verify sequence between the recorded primaries. Plans read
    /// back from disk are not trusted to keep that shape.
    pub fn validate_shape(&self) -> Result<()> {
        let malformed = |reason: String| ContinuityError::MalformedPlan {
            plan: self.plan_id.clone(),
            reason,
        };
        match self.cluster.primary() {
            Some(primary) if primary.id() == self.old_primary => {}
            _ => {
                return Err(malformed(format!(
                    "'{}' is not the primary of cluster '{}'",
                    self.old_primary,
                    self.cluster.id()
                )))
            }
        }
        if !self.cluster.contains(&self.new_primary) || self.new_primary == self.old_primary {
            return Err(malformed(format!(
                "'{}' is not a valid promotion target",
                self.new_primary
            )));
        }
        let expected = build_actions(&self.old_primary, &self.new_primary, &self.policy);
        if self.actions.len() != expected.len() {
            return Err(malformed(format!(
                "expected {} actions, found {}",
                expected.len(),
                self.actions.len()
            )));
        }
        for (index, (action, want)) in self.actions.iter().zip(&expected).enumerate() {
            if action.kind != want.kind
                || action.target != want.target
                || action.sequence != want.sequence
            {
                return Err(malformed(format!(
                    "action {index} is {} on '{}' (sequence {}), expected {} on '{}'",
                    action.kind, action.target, action.sequence, want.kind, want.target
                )));
            }
        }
        Ok(())
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Healthy secondaries eligible for promotion, best first.
///
/// When the policy lists regions or sites, only candidates in a listed region
/// or site are eligible. Ordering is region rank, site rank, priority, larger
/// capacity, then id; unlisted ranks sort after listed ones.
pub fn rank_candidates<'a>(cluster: &'a Cluster, policy: &FailoverPolicy) -> Vec<&'a Node> {
    let mut candidates: Vec<&Node> = cluster
        .nodes_with_role(NodeRole::Secondary)
        .filter(|node| node.is_healthy())
        .filter(|node| {
            !policy.has_location_priority()
                || policy.region_rank(node.region()).is_some()
                || policy.site_rank(node.site()).is_some()
        })
        .collect();
    candidates.sort_by(|a, b| candidate_cmp(a, b, policy));
    candidates
}

fn candidate_cmp(a: &Node, b: &Node, policy: &FailoverPolicy) -> Ordering {
    let rank = |value: Option<usize>| value.unwrap_or(usize::MAX);
    rank(policy.region_rank(a.region()))
        .cmp(&rank(policy.region_rank(b.region())))
        .then_with(|| rank(policy.site_rank(a.site())).cmp(&rank(policy.site_rank(b.site()))))
        .then_with(|| a.priority().cmp(&b.priority()))
        .then_with(|| b.capacity().total_cmp(&a.capacity()))
        .then_with(|| a.id().cmp(b.id()))
}

/// Deterministic failover target selection and action sequencing.
#[derive(Debug, Clone)]
pub struct ContinuityPlanner {
    clock: SharedClock,
}

impl ContinuityPlanner {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    pub fn plan(&self, cluster: &Cluster, policy: &FailoverPolicy) -> Result<ContinuityPlan> {
        self.plan_with_quorum(cluster, policy, None)
    }

    /// Builds a plan moving the primary role to the best healthy secondary.
    ///
    /// `quorum` is the monitor's view at plan time. For quorum-based policies
    /// without one, quorum is counted from the cluster's own statuses.
    pub fn plan_with_quorum(
        &self,
        cluster: &Cluster,
        policy: &FailoverPolicy,
        quorum: Option<&QuorumStatus>,
    ) -> Result<ContinuityPlan> {
        let started = self.clock.now();
        let ctx = LogContext::new()
            .with_cluster(cluster.id())
            .with_stage("plan");

        let Some(old_primary) = cluster.primary() else {
            return Err(ContinuityError::InsufficientTopology {
                cluster: cluster.id().to_owned(),
                reason: "no primary node declared".to_owned(),
            });
        };

        policy
            .validate_for(cluster)
            .map_err(|err| ContinuityError::InvalidPolicy {
                policy: policy.id().to_owned(),
                reason: err.to_string(),
            })?;

        if policy.strategy() == FailoverStrategy::QuorumBased {
            let observed = quorum
                .copied()
                .unwrap_or_else(|| QuorumStatus::from_cluster(cluster));
            if !observed.has_quorum() {
                return Err(ContinuityError::InsufficientQuorum {
                    cluster: cluster.id().to_owned(),
                    healthy: observed.healthy_nodes(),
                    total: observed.total_nodes(),
                    threshold: observed.threshold(),
                });
            }
        }

        let candidates = rank_candidates(cluster, policy);
        let Some(target) = candidates.first() else {
            let reason = if policy.has_location_priority() {
                "no healthy secondary in a prioritised region or site"
            } else {
                "no healthy secondary available"
            };
            return Err(ContinuityError::NoTargetFound {
                cluster: cluster.id().to_owned(),
                reason: reason.to_owned(),
            });
        };

        let actions = build_actions(old_primary.id(), target.id(), policy);
        let total_estimated: Duration = actions.iter().map(FailoverAction::estimated).sum();
        if total_estimated > policy.timing().max_execution_time {
            return Err(ContinuityError::PolicyViolation {
                policy: policy.id().to_owned(),
                reason: format!(
                    "estimated execution {}ms exceeds limit {}ms",
                    duration_to_millis(total_estimated),
                    duration_to_millis(policy.timing().max_execution_time)
                ),
            });
        }

        let plan_id = plan_id(cluster, policy, old_primary.id(), target.id(), &actions)?;
        let plan = ContinuityPlan {
            plan_id,
            cluster: cluster.clone(),
            policy: policy.clone(),
            old_primary: old_primary.id().to_owned(),
            new_primary: target.id().to_owned(),
            actions,
            total_estimated,
            requires_approval: policy.strategy() == FailoverStrategy::Manual,
            quorum: quorum.copied(),
            created_at: started,
        };

        let elapsed = elapsed_between(started, self.clock.now());
        let ctx = ctx.with_plan(plan.plan_id()).with_node(plan.new_primary());
        if elapsed > policy.timing().max_plan_time {
            bco_warn!(
                context = ctx,
                "planning took {}ms, above the {}ms budget",
                duration_to_millis(elapsed),
                duration_to_millis(policy.timing().max_plan_time)
            );
        }
        bco_info!(
            context = ctx,
            "planned failover {} -> {} ({} candidates, {}ms estimated)",
            plan.old_primary,
            plan.new_primary,
            candidates.len(),
            duration_to_millis(total_estimated)
        );
        Ok(plan)
    }
}

fn build_actions(old_primary: &str, new_primary: &str, policy: &FailoverPolicy) -> Vec<FailoverAction> {
    let durations = policy.action_durations();
    [
        (ActionKind::Demote, old_primary, durations.demote),
        (ActionKind::Promote, new_primary, durations.promote),
        (ActionKind::DnsFlip, new_primary, durations.dns_flip),
        (ActionKind::Notify, ALL_NODES_TARGET, durations.notify),
        (ActionKind::Verify, new_primary, durations.verify),
    ]
    .into_iter()
    .enumerate()
    .map(|(sequence, (kind, target, estimated))| {
        FailoverAction::new(kind, target, sequence, estimated)
    })
    .collect()
}

fn plan_id(
    cluster: &Cluster,
    policy: &FailoverPolicy,
    old_primary: &str,
    new_primary: &str,
    actions: &[FailoverAction],
) -> Result<String> {
    let mut hasher = Sha256::new();
    for part in [cluster.id(), policy.id(), old_primary, new_primary] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(serde_json::to_vec(actions)?);
    let digest = hex::encode(hasher.finalize());
    Ok(format!("plan-{}", &digest[..16]))
}
