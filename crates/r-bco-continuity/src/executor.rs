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
use r_bco_common::time::{elapsed_between, to_chrono, SharedClock};
use r_bco_logging::{bco_debug, bco_error, bco_info, LogContext};
use r_bco_topology::{Cluster, NodeRole};
use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, Result};
use crate::planner::{ActionKind, ContinuityPlan, FailoverAction};

/// Carries out a single failover action against real infrastructure.
///
/// The returned outcome is recorded verbatim: a driver that performed the
/// action reports `Succeeded`, one that only modelled it reports `Simulated`.
pub trait ActionDriver: Send + Sync + fmt::Debug {
    fn apply(&self, plan: &ContinuityPlan, action: &FailoverAction) -> Result<ActionOutcome>;
}

/// Driver that touches nothing and reports every action as simulated.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedDriver;

impl ActionDriver for SimulatedDriver {
    fn apply(&self, _plan: &ContinuityPlan, _action: &FailoverAction) -> Result<ActionOutcome> {
        Ok(ActionOutcome::Simulated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Simulated,
    Failed { reason: String },
}

impl ActionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub action: FailoverAction,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: ActionOutcome,
}

/// Ordered record of an execution attempt. A failed action is always the
/// last entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub plan_id: String,
    pub dry_run: bool,
    pub entries: Vec<ExecutionEntry>,
}

impl ExecutionLog {
    pub fn succeeded(&self) -> bool {
        self.failed_entry().is_none()
    }

    pub fn failed_entry(&self) -> Option<&ExecutionEntry> {
        self.entries.iter().find(|entry| entry.outcome.is_failed())
    }

    /// True when at least one action was carried out rather than simulated.
    pub fn applied(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.outcome == ActionOutcome::Succeeded)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|entry| entry.started_at)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|entry| entry.completed_at)
    }

    /// Simulated wall time covered by the log.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at(), self.completed_at()) {
            (Some(start), Some(end)) => elapsed_between(start, end),
            _ => Duration::ZERO,
        }
    }

    /// Cluster after the completed role changes of `plan` are applied.
    pub fn resulting_cluster(&self, plan: &ContinuityPlan) -> Result<Cluster> {
        let changes: Vec<(&str, NodeRole)> = self
            .entries
            .iter()
            .filter(|entry| !entry.outcome.is_failed())
            .filter_map(|entry| match entry.action.kind() {
                ActionKind::Demote => Some((entry.action.target(), NodeRole::Secondary)),
                ActionKind::Promote => Some((entry.action.target(), NodeRole::Primary)),
                _ => None,
            })
            .collect();
        Ok(plan.cluster().with_roles(&changes)?)
    }
}

/// Runs plan actions strictly in order, halting at the first failure.
#[derive(Debug, Clone)]
pub struct FailoverExecutor {
    clock: SharedClock,
    driver: Arc<dyn ActionDriver>,
    approved: bool,
}

impl FailoverExecutor {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            driver: Arc::new(SimulatedDriver),
            approved: false,
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn ActionDriver>) -> Self {
        self.driver = driver;
        self
    }

    /// Operator approval for plans whose policy demands it.
    pub fn with_approval(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn execute(&self, plan: &ContinuityPlan, dry_run: bool) -> Result<ExecutionLog> {
        let ctx = LogContext::new()
            .with_cluster(plan.cluster().id())
            .with_plan(plan.plan_id())
            .with_stage("execute");

        plan.validate_shape()?;
        if !dry_run && plan.requires_approval() && !self.approved {
            return Err(ContinuityError::ApprovalRequired {
                plan: plan.plan_id().to_owned(),
            });
        }

        let mut cursor = self.clock.now();
        let mut entries = Vec::with_capacity(plan.actions().len());
        for action in plan.actions() {
            let started_at = cursor;
            let result = preflight(plan, action).and_then(|()| {
                if dry_run {
                    Ok(ActionOutcome::Simulated)
                } else {
                    self.driver.apply(plan, action)
                }
            })
            .and_then(|outcome| match outcome {
                ActionOutcome::Failed { reason } => Err(ContinuityError::ActionExecution {
                    plan: plan.plan_id().to_owned(),
                    sequence: action.sequence(),
                    reason,
                }),
                outcome => Ok(outcome),
            });
            match result {
                Ok(outcome) => {
                    let completed_at = started_at + to_chrono(action.estimated());
                    bco_debug!(
                        context = ctx.clone().with_node(action.target()),
                        "action {} {} {:?}",
                        action.sequence(),
                        action.kind(),
                        outcome
                    );
                    entries.push(ExecutionEntry {
                        action: action.clone(),
                        started_at,
                        completed_at,
                        outcome,
                    });
                    cursor = completed_at;
                }
                Err(err) => {
                    bco_error!(
                        context = ctx.clone().with_node(action.target()),
                        "action {} {} failed: {}",
                        action.sequence(),
                        action.kind(),
                        err
                    );
                    entries.push(ExecutionEntry {
                        action: action.clone(),
                        started_at,
                        completed_at: started_at,
                        outcome: ActionOutcome::Failed {
                            reason: err.to_string(),
                        },
                    });
                    break;
                }
            }
        }

        let log = ExecutionLog {
            plan_id: plan.plan_id().to_owned(),
            dry_run,
            entries,
        };
        bco_info!(
            context = ctx,
            "execution finished: {} of {} actions, succeeded={}, applied={}, dry_run={}",
            log.entries.len(),
            plan.actions().len(),
            log.succeeded(),
            log.applied(),
            dry_run
        );
        Ok(log)
    }
}

fn preflight(plan: &ContinuityPlan, action: &FailoverAction) -> Result<()> {
    let known = if action.targets_all() {
        action.kind() == ActionKind::Notify
    } else {
        plan.cluster().contains(action.target())
    };
    if known {
        Ok(())
    } else {
        Err(ContinuityError::ActionExecution {
            plan: plan.plan_id().to_owned(),
            sequence: action.sequence(),
            reason: format!(
                "target '{}' is not a member of cluster '{}'",
                action.target(),
                plan.cluster().id()
            ),
        })
    }
}
