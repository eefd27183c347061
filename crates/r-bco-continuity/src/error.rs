//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::path::PathBuf;

use r_bco_topology::TopologyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContinuityError>;

#[derive(Debug, Error)]
pub enum ContinuityError {
    #[error("cluster '{cluster}' cannot fail over: {reason}")]
    InsufficientTopology { cluster: String, reason: String },
    #[error("no failover target found in cluster '{cluster}': {reason}")]
    NoTargetFound { cluster: String, reason: String },
    #[error("cluster '{cluster}' lacks quorum: {healthy} healthy of {total}, {threshold} required")]
    InsufficientQuorum {
        cluster: String,
        healthy: usize,
        total: usize,
        threshold: usize,
    },
    #[error("policy '{policy}' violated: {reason}")]
    PolicyViolation { policy: String, reason: String },
    #[error("action {sequence} of plan '{plan}' failed: {reason}")]
    ActionExecution {
        plan: String,
        sequence: usize,
        reason: String,
    },
    #[error("policy '{policy}' cannot be applied: {reason}")]
    InvalidPolicy { policy: String, reason: String },
    #[error("plan '{plan}' is malformed: {reason}")]
    MalformedPlan { plan: String, reason: String },
    #[error("plan '{plan}' requires operator approval before execution")]
    ApprovalRequired { plan: String },
    #[error("invalid simulation scenario: {reason}")]
    InvalidScenario { reason: String },
    #[error("audit signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContinuityError {
    /// Stable machine-readable identifier for diagnostics and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ContinuityError::InsufficientTopology { .. } => "insufficient_topology",
            ContinuityError::NoTargetFound { .. } => "no_target_found",
            ContinuityError::InsufficientQuorum { .. } => "insufficient_quorum",
            ContinuityError::PolicyViolation { .. } => "policy_violation",
            ContinuityError::ActionExecution { .. } => "action_execution",
            ContinuityError::InvalidPolicy { .. } => "invalid_policy",
            ContinuityError::MalformedPlan { .. } => "malformed_plan",
            ContinuityError::ApprovalRequired { .. } => "approval_required",
            ContinuityError::InvalidScenario { .. } => "invalid_scenario",
            ContinuityError::Signing(_) => "signing",
            ContinuityError::Topology(_) => "topology",
            ContinuityError::Serialization(_) => "serialization",
            ContinuityError::Io { .. } => "io",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ContinuityError::Io {
            path: path.into(),
            source,
        }
    }
}
