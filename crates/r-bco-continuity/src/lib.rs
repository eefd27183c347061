//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Failover orchestration: plan, execute, verify, simulate and audit.
//!
//! The flow is `Cluster + FailoverPolicy -> ContinuityPlanner -> ContinuityPlan
//! -> FailoverExecutor -> ExecutionLog -> FailoverVerifier -> VerificationReport
//! -> ContinuityAuditor -> AuditPack`. [`ContinuityEngine`] wires the stages
//! together around a heartbeat monitor and a metrics recorder.

pub mod auditor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod planner;
pub mod simulator;
pub mod store;
pub mod verifier;

pub use auditor::{confidence_for, ActionManifest, AuditPack, Citation, CitationKind, ContinuityAuditor};
pub use engine::{ClusterStatus, ContinuityEngine, EngineSettings, FailoverOutcome, NodeHealth};
pub use error::{ContinuityError, Result};
pub use executor::{
    ActionDriver, ActionOutcome, ExecutionEntry, ExecutionLog, FailoverExecutor, SimulatedDriver,
};
pub use planner::{rank_candidates, ActionKind, ContinuityPlan, ContinuityPlanner, FailoverAction};
pub use simulator::{FailoverSimulator, Scenario, SimulationResult, SimulationSettings};
pub use store::{AuditRecord, AuditStore};
pub use verifier::{CheckKind, FailoverVerifier, VerificationCheck, VerificationReport};

/// Convenience re-exports for callers driving the whole pipeline.
pub mod prelude {
    pub use crate::{
        AuditPack, AuditStore, ContinuityEngine, ContinuityError, ContinuityPlan, EngineSettings,
        ExecutionLog, FailoverOutcome, Scenario, SimulationResult, VerificationReport,
    };
    pub use r_bco_topology::{Cluster, FailoverPolicy, QuorumStatus};
}
