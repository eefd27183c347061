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

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use r_bco_common::time::SharedClock;
use r_bco_logging::{bco_info, LogContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ContinuityError, Result};
use crate::executor::ExecutionLog;
use crate::planner::{ContinuityPlan, FailoverAction};
use crate::verifier::VerificationReport;

type HmacSha256 = Hmac<Sha256>;

/// Confidence contributed by each passing verification check.
pub const CONFIDENCE_PER_CHECK: u8 = 25;

pub const MANIFEST_ALGORITHM: &str = "sha256";

/// Digest over the ordered action list of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionManifest {
    pub algorithm: String,
    pub digest: String,
    pub action_count: usize,
}

impl ActionManifest {
    pub fn compute(actions: &[FailoverAction]) -> Result<Self> {
        Ok(Self {
            algorithm: MANIFEST_ALGORITHM.to_owned(),
            digest: hex::encode(Sha256::digest(serde_json::to_vec(actions)?)),
            action_count: actions.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Policy,
    Cluster,
    Plan,
}

impl fmt::Display for CitationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CitationKind::Policy => "policy",
            CitationKind::Cluster => "cluster",
            CitationKind::Plan => "plan",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub id: String,
}

/// Self-contained record of one failover decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPack {
    pub plan: ContinuityPlan,
    pub execution_log: ExecutionLog,
    pub verification: VerificationReport,
    pub citations: Vec<Citation>,
    pub confidence: u8,
    pub manifest: ActionManifest,
    pub generated_at: DateTime<Utc>,
    /// Hex HMAC-SHA256 over the length-prefixed plan id and manifest digest
    /// followed by the confidence byte.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuditPack {
    pub fn plan_id(&self) -> &str {
        self.plan.plan_id()
    }

    /// True when the manifest still matches the plan's actions.
    pub fn verify_manifest(&self) -> bool {
        match ActionManifest::compute(self.plan.actions()) {
            Ok(expected) => expected == self.manifest,
            Err(_) => false,
        }
    }

    /// True when the pack carries a signature produced with `key` over its
    /// current contents.
    pub fn verify_signature(&self, key: &[u8]) -> bool {
        let Some(signature) = self.signature.as_deref() else {
            return false;
        };
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match signer(key, self.plan_id(), &self.manifest.digest, self.confidence) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

/// Confidence score for a report: [`CONFIDENCE_PER_CHECK`] per passing check.
pub fn confidence_for(verification: &VerificationReport) -> u8 {
    let passed = u8::try_from(verification.passed_checks()).unwrap_or(u8::MAX);
    passed.saturating_mul(CONFIDENCE_PER_CHECK).min(100)
}

fn signer(key: &[u8], plan_id: &str, digest: &str, confidence: u8) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| ContinuityError::Signing(err.to_string()))?;
    // each variable-length field is prefixed with its big-endian u64 length
    for field in [plan_id.as_bytes(), digest.as_bytes()] {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field);
    }
    mac.update(&[confidence]);
    Ok(mac)
}

/// Bundles a plan, its execution and verification into an [`AuditPack`].
#[derive(Clone)]
pub struct ContinuityAuditor {
    clock: SharedClock,
    signing_key: Option<Vec<u8>>,
}

impl fmt::Debug for ContinuityAuditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuityAuditor")
            .field("clock", &self.clock)
            .field("signing", &self.signing_key.is_some())
            .finish()
    }
}

impl ContinuityAuditor {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            signing_key: None,
        }
    }

    pub fn with_signing_key(mut self, key: Option<Vec<u8>>) -> Self {
        self.signing_key = key.filter(|key| !key.is_empty());
        self
    }

    pub fn audit(
        &self,
        plan: &ContinuityPlan,
        execution_log: &ExecutionLog,
        verification: &VerificationReport,
    ) -> Result<AuditPack> {
        let manifest = ActionManifest::compute(plan.actions())?;
        let confidence = confidence_for(verification);
        let signature = match &self.signing_key {
            Some(key) => {
                let mac = signer(key, plan.plan_id(), &manifest.digest, confidence)?;
                Some(hex::encode(mac.finalize().into_bytes()))
            }
            None => None,
        };

        let pack = AuditPack {
            plan: plan.clone(),
            execution_log: execution_log.clone(),
            verification: verification.clone(),
            citations: vec![
                Citation {
                    kind: CitationKind::Policy,
                    id: plan.policy().id().to_owned(),
                },
                Citation {
                    kind: CitationKind::Cluster,
                    id: plan.cluster().id().to_owned(),
                },
                Citation {
                    kind: CitationKind::Plan,
                    id: plan.plan_id().to_owned(),
                },
            ],
            confidence,
            manifest,
            generated_at: self.clock.now(),
            signature,
        };
        bco_info!(
            context = LogContext::new()
                .with_cluster(plan.cluster().id())
                .with_plan(plan.plan_id())
                .with_stage("audit"),
            "audit pack generated: confidence {}, manifest {}, signed={}",
            pack.confidence,
            &pack.manifest.digest[..12],
            pack.signature.is_some()
        );
        Ok(pack)
    }
}
