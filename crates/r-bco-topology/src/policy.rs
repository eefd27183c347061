//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::cluster::Cluster;
use crate::error::{Result, TopologyError};

fn default_max_plan_time() -> Duration {
    Duration::from_secs(5)
}

fn default_max_execution_time() -> Duration {
    Duration::from_secs(300)
}

fn default_demote() -> Duration {
    Duration::from_secs(5)
}

fn default_promote() -> Duration {
    Duration::from_secs(10)
}

fn default_dns_flip() -> Duration {
    Duration::from_secs(30)
}

fn default_restart() -> Duration {
    Duration::from_secs(15)
}

fn default_notify() -> Duration {
    Duration::from_secs(1)
}

fn default_verify() -> Duration {
    Duration::from_secs(5)
}

/// How a failover may be carried out once a plan exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    Automatic,
    /// Execution requires explicit operator approval.
    Manual,
    /// Planning requires a healthy-node majority.
    QuorumBased,
}

impl FailoverStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverStrategy::Automatic => "automatic",
            FailoverStrategy::Manual => "manual",
            FailoverStrategy::QuorumBased => "quorum_based",
        }
    }
}

impl fmt::Display for FailoverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConstraints {
    #[serde(rename = "max_plan_time_ms", default = "default_max_plan_time")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_plan_time: Duration,
    #[serde(
        rename = "max_execution_time_ms",
        default = "default_max_execution_time"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_execution_time: Duration,
}

impl Default for TimingConstraints {
    fn default() -> Self {
        Self {
            max_plan_time: default_max_plan_time(),
            max_execution_time: default_max_execution_time(),
        }
    }
}

/// Estimated wall time of each action kind.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDurations {
    #[serde(default = "default_demote")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub demote: Duration,
    #[serde(default = "default_promote")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub promote: Duration,
    #[serde(default = "default_dns_flip")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dns_flip: Duration,
    #[serde(default = "default_restart")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub restart: Duration,
    #[serde(default = "default_notify")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub notify: Duration,
    #[serde(default = "default_verify")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub verify: Duration,
}

impl Default for ActionDurations {
    fn default() -> Self {
        Self {
            demote: default_demote(),
            promote: default_promote(),
            dns_flip: default_dns_flip(),
            restart: default_restart(),
            notify: default_notify(),
            verify: default_verify(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySpec {
    id: String,
    strategy: FailoverStrategy,
    #[serde(default)]
    region_priority: Vec<String>,
    #[serde(default)]
    site_priority: Vec<String>,
    min_healthy_nodes: usize,
    #[serde(default)]
    timing: TimingConstraints,
    #[serde(default, rename = "action_durations_ms")]
    action_durations: ActionDurations,
}

/// Rules governing target selection and plan timing.
///
/// Only self-consistency is checked at construction. Whether the policy fits
/// a particular cluster is decided by [`FailoverPolicy::validate_for`] when a
/// plan is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicySpec", into = "PolicySpec")]
pub struct FailoverPolicy {
    id: String,
    strategy: FailoverStrategy,
    region_priority: Vec<String>,
    site_priority: Vec<String>,
    min_healthy_nodes: usize,
    timing: TimingConstraints,
    action_durations: ActionDurations,
}

impl FailoverPolicy {
    pub fn new(id: impl Into<String>, strategy: FailoverStrategy) -> Result<Self> {
        let policy = Self {
            id: id.into(),
            strategy,
            region_priority: Vec::new(),
            site_priority: Vec::new(),
            min_healthy_nodes: 0,
            timing: TimingConstraints::default(),
            action_durations: ActionDurations::default(),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_region_priority<I, S>(mut self, regions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region_priority = regions.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    pub fn with_site_priority<I, S>(mut self, sites: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.site_priority = sites.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    pub fn with_min_healthy_nodes(mut self, count: usize) -> Self {
        self.min_healthy_nodes = count;
        self
    }

    pub fn with_timing(mut self, timing: TimingConstraints) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_action_durations(mut self, durations: ActionDurations) -> Self {
        self.action_durations = durations;
        self
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| TopologyError::InvalidPolicy {
            policy: self.id.clone(),
            reason,
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_owned()));
        }
        if let Some(dup) = first_duplicate(&self.region_priority) {
            return Err(invalid(format!("region '{dup}' listed twice")));
        }
        if let Some(dup) = first_duplicate(&self.site_priority) {
            return Err(invalid(format!("site '{dup}' listed twice")));
        }
        if self.timing.max_plan_time.is_zero() || self.timing.max_execution_time.is_zero() {
            return Err(invalid("timing constraints must be non-zero".to_owned()));
        }
        Ok(())
    }

    /// Checks that the policy can be applied to `cluster`.
    pub fn validate_for(&self, cluster: &Cluster) -> Result<()> {
        let mismatch = |reason: String| TopologyError::PolicyMismatch {
            policy: self.id.clone(),
            cluster: cluster.id().to_owned(),
            reason,
        };
        if self.min_healthy_nodes > cluster.len() {
            return Err(mismatch(format!(
                "min_healthy_nodes {} exceeds node count {}",
                self.min_healthy_nodes,
                cluster.len()
            )));
        }
        if let Some(region) = self
            .region_priority
            .iter()
            .find(|region| !cluster.has_region(region))
        {
            return Err(mismatch(format!("unknown region '{region}'")));
        }
        if let Some(site) = self
            .site_priority
            .iter()
            .find(|site| !cluster.has_site(site))
        {
            return Err(mismatch(format!("unknown site '{site}'")));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strategy(&self) -> FailoverStrategy {
        self.strategy
    }

    pub fn region_priority(&self) -> &[String] {
        &self.region_priority
    }

    pub fn site_priority(&self) -> &[String] {
        &self.site_priority
    }

    pub fn has_location_priority(&self) -> bool {
        !self.region_priority.is_empty() || !self.site_priority.is_empty()
    }

    pub fn min_healthy_nodes(&self) -> usize {
        self.min_healthy_nodes
    }

    pub fn timing(&self) -> &TimingConstraints {
        &self.timing
    }

    pub fn action_durations(&self) -> &ActionDurations {
        &self.action_durations
    }

    /// Position of `region` in the priority list, `None` when unlisted.
    pub fn region_rank(&self, region: &str) -> Option<usize> {
        self.region_priority.iter().position(|r| r == region)
    }

    pub fn site_rank(&self, site: &str) -> Option<usize> {
        self.site_priority.iter().position(|s| s == site)
    }
}

fn first_duplicate(values: &[String]) -> Option<&str> {
    values
        .iter()
        .enumerate()
        .find(|(index, value)| values[..*index].contains(value))
        .map(|(_, value)| value.as_str())
}

impl TryFrom<PolicySpec> for FailoverPolicy {
    type Error = TopologyError;

    fn try_from(spec: PolicySpec) -> Result<Self> {
        let policy = Self {
            id: spec.id,
            strategy: spec.strategy,
            region_priority: spec.region_priority,
            site_priority: spec.site_priority,
            min_healthy_nodes: spec.min_healthy_nodes,
            timing: spec.timing,
            action_durations: spec.action_durations,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl From<FailoverPolicy> for PolicySpec {
    fn from(policy: FailoverPolicy) -> Self {
        Self {
            id: policy.id,
            strategy: policy.strategy,
            region_priority: policy.region_priority,
            site_priority: policy.site_priority,
            min_healthy_nodes: policy.min_healthy_nodes,
            timing: policy.timing,
            action_durations: policy.action_durations,
        }
    }
}
