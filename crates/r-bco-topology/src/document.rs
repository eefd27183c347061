//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! YAML loaders for cluster topology and policy documents.
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cluster::Cluster;
use crate::error::{Result, TopologyError};
use crate::policy::FailoverPolicy;

pub fn parse_cluster_yaml(raw: &str) -> Result<Cluster> {
    Ok(serde_yaml::from_str(raw)?)
}

pub fn parse_policy_yaml(raw: &str) -> Result<FailoverPolicy> {
    Ok(serde_yaml::from_str(raw)?)
}

pub fn load_cluster(path: impl AsRef<Path>) -> Result<Cluster> {
    let path = path.as_ref();
    let cluster = parse_cluster_yaml(&read(path)?)?;
    debug!(
        path = %path.display(),
        cluster = cluster.id(),
        nodes = cluster.len(),
        "loaded cluster topology"
    );
    Ok(cluster)
}

pub fn load_policy(path: impl AsRef<Path>) -> Result<FailoverPolicy> {
    let path = path.as_ref();
    let policy = parse_policy_yaml(&read(path)?)?;
    debug!(path = %path.display(), policy = policy.id(), "loaded failover policy");
    Ok(policy)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
