//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cluster '{cluster}' must contain at least one node")]
    EmptyCluster { cluster: String },
    #[error("cluster identifier must not be empty")]
    MissingClusterId,
    #[error("node '{node}' is declared more than once")]
    DuplicateNode { node: String },
    #[error("cluster '{cluster}' declares more than one primary: {}", .primaries.join(", "))]
    MultiplePrimaries {
        cluster: String,
        primaries: Vec<String>,
    },
    #[error("node '{node}' is invalid: {reason}")]
    InvalidNode { node: String, reason: String },
    #[error("node '{node}' not found in cluster '{cluster}'")]
    UnknownNode { cluster: String, node: String },
    #[error("policy '{policy}' is invalid: {reason}")]
    InvalidPolicy { policy: String, reason: String },
    #[error("policy '{policy}' does not fit cluster '{cluster}': {reason}")]
    PolicyMismatch {
        policy: String,
        cluster: String,
        reason: String,
    },
    #[error("unable to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
