//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Immutable description of a multi-node deployment: nodes, clusters,
//! failover policies and the quorum arithmetic derived from them.
//!
//! Every type validates at construction (including deserialisation) and
//! exposes no setters. Changes such as a node turning unhealthy or a
//! secondary being promoted produce a new [`Cluster`] value.

pub mod cluster;
pub mod document;
pub mod error;
pub mod node;
pub mod policy;
pub mod quorum;

pub use cluster::Cluster;
pub use document::{load_cluster, load_policy, parse_cluster_yaml, parse_policy_yaml};
pub use error::{Result, TopologyError};
pub use node::{Node, NodeRole, NodeStatus, ALL_NODES_TARGET};
pub use policy::{ActionDurations, FailoverPolicy, FailoverStrategy, TimingConstraints};
pub use quorum::QuorumStatus;
