//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::node::{Node, NodeRole, NodeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterSpec {
    id: String,
    nodes: Vec<Node>,
}

/// Named, ordered set of nodes with region and site indices.
///
/// At most one node holds the primary role. Zero primaries is representable
/// so a partially executed failover can be described; planning rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClusterSpec", into = "ClusterSpec")]
pub struct Cluster {
    id: String,
    nodes: Vec<Node>,
    by_region: IndexMap<String, Vec<usize>>,
    by_site: IndexMap<String, Vec<usize>>,
}

impl Cluster {
    pub fn new(id: impl Into<String>, nodes: Vec<Node>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TopologyError::MissingClusterId);
        }
        if nodes.is_empty() {
            return Err(TopologyError::EmptyCluster { cluster: id });
        }

        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !seen.insert(node.id()) {
                return Err(TopologyError::DuplicateNode {
                    node: node.id().to_owned(),
                });
            }
        }

        let primaries: Vec<String> = nodes
            .iter()
            .filter(|node| node.is_primary())
            .map(|node| node.id().to_owned())
            .collect();
        if primaries.len() > 1 {
            return Err(TopologyError::MultiplePrimaries {
                cluster: id,
                primaries,
            });
        }

        let mut by_region: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut by_site: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (index, node) in nodes.iter().enumerate() {
            by_region
                .entry(node.region().to_owned())
                .or_default()
                .push(index);
            by_site.entry(node.site().to_owned()).or_default().push(index);
        }

        Ok(Self {
            id,
            nodes,
            by_region,
            by_site,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node(node_id).is_some()
    }

    pub fn primary(&self) -> Option<&Node> {
        self.nodes.iter().find(|node| node.is_primary())
    }

    pub fn primary_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_primary()).count()
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |node| node.role() == role)
    }

    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_healthy()).count()
    }

    /// Region ids in first-seen order.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }

    /// Site ids in first-seen order.
    pub fn sites(&self) -> impl Iterator<Item = &str> {
        self.by_site.keys().map(String::as_str)
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.by_region.contains_key(region)
    }

    pub fn has_site(&self, site: &str) -> bool {
        self.by_site.contains_key(site)
    }

    pub fn nodes_in_region<'a>(&'a self, region: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.by_region
            .get(region)
            .into_iter()
            .flatten()
            .map(move |&index| &self.nodes[index])
    }

    pub fn nodes_in_site<'a>(&'a self, site: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.by_site
            .get(site)
            .into_iter()
            .flatten()
            .map(move |&index| &self.nodes[index])
    }

    /// New cluster value with the given statuses applied. Nodes not present in
    /// `statuses` keep their current status. This is the only way node status
    /// changes, and it is driven by the heartbeat monitor.
    pub fn with_statuses(&self, statuses: &HashMap<String, NodeStatus>) -> Cluster {
        let nodes = self
            .nodes
            .iter()
            .map(|node| match statuses.get(node.id()) {
                Some(status) => node.with_status(*status),
                None => node.clone(),
            })
            .collect();
        Self {
            id: self.id.clone(),
            nodes,
            by_region: self.by_region.clone(),
            by_site: self.by_site.clone(),
        }
    }

    /// New cluster value with role changes applied in order. Fails when a
    /// node is unknown or the result would hold more than one primary.
    pub fn with_roles(&self, changes: &[(&str, NodeRole)]) -> Result<Cluster> {
        let mut nodes = self.nodes.clone();
        for (node_id, role) in changes {
            let Some(node) = nodes.iter_mut().find(|node| node.id() == *node_id) else {
                return Err(TopologyError::UnknownNode {
                    cluster: self.id.clone(),
                    node: (*node_id).to_owned(),
                });
            };
            *node = node.with_role(*role);
        }
        Cluster::new(self.id.clone(), nodes)
    }
}

impl TryFrom<ClusterSpec> for Cluster {
    type Error = TopologyError;

    fn try_from(spec: ClusterSpec) -> Result<Self> {
        Cluster::new(spec.id, spec.nodes)
    }
}

impl From<Cluster> for ClusterSpec {
    fn from(cluster: Cluster) -> Self {
        Self {
            id: cluster.id,
            nodes: cluster.nodes,
        }
    }
}
