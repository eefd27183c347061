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

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

/// Action target meaning "every node in the cluster". Reserved as a node id.
pub const ALL_NODES_TARGET: &str = "all";

/// Role a node plays in the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Secondary,
    /// Counts toward quorum, never promoted.
    Witness,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Secondary => "secondary",
            NodeRole::Witness => "witness",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed health of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Healthy => "healthy",
            NodeStatus::Unhealthy => "unhealthy",
            NodeStatus::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeStatus::Healthy)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw node fields as they appear in topology documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSpec {
    id: String,
    role: NodeRole,
    status: NodeStatus,
    region: String,
    site: String,
    priority: u32,
    capacity: f64,
}

/// A single deployment node. Immutable; status changes yield a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeSpec", into = "NodeSpec")]
pub struct Node {
    id: String,
    role: NodeRole,
    status: NodeStatus,
    region: String,
    site: String,
    priority: u32,
    capacity: f64,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        role: NodeRole,
        status: NodeStatus,
        region: impl Into<String>,
        site: impl Into<String>,
        priority: u32,
        capacity: f64,
    ) -> Result<Self> {
        let node = Self {
            id: id.into(),
            role,
            status,
            region: region.into(),
            site: site.into(),
            priority,
            capacity,
        };
        node.validate()?;
        Ok(node)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| TopologyError::InvalidNode {
            node: self.id.clone(),
            reason: reason.to_owned(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.id == ALL_NODES_TARGET {
            return Err(invalid("id 'all' is reserved for broadcast actions"));
        }
        if self.region.trim().is_empty() {
            return Err(invalid("region must not be empty"));
        }
        if self.site.trim().is_empty() {
            return Err(invalid("site must not be empty"));
        }
        if !self.capacity.is_finite() || self.capacity < 0.0 {
            return Err(invalid("capacity must be finite and non-negative"));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }

    pub(crate) fn with_status(&self, status: NodeStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub(crate) fn with_role(&self, role: NodeRole) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}

impl TryFrom<NodeSpec> for Node {
    type Error = TopologyError;

    fn try_from(spec: NodeSpec) -> Result<Self> {
        Node::new(
            spec.id,
            spec.role,
            spec.status,
            spec.region,
            spec.site,
            spec.priority,
            spec.capacity,
        )
    }
}

impl From<Node> for NodeSpec {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            role: node.role,
            status: node.status,
            region: node.region,
            site: node.site,
            priority: node.priority,
            capacity: node.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_capacity() {
        let err = Node::new(
            "n1",
            NodeRole::Secondary,
            NodeStatus::Healthy,
            "r1",
            "s1",
            1,
            f64::NAN,
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidNode { .. }));
        assert!(Node::new("n1", NodeRole::Secondary, NodeStatus::Healthy, "r1", "s1", 1, -1.0)
            .is_err());
    }

    #[test]
    fn rejects_reserved_id() {
        assert!(Node::new("all", NodeRole::Witness, NodeStatus::Healthy, "r1", "s1", 0, 0.0)
            .is_err());
    }

    #[test]
    fn deserialisation_validates() {
        let ok: Node = serde_json::from_str(
            r#"{"id":"n1","role":"primary","status":"healthy","region":"r1","site":"s1","priority":1,"capacity":10.0}"#,
        )
        .unwrap();
        assert!(ok.is_primary());
        let missing_site = serde_json::from_str::<Node>(
            r#"{"id":"n1","role":"primary","status":"healthy","region":"r1","priority":1,"capacity":10.0}"#,
        );
        assert!(missing_site.is_err());
        let negative_priority = serde_json::from_str::<Node>(
            r#"{"id":"n1","role":"primary","status":"healthy","region":"r1","site":"s1","priority":-1,"capacity":10.0}"#,
        );
        assert!(negative_priority.is_err());
    }
}
