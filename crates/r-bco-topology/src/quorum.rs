//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct QuorumCounts {
    total_nodes: usize,
    healthy_nodes: usize,
}

/// Majority arithmetic over a cluster snapshot.
///
/// `threshold` is always `total_nodes / 2 + 1` and `has_quorum` is always
/// `healthy_nodes >= threshold`. Deserialised values are recomputed from the
/// counts, so a document cannot carry an inconsistent verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "QuorumCounts")]
pub struct QuorumStatus {
    total_nodes: usize,
    healthy_nodes: usize,
    threshold: usize,
    has_quorum: bool,
}

impl QuorumStatus {
    pub fn threshold_for(total_nodes: usize) -> usize {
        total_nodes / 2 + 1
    }

    /// Counts healthy nodes as they stand in `cluster`. This is the only
    /// public constructor; callers that need staleness applied pass a monitor
    /// snapshot.
    pub fn from_cluster(cluster: &Cluster) -> Self {
        Self::from_counts(cluster.len(), cluster.healthy_count())
    }

    pub(crate) fn from_counts(total_nodes: usize, healthy_nodes: usize) -> Self {
        let healthy_nodes = healthy_nodes.min(total_nodes);
        let threshold = Self::threshold_for(total_nodes);
        Self {
            total_nodes,
            healthy_nodes,
            threshold,
            has_quorum: healthy_nodes >= threshold,
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    pub fn healthy_nodes(&self) -> usize {
        self.healthy_nodes
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn has_quorum(&self) -> bool {
        self.has_quorum
    }

    /// Quorum held with no spare healthy node.
    pub fn at_threshold(&self) -> bool {
        self.healthy_nodes == self.threshold
    }
}

impl From<QuorumCounts> for QuorumStatus {
    fn from(counts: QuorumCounts) -> Self {
        QuorumStatus::from_counts(counts.total_nodes, counts.healthy_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeRole, NodeStatus};

    #[test]
    fn threshold_is_strict_majority() {
        for total in 0..64 {
            for healthy in 0..=total {
                let status = QuorumStatus::from_counts(total, healthy);
                assert_eq!(status.threshold(), total / 2 + 1);
                assert_eq!(status.has_quorum(), healthy >= total / 2 + 1);
            }
        }
    }

    #[test]
    fn four_nodes_two_unhealthy_lacks_quorum() {
        let status = QuorumStatus::from_counts(4, 2);
        assert_eq!(status.threshold(), 3);
        assert!(!status.has_quorum());
        assert!(!status.at_threshold());
        assert!(QuorumStatus::from_counts(4, 3).at_threshold());
    }

    #[test]
    fn deserialised_verdict_is_recomputed() {
        let status: QuorumStatus = serde_json::from_str(
            r#"{"total_nodes":5,"healthy_nodes":2,"threshold":1,"has_quorum":true}"#,
        )
        .unwrap();
        assert_eq!(status.threshold(), 3);
        assert!(!status.has_quorum());
    }

    #[test]
    fn cluster_counts_witnesses_and_skips_unknown() {
        let node = |id: &str, role, status| Node::new(id, role, status, "r1", "s1", 1, 1.0).unwrap();
        let cluster = Cluster::new(
            "c1",
            vec![
                node("n1", NodeRole::Primary, NodeStatus::Healthy),
                node("n2", NodeRole::Secondary, NodeStatus::Unknown),
                node("n3", NodeRole::Secondary, NodeStatus::Unhealthy),
                node("w1", NodeRole::Witness, NodeStatus::Healthy),
                node("w2", NodeRole::Witness, NodeStatus::Healthy),
            ],
        )
        .unwrap();
        let status = QuorumStatus::from_cluster(&cluster);
        assert_eq!(status.total_nodes(), 5);
        assert_eq!(status.healthy_nodes(), 3);
        assert!(status.has_quorum());
        assert!(status.at_threshold());
    }
}
