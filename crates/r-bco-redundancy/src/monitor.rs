//! ---
//! bco_section: "03-health-monitoring"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Heartbeat tracking, staleness detection and quorum computation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use r_bco_common::config::MonitorConfig;
use r_bco_common::time::{elapsed_between, SharedClock};
use r_bco_topology::{Cluster, Node, NodeStatus, QuorumStatus};
use tracing::{debug, warn};

use crate::heartbeat::{Freshness, Heartbeat, HeartbeatOutcome, NodeHealthState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Heartbeats older than this no longer count as evidence of health.
    pub staleness_threshold: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            staleness_threshold: config.staleness_threshold,
        }
    }
}

#[derive(Debug)]
struct MonitorInner {
    /// Start of the grace window for nodes that have never reported.
    registered_at: DateTime<Utc>,
    nodes: HashMap<String, NodeHealthState>,
}

/// Tracks the latest heartbeat per node and derives effective health.
///
/// The health table is the only mutable state in the engine. Writers take the
/// lock for a single insert, so concurrent reporters never observe a partial
/// update and the most recent writer wins.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    cluster_id: String,
    clock: SharedClock,
    settings: MonitorSettings,
    inner: Mutex<MonitorInner>,
}

impl HeartbeatMonitor {
    pub fn new(cluster: &Cluster, clock: SharedClock, settings: MonitorSettings) -> Self {
        let nodes = cluster
            .nodes()
            .iter()
            .map(|node| (node.id().to_owned(), NodeHealthState::default()))
            .collect();
        let registered_at = clock.now();
        debug!(
            cluster = cluster.id(),
            nodes = cluster.len(),
            staleness_ms = settings.staleness_threshold.as_millis() as u64,
            "heartbeat monitor registered topology"
        );
        Self {
            cluster_id: cluster.id().to_owned(),
            clock,
            settings,
            inner: Mutex::new(MonitorInner {
                registered_at,
                nodes,
            }),
        }
    }

    /// Moves the start of the grace window for silent nodes, for callers
    /// whose observations began before the monitor was built.
    pub fn with_registered_at(self, registered_at: DateTime<Utc>) -> Self {
        self.inner.lock().registered_at = registered_at;
        self
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Stores `heartbeat` as the latest sample for its node. Unknown node ids
    /// are reported back rather than treated as errors.
    pub fn record_heartbeat(&self, heartbeat: Heartbeat) -> HeartbeatOutcome {
        let mut inner = self.inner.lock();
        let Some(state) = inner.nodes.get_mut(&heartbeat.node_id) else {
            warn!(
                cluster = %self.cluster_id,
                node = %heartbeat.node_id,
                "received heartbeat for unknown node"
            );
            return HeartbeatOutcome::UnknownNode;
        };
        let node_id = heartbeat.node_id.clone();
        let status = heartbeat.status;
        if let Some(gap) = state.record(heartbeat) {
            if gap > self.settings.staleness_threshold {
                debug!(
                    cluster = %self.cluster_id,
                    node = %node_id,
                    gap_ms = gap.as_millis() as u64,
                    "heartbeat resumed after stale gap"
                );
            }
        }
        debug!(cluster = %self.cluster_id, node = %node_id, %status, "heartbeat recorded");
        HeartbeatOutcome::Recorded
    }

    /// Records a zero-latency heartbeat at the current instant for every node
    /// in `cluster`, carrying the status the topology reports.
    pub fn observe_cluster(&self, cluster: &Cluster) {
        let now = self.clock.now();
        for node in cluster.nodes() {
            self.record_heartbeat(Heartbeat::new(
                node.id(),
                now,
                node.status(),
                Duration::ZERO,
            ));
        }
    }

    pub fn last_heartbeat(&self, node_id: &str) -> Option<Heartbeat> {
        self.inner
            .lock()
            .nodes
            .get(node_id)
            .and_then(|state| state.last().cloned())
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.inner.lock().registered_at
    }

    /// True once a node without any heartbeat has been silent for longer
    /// than `threshold` since the topology was registered.
    fn silent_since_registration(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        elapsed_between(self.registered_at(), now) > threshold
    }

    pub fn heartbeats_received(&self, node_id: &str) -> u64 {
        self.inner
            .lock()
            .nodes
            .get(node_id)
            .map_or(0, NodeHealthState::received)
    }

    pub fn freshness(&self, node_id: &str) -> Freshness {
        let now = self.clock.now();
        self.inner
            .lock()
            .nodes
            .get(node_id)
            .map_or(Freshness::Missing, |state| {
                state.freshness(now, self.settings.staleness_threshold)
            })
    }

    /// A node is healthy when its latest heartbeat is within `threshold` and
    /// reports healthy. Without any heartbeat the topology status stands until
    /// `threshold` has passed since registration.
    pub fn is_node_healthy(&self, node: &Node, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.last_heartbeat(node.id()) {
            None if self.silent_since_registration(now, threshold) => false,
            None => node.is_healthy(),
            Some(heartbeat) if heartbeat.is_stale(now, threshold) => false,
            Some(heartbeat) => heartbeat.status.is_healthy(),
        }
    }

    /// Status as seen by the monitor at `now`. Stale heartbeats, and nodes
    /// that never reported within the staleness window, yield `unknown`.
    pub fn effective_status(&self, node: &Node, now: DateTime<Utc>) -> NodeStatus {
        let threshold = self.settings.staleness_threshold;
        match self.last_heartbeat(node.id()) {
            None if self.silent_since_registration(now, threshold) => NodeStatus::Unknown,
            None => node.status(),
            Some(heartbeat) if heartbeat.is_stale(now, threshold) => NodeStatus::Unknown,
            Some(heartbeat) => heartbeat.status,
        }
    }

    /// New cluster value carrying each node's effective status.
    pub fn snapshot(&self, cluster: &Cluster) -> Cluster {
        let now = self.clock.now();
        let statuses: HashMap<String, NodeStatus> = cluster
            .nodes()
            .iter()
            .map(|node| (node.id().to_owned(), self.effective_status(node, now)))
            .collect();
        cluster.with_statuses(&statuses)
    }

    pub fn compute_quorum(&self, cluster: &Cluster) -> QuorumStatus {
        let quorum = QuorumStatus::from_cluster(&self.snapshot(cluster));
        debug!(
            cluster = %self.cluster_id,
            total = quorum.total_nodes(),
            healthy = quorum.healthy_nodes(),
            threshold = quorum.threshold(),
            has_quorum = quorum.has_quorum(),
            "computed quorum"
        );
        quorum
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use r_bco_common::time::{Clock, ManualClock};
    use r_bco_topology::NodeRole;

    use super::*;

    fn cluster() -> Cluster {
        Cluster::new(
            "c1",
            vec![
                Node::new("n1", NodeRole::Primary, NodeStatus::Healthy, "r1", "s1", 1, 1.0)
                    .unwrap(),
                Node::new("n2", NodeRole::Secondary, NodeStatus::Unhealthy, "r1", "s1", 2, 1.0)
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn missing_heartbeat_falls_back_to_topology() {
        let cluster = cluster();
        let monitor = HeartbeatMonitor::new(
            &cluster,
            Arc::new(ManualClock::new(start())),
            MonitorSettings::default(),
        );
        let n2 = cluster.node("n2").unwrap();
        assert!(!monitor.is_node_healthy(n2, start(), Duration::from_secs(15)));
        assert_eq!(monitor.effective_status(n2, start()), NodeStatus::Unhealthy);
        assert_eq!(monitor.freshness("n2"), Freshness::Missing);
    }

    #[test]
    fn reported_status_overrides_topology_until_stale() {
        let cluster = cluster();
        let clock = Arc::new(ManualClock::new(start()));
        let monitor = HeartbeatMonitor::new(
            &cluster,
            clock.clone(),
            MonitorSettings {
                staleness_threshold: Duration::from_secs(10),
            },
        );
        monitor.record_heartbeat(Heartbeat::new(
            "n2",
            start(),
            NodeStatus::Healthy,
            Duration::ZERO,
        ));
        assert_eq!(monitor.snapshot(&cluster).healthy_count(), 2);

        clock.advance(Duration::from_secs(11));
        let n2 = cluster.node("n2").unwrap();
        assert_eq!(monitor.effective_status(n2, clock.now()), NodeStatus::Unknown);
        assert_eq!(monitor.heartbeats_received("n2"), 1);
    }

    #[test]
    fn silent_node_turns_unknown_after_grace_window() {
        let cluster = cluster();
        let clock = Arc::new(ManualClock::new(start()));
        let monitor = HeartbeatMonitor::new(
            &cluster,
            clock.clone(),
            MonitorSettings {
                staleness_threshold: Duration::from_secs(10),
            },
        );
        let n1 = cluster.node("n1").unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(monitor.effective_status(n1, clock.now()), NodeStatus::Healthy);

        clock.advance(Duration::from_secs(1));
        assert_eq!(monitor.effective_status(n1, clock.now()), NodeStatus::Unknown);
        assert!(!monitor.is_node_healthy(n1, clock.now(), Duration::from_secs(10)));
        assert!(monitor.is_node_healthy(n1, clock.now(), Duration::from_secs(60)));
        assert_eq!(monitor.registered_at(), start());
    }
}
