//! ---
//! bco_section: "03-health-monitoring"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Heartbeat tracking, staleness detection and quorum computation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use r_bco_common::time::elapsed_between;
use r_bco_topology::NodeStatus;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Self-reported liveness sample from a node.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: NodeStatus,
    #[serde(rename = "latency_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency: Duration,
}

impl Heartbeat {
    pub fn new(
        node_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: NodeStatus,
        latency: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp,
            status,
            latency,
        }
    }

    /// Time since this heartbeat was taken; zero for future timestamps.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.timestamp, now)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) > threshold
    }
}

/// Result of offering a heartbeat to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Recorded,
    /// The node id is not part of the monitored topology; nothing was stored.
    UnknownNode,
}

/// Freshness of the latest heartbeat from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Freshness {
    Fresh(Duration),
    Stale(Duration),
    Missing,
}

/// Per-node slot in the monitor's health table.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeHealthState {
    last: Option<Heartbeat>,
    received: u64,
}

impl NodeHealthState {
    /// Stores `heartbeat`, returning the gap since the previous one.
    pub(crate) fn record(&mut self, heartbeat: Heartbeat) -> Option<Duration> {
        let gap = self
            .last
            .as_ref()
            .map(|previous| elapsed_between(previous.timestamp, heartbeat.timestamp));
        self.last = Some(heartbeat);
        self.received += 1;
        gap
    }

    pub(crate) fn last(&self) -> Option<&Heartbeat> {
        self.last.as_ref()
    }

    pub(crate) fn received(&self) -> u64 {
        self.received
    }

    pub(crate) fn freshness(&self, now: DateTime<Utc>, threshold: Duration) -> Freshness {
        match &self.last {
            None => Freshness::Missing,
            Some(heartbeat) => {
                let age = heartbeat.age(now);
                if age > threshold {
                    Freshness::Stale(age)
                } else {
                    Freshness::Fresh(age)
                }
            }
        }
    }
}
