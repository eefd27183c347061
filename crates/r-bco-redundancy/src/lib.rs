//! ---
//! bco_section: "03-health-monitoring"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Heartbeat tracking, staleness detection and quorum computation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Heartbeat monitoring for R-BCO clusters.

mod heartbeat;
mod monitor;

pub use heartbeat::{Freshness, Heartbeat, HeartbeatOutcome};
pub use monitor::{HeartbeatMonitor, MonitorSettings};
