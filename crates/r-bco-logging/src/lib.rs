//! ---
//! bco_section: "03-observability"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Structured logging adapters and sinks."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Failover-aware logging context and convenience macros.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline stderr subscriber for tools that have not loaded configuration yet.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Cluster identifier associated with the log event.
    pub cluster: Option<&'a str>,
    /// Node identifier associated with the log event.
    pub node: Option<&'a str>,
    /// Failover plan identifier.
    pub plan: Option<&'a str>,
    /// Pipeline stage (plan, execute, verify, audit, simulate).
    pub stage: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a cluster identifier.
    pub fn with_cluster(mut self, cluster: &'a str) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Attach a node identifier.
    pub fn with_node(mut self, node: &'a str) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach a plan identifier.
    pub fn with_plan(mut self, plan: &'a str) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Attach a pipeline stage.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let fallback = LogContext::default();
    let ctx = context.unwrap_or(&fallback);
    match outcome {
        SystemEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            cluster = ctx.cluster.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            cluster = ctx.cluster.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %message
        ),
    }
}
