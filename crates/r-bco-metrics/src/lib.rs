//! ---
//! bco_section: "03-observability"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Metrics collection and export utilities."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::{debug, error};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every metric family in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .context("failed to encode metrics")
}

/// Outcome label attached to execution metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
        }
    }
}

/// Small surface the engine reports through. Any metrics backend may implement it.
pub trait FailoverRecorder: Send + Sync + fmt::Debug {
    fn record_execution(&self, cluster_id: &str, status: ExecutionStatus, duration_ms: f64);
    fn record_validation(&self, cluster_id: &str, duration_ms: f64);
    fn update_status(&self, healthy_nodes: usize, has_quorum: bool);
}

/// Shared recorder handle injected into the engine.
pub type SharedRecorder = Arc<dyn FailoverRecorder>;

/// Recorder that drops everything. Default for tests and the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl FailoverRecorder for NoopRecorder {
    fn record_execution(&self, _cluster_id: &str, _status: ExecutionStatus, _duration_ms: f64) {}

    fn record_validation(&self, _cluster_id: &str, _duration_ms: f64) {}

    fn update_status(&self, _healthy_nodes: usize, _has_quorum: bool) {}
}

/// Prometheus-backed recorder registering the failover metric family.
#[derive(Clone)]
pub struct ContinuityMetrics {
    registry: SharedRegistry,
    executions_total: IntCounterVec,
    success_total: IntCounterVec,
    failures_total: IntCounterVec,
    nodes_healthy: IntGauge,
    quorum_reached: IntGauge,
    execution_ms: Histogram,
    validation_ms: Histogram,
}

impl ContinuityMetrics {
    /// Register the continuity metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let executions_total = IntCounterVec::new(
            Opts::new(
                "failover_executions_total",
                "Failover plan executions attempted",
            ),
            &["cluster_id", "status"],
        )?;
        registry.register(Box::new(executions_total.clone()))?;

        let success_total = IntCounterVec::new(
            Opts::new(
                "failover_success_total",
                "Failover plan executions that completed every action",
            ),
            &["cluster_id"],
        )?;
        registry.register(Box::new(success_total.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new(
                "failover_failures_total",
                "Failover plan executions halted by a failed action",
            ),
            &["cluster_id"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let nodes_healthy = IntGauge::with_opts(Opts::new(
            "continuity_nodes_healthy",
            "Healthy node count from the latest quorum computation",
        ))?;
        registry.register(Box::new(nodes_healthy.clone()))?;

        let quorum_reached = IntGauge::with_opts(Opts::new(
            "continuity_quorum_reached",
            "Indicator (0/1) whether the latest quorum computation reached the threshold",
        ))?;
        registry.register(Box::new(quorum_reached.clone()))?;

        let buckets = prometheus::exponential_buckets(1.0, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let execution_ms = Histogram::with_opts(
            HistogramOpts::new(
                "failover_execution_ms",
                "Time spent executing a failover plan in milliseconds",
            )
            .buckets(buckets.clone()),
        )?;
        registry.register(Box::new(execution_ms.clone()))?;

        let validation_ms = Histogram::with_opts(
            HistogramOpts::new(
                "failover_validation_ms",
                "Time spent verifying a failover in milliseconds",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(validation_ms.clone()))?;

        Ok(Self {
            registry,
            executions_total,
            success_total,
            failures_total,
            nodes_healthy,
            quorum_reached,
            execution_ms,
            validation_ms,
        })
    }

    /// Expose the underlying shared registry for convenience.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }
}

impl FailoverRecorder for ContinuityMetrics {
    fn record_execution(&self, cluster_id: &str, status: ExecutionStatus, duration_ms: f64) {
        self.executions_total
            .with_label_values(&[cluster_id, status.as_str()])
            .inc();
        match status {
            ExecutionStatus::Success => self.success_total.with_label_values(&[cluster_id]).inc(),
            ExecutionStatus::Failure => {
                self.failures_total.with_label_values(&[cluster_id]).inc()
            }
        }
        self.execution_ms.observe(duration_ms);
        debug!(cluster_id, status = status.as_str(), duration_ms, "recorded execution");
    }

    fn record_validation(&self, cluster_id: &str, duration_ms: f64) {
        self.validation_ms.observe(duration_ms);
        debug!(cluster_id, duration_ms, "recorded validation");
    }

    fn update_status(&self, healthy_nodes: usize, has_quorum: bool) {
        self.nodes_healthy
            .set(i64::try_from(healthy_nodes).unwrap_or(i64::MAX));
        self.quorum_reached.set(if has_quorum { 1 } else { 0 });
    }
}

impl fmt::Debug for ContinuityMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuityMetrics").finish_non_exhaustive()
    }
}

/// Call record captured by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Execution {
        cluster_id: String,
        status: ExecutionStatus,
    },
    Validation {
        cluster_id: String,
    },
    Status {
        healthy_nodes: usize,
        has_quorum: bool,
    },
}

/// In-memory recorder for asserting what the engine reported.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    calls: Mutex<Vec<RecordedCall>>,
}

impl MemoryRecorder {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl FailoverRecorder for MemoryRecorder {
    fn record_execution(&self, cluster_id: &str, status: ExecutionStatus, _duration_ms: f64) {
        self.calls.lock().push(RecordedCall::Execution {
            cluster_id: cluster_id.to_owned(),
            status,
        });
    }

    fn record_validation(&self, cluster_id: &str, _duration_ms: f64) {
        self.calls.lock().push(RecordedCall::Validation {
            cluster_id: cluster_id.to_owned(),
        });
    }

    fn update_status(&self, healthy_nodes: usize, has_quorum: bool) {
        self.calls.lock().push(RecordedCall::Status {
            healthy_nodes,
            has_quorum,
        });
    }
}

/// Build the recorder used by binaries: Prometheus when enabled, no-op otherwise.
pub fn recorder_for(enabled: bool, registry: &SharedRegistry) -> SharedRecorder {
    if !enabled {
        return Arc::new(NoopRecorder);
    }
    match ContinuityMetrics::new(registry.clone()) {
        Ok(metrics) => Arc::new(metrics),
        Err(err) => {
            error!(error = %err, "failed to register continuity metrics; falling back to no-op recorder");
            Arc::new(NoopRecorder)
        }
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge_value(registry: &Registry, name: &str) -> f64 {
        registry
            .gather()
            .iter()
            .find(|fam| fam.get_name() == name)
            .map(|fam| fam.get_metric()[0].get_gauge().get_value())
            .expect("gauge registered")
    }

    #[test]
    fn prometheus_recorder_tracks_outcomes() {
        let registry = new_registry();
        let metrics = ContinuityMetrics::new(registry.clone()).unwrap();
        metrics.record_execution("cluster-a", ExecutionStatus::Success, 12.0);
        metrics.record_execution("cluster-a", ExecutionStatus::Failure, 3.0);
        metrics.record_validation("cluster-a", 1.5);
        metrics.update_status(3, true);

        let families = registry.gather();
        let success = families
            .iter()
            .find(|fam| fam.get_name() == "failover_success_total")
            .expect("success counter registered");
        assert_eq!(success.get_metric()[0].get_counter().get_value(), 1.0);
        let failures = families
            .iter()
            .find(|fam| fam.get_name() == "failover_failures_total")
            .expect("failure counter registered");
        assert_eq!(failures.get_metric()[0].get_counter().get_value(), 1.0);
        let validation = families
            .iter()
            .find(|fam| fam.get_name() == "failover_validation_ms")
            .expect("validation histogram registered");
        assert_eq!(validation.get_metric()[0].get_histogram().get_sample_count(), 1);

        assert_eq!(gauge_value(&registry, "continuity_nodes_healthy"), 3.0);
        assert_eq!(gauge_value(&registry, "continuity_quorum_reached"), 1.0);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("failover_executions_total"));
    }

    #[test]
    fn registering_twice_fails() {
        let registry = new_registry();
        ContinuityMetrics::new(registry.clone()).unwrap();
        assert!(ContinuityMetrics::new(registry).is_err());
    }

    #[test]
    fn disabled_recorder_is_noop() {
        let registry = new_registry();
        let recorder = recorder_for(false, &registry);
        recorder.update_status(2, false);
        assert!(registry.gather().is_empty());
    }
}
