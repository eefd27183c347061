//! ---
//! bco_section: "05-networking-external-interfaces"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Networking API surface for external integrations."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! HTTP surface over the continuity engine.
//!
//! Every engine endpoint takes the cluster and policy documents in the request
//! body, requires an `x-api-key` mapped to an operator role, and answers with
//! an [`Envelope`].

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_bco_common::config::{ApiRole, EngineConfig};
use r_bco_common::time::{SharedClock, SystemClock};
use r_bco_continuity::{
    confidence_for, AuditStore, ClusterStatus, ContinuityEngine, ContinuityError, ContinuityPlan,
    FailoverOutcome, Scenario, SimulationResult,
};
use r_bco_metrics::{encode_text, recorder_for, SharedRecorder, SharedRegistry};
use r_bco_redundancy::{Heartbeat, HeartbeatOutcome};
use r_bco_topology::{Cluster, FailoverPolicy};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared API state exposed to handlers.
pub struct ApiState {
    config: EngineConfig,
    clock: SharedClock,
    registry: SharedRegistry,
    recorder: SharedRecorder,
    audit: Mutex<AuditStore>,
}

impl ApiState {
    pub fn new(config: EngineConfig, registry: SharedRegistry) -> Result<Self> {
        Self::with_clock(config, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        registry: SharedRegistry,
        clock: SharedClock,
    ) -> Result<Self> {
        let recorder = recorder_for(config.metrics.enabled, &registry);
        let audit = AuditStore::open(&config.audit.log_path, clock.clone()).with_context(|| {
            format!(
                "failed to open audit trail {}",
                config.audit.log_path.display()
            )
        })?;
        Ok(Self {
            config,
            clock,
            registry,
            recorder,
            audit: Mutex::new(audit),
        })
    }

    fn engine(&self, cluster: Cluster) -> ContinuityEngine {
        ContinuityEngine::from_config(
            cluster,
            &self.config,
            self.clock.clone(),
            self.recorder.clone(),
        )
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<ApiRole, ApiError> {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "missing api key")
            })?;
        let role = self.config.api.role_for(key).ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "unknown api key")
        })?;
        if !role.may_operate() {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("role '{}' may not call engine endpoints", role.as_str()),
            ));
        }
        Ok(role)
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("listen", &self.config.api.listen)
            .field("keys", &self.config.api.keys.len())
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes for the engine endpoints and the metrics scrape.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/plan", post(post_plan))
        .route("/v1/execute", post(post_execute))
        .route("/v1/status", post(post_status))
        .route("/v1/simulate", post(post_simulate))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the REST API on `addr`.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener.local_addr().unwrap_or(addr);
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Standard response wrapper for engine endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub request_id: Uuid,
    /// Milliseconds spent per stage, in execution order.
    pub timings_ms: IndexMap<String, u64>,
    pub confidence: Option<u8>,
    pub data: T,
}

/// Per-request stage stopwatch.
struct Timings {
    request_id: Uuid,
    stages: IndexMap<String, u64>,
}

impl Timings {
    fn start() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            stages: IndexMap::new(),
        }
    }

    fn stage<T>(&mut self, name: &str, run: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let value = run();
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.stages.insert(name.to_owned(), elapsed);
        value
    }

    fn finish<T>(self, confidence: Option<u8>, data: T) -> Json<Envelope<T>> {
        Json(Envelope {
            request_id: self.request_id,
            timings_ms: self.stages,
            confidence,
            data,
        })
    }

    fn fail(&self, err: ContinuityError) -> ApiError {
        ApiError::from(err).with_request(self.request_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub cluster: Cluster,
    pub policy: FailoverPolicy,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub cluster: Cluster,
    pub policy: FailoverPolicy,
    /// Previously computed plan; planned fresh when absent.
    #[serde(default)]
    pub plan: Option<ContinuityPlan>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub approve: bool,
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub cluster: Cluster,
    /// Observed heartbeats; the topology statuses are used when empty.
    #[serde(default)]
    pub heartbeats: Vec<Heartbeat>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub cluster: Cluster,
    pub policy: FailoverPolicy,
    pub scenario: Scenario,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<Uuid>,
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: Option<Uuid>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: None,
        }
    }

    fn with_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ContinuityError> for ApiError {
    fn from(err: ContinuityError) -> Self {
        let status = match &err {
            ContinuityError::InsufficientTopology { .. }
            | ContinuityError::NoTargetFound { .. }
            | ContinuityError::InsufficientQuorum { .. }
            | ContinuityError::PolicyViolation { .. } => StatusCode::CONFLICT,
            ContinuityError::InvalidPolicy { .. }
            | ContinuityError::InvalidScenario { .. }
            | ContinuityError::MalformedPlan { .. }
            | ContinuityError::Topology(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ContinuityError::ApprovalRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
            ContinuityError::ActionExecution { .. } => StatusCode::BAD_GATEWAY,
            ContinuityError::Signing(_)
            | ContinuityError::Serialization(_)
            | ContinuityError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "api request failed");
        } else {
            warn!(code = self.code, message = %self.message, "api request rejected");
        }
        let body = Json(ErrorBody {
            request_id: self.request_id,
            code: self.code.to_owned(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn post_plan(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<PlanRequest>,
) -> Result<Json<Envelope<ContinuityPlan>>, ApiError> {
    state.authorize(&headers)?;
    let mut timings = Timings::start();
    let engine = state.engine(request.cluster);
    let plan = timings
        .stage("plan", || engine.plan(&request.policy))
        .map_err(|err| timings.fail(err))?;
    Ok(timings.finish(None, plan))
}

async fn post_execute(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Envelope<FailoverOutcome>>, ApiError> {
    state.authorize(&headers)?;
    let mut timings = Timings::start();
    if let Some(plan) = &request.plan {
        if plan.cluster().id() != request.cluster.id() {
            return Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "plan_mismatch",
                format!(
                    "plan '{}' was computed for cluster '{}', not '{}'",
                    plan.plan_id(),
                    plan.cluster().id(),
                    request.cluster.id()
                ),
            )
            .with_request(timings.request_id));
        }
    }

    let engine = state.engine(request.cluster);
    engine.observe_topology();
    let plan = match request.plan {
        Some(plan) => plan,
        None => timings
            .stage("plan", || engine.plan(&request.policy))
            .map_err(|err| timings.fail(err))?,
    };
    let execution_log = timings
        .stage("execute", || {
            engine.execute(&plan, request.dry_run, request.approve)
        })
        .map_err(|err| timings.fail(err))?;
    let verification = timings
        .stage("verify", || {
            engine.verify(&plan, &execution_log, &request.policy)
        })
        .map_err(|err| timings.fail(err))?;
    let audit = timings
        .stage("audit", || {
            let pack = engine.audit(&plan, &execution_log, &verification)?;
            state.audit.lock().append(&pack)?;
            Ok::<_, ContinuityError>(pack)
        })
        .map_err(|err| timings.fail(err))?;

    let confidence = audit.confidence;
    Ok(timings.finish(
        Some(confidence),
        FailoverOutcome {
            plan,
            execution_log,
            verification,
            audit,
        },
    ))
}

async fn post_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Envelope<ClusterStatus>>, ApiError> {
    state.authorize(&headers)?;
    let mut timings = Timings::start();
    let mut engine = state.engine(request.cluster);
    if let Some(oldest) = request.heartbeats.iter().map(|heartbeat| heartbeat.timestamp).min() {
        engine = engine.with_observation_start(oldest.min(state.clock.now()));
    }
    let status = timings.stage("status", || {
        if request.heartbeats.is_empty() {
            engine.observe_topology();
        }
        for heartbeat in request.heartbeats {
            let node = heartbeat.node_id.clone();
            if engine.record_heartbeat(heartbeat) == HeartbeatOutcome::UnknownNode {
                warn!(node = %node, "status request carried heartbeat for unknown node");
            }
        }
        engine.status()
    });
    Ok(timings.finish(None, status))
}

async fn post_simulate(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<SimulateRequest>,
) -> Result<Json<Envelope<SimulationResult>>, ApiError> {
    state.authorize(&headers)?;
    let mut timings = Timings::start();
    let seed = request
        .seed
        .unwrap_or(state.config.simulation.default_seed);
    let engine = state.engine(request.cluster);
    let result = timings
        .stage("simulate", || {
            engine.simulate(&request.policy, &request.scenario, seed)
        })
        .map_err(|err| timings.fail(err))?;
    let confidence = confidence_for(&result.verification);
    Ok(timings.finish(Some(confidence), result))
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = encode_text(&state.registry).map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics",
            err.to_string(),
        )
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
