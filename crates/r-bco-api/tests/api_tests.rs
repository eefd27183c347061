//! ---
//! bco_section: "05-networking-external-interfaces"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Networking API surface for external integrations."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use r_bco_api::{router, ApiState, API_KEY_HEADER};
use r_bco_common::config::{ApiRole, EngineConfig};
use r_bco_metrics::new_registry;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    app: Router,
    _dir: TempDir,
    audit_path: std::path::PathBuf,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.ndjson");
    let mut config = EngineConfig::default();
    config.api.keys.insert("ops-key".to_owned(), ApiRole::Admin);
    config.api.keys.insert("svc-key".to_owned(), ApiRole::Service);
    config.api.keys.insert("dash-key".to_owned(), ApiRole::Viewer);
    config.audit.log_path = audit_path.clone();
    let state = ApiState::new(config, new_registry()).unwrap();
    Harness {
        app: router(Arc::new(state)),
        _dir: dir,
        audit_path,
    }
}

fn cluster() -> Value {
    json!({
        "id": "payments",
        "nodes": [
            { "id": "n1", "role": "primary", "status": "unhealthy", "region": "r1", "site": "s1", "priority": 1, "capacity": 100.0 },
            { "id": "n2", "role": "secondary", "status": "healthy", "region": "r1", "site": "s2", "priority": 2, "capacity": 100.0 },
            { "id": "n3", "role": "secondary", "status": "healthy", "region": "r2", "site": "s3", "priority": 1, "capacity": 100.0 }
        ]
    })
}

fn policy() -> Value {
    json!({
        "id": "payments-policy",
        "strategy": "automatic",
        "region_priority": ["r1", "r2"],
        "min_healthy_nodes": 2
    })
}

async fn call(app: &Router, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
    let (status, text) = call_text(app, uri, key, body).await;
    (status, serde_json::from_str(&text).unwrap())
}

async fn call_text(
    app: &Router,
    uri: &str,
    key: Option<&str>,
    body: Value,
) -> (StatusCode, String) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        request = request.header(API_KEY_HEADER, key);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Keys of the `timings_ms` object in the order they were written.
fn stage_order(text: &str) -> Vec<String> {
    let start = text.find("\"timings_ms\":{").unwrap() + "\"timings_ms\":{".len();
    let end = start + text[start..].find('}').unwrap();
    text[start..end]
        .split(',')
        .map(|entry| entry.split(':').next().unwrap().trim_matches('"').to_owned())
        .collect()
}

#[tokio::test]
async fn missing_or_unknown_key_is_unauthorized() {
    let harness = harness();
    let body = json!({ "cluster": cluster(), "policy": policy() });
    let (status, _) = call(&harness.app, "/v1/plan", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, payload) = call(&harness.app, "/v1/plan", Some("nope"), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(payload["code"], "unauthorized");
}

#[tokio::test]
async fn viewer_role_is_forbidden() {
    let harness = harness();
    let body = json!({ "cluster": cluster() });
    let (status, payload) = call(&harness.app, "/v1/status", Some("dash-key"), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["code"], "forbidden");
}

#[tokio::test]
async fn plan_returns_enveloped_plan() {
    let harness = harness();
    let body = json!({ "cluster": cluster(), "policy": policy() });
    let (status, payload) = call(&harness.app, "/v1/plan", Some("svc-key"), body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(uuid::Uuid::parse_str(payload["request_id"].as_str().unwrap()).is_ok());
    assert!(payload["timings_ms"]["plan"].is_u64());
    assert!(payload["confidence"].is_null());
    assert_eq!(payload["data"]["old_primary"], "n1");
    assert_eq!(payload["data"]["new_primary"], "n2");
}

#[tokio::test]
async fn execute_runs_every_stage_and_appends_audit() {
    let harness = harness();
    let body = json!({ "cluster": cluster(), "policy": policy(), "dry_run": true });
    let (status, text) = call_text(&harness.app, "/v1/execute", Some("ops-key"), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stage_order(&text), vec!["plan", "execute", "verify", "audit"]);
    let payload: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(payload["confidence"], 100);
    assert_eq!(payload["data"]["verification"]["passed"], true);
    assert_eq!(payload["data"]["execution_log"]["dry_run"], true);

    let trail = std::fs::read_to_string(&harness.audit_path).unwrap();
    assert_eq!(trail.lines().count(), 1);
    assert!(trail.contains(payload["data"]["plan"]["plan_id"].as_str().unwrap()));
}

#[tokio::test]
async fn engine_errors_map_to_codes() {
    let harness = harness();
    let mut lonely = cluster();
    lonely["nodes"][0]["status"] = json!("healthy");
    lonely["nodes"][1]["status"] = json!("unhealthy");
    lonely["nodes"][2]["status"] = json!("unhealthy");
    let body = json!({ "cluster": lonely, "policy": policy() });
    let (status, payload) = call(&harness.app, "/v1/plan", Some("ops-key"), body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(payload["code"], "no_target_found");
    assert!(payload["request_id"].is_string());

    let mut manual = policy();
    manual["strategy"] = json!("manual");
    let body = json!({ "cluster": cluster(), "policy": manual, "dry_run": false });
    let (status, payload) = call(&harness.app, "/v1/execute", Some("ops-key"), body).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(payload["code"], "approval_required");
}

#[tokio::test]
async fn status_reflects_reported_heartbeats() {
    let harness = harness();
    let now = chrono::Utc::now();
    let body = json!({
        "cluster": cluster(),
        "heartbeats": [
            { "node_id": "n1", "timestamp": now, "status": "healthy", "latency_ms": 3 },
            { "node_id": "n9", "timestamp": now, "status": "healthy", "latency_ms": 3 }
        ]
    });
    let (status, payload) = call(&harness.app, "/v1/status", Some("svc-key"), body).await;
    assert_eq!(status, StatusCode::OK);
    let data = &payload["data"];
    assert_eq!(data["primary"], "n1");
    assert_eq!(data["quorum"]["healthy_nodes"], 3);
    assert_eq!(data["quorum"]["has_quorum"], true);
}

#[tokio::test]
async fn silent_and_stale_nodes_drop_out_of_status() {
    let harness = harness();
    let now = chrono::Utc::now();
    let minute_ago = now - chrono::Duration::seconds(60);
    let body = json!({
        "cluster": cluster(),
        "heartbeats": [
            { "node_id": "n1", "timestamp": minute_ago, "status": "healthy", "latency_ms": 3 },
            { "node_id": "n2", "timestamp": now, "status": "healthy", "latency_ms": 3 }
        ]
    });
    let (status, payload) = call(&harness.app, "/v1/status", Some("svc-key"), body).await;
    assert_eq!(status, StatusCode::OK);
    let data = &payload["data"];
    let statuses: Vec<(&str, &str)> = data["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| (node["id"].as_str().unwrap(), node["status"].as_str().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        vec![("n1", "unknown"), ("n2", "healthy"), ("n3", "unknown")]
    );
    assert_eq!(data["quorum"]["healthy_nodes"], 1);
    assert_eq!(data["quorum"]["has_quorum"], false);
}

#[tokio::test]
async fn simulate_is_reproducible_and_scored() {
    let harness = harness();
    let body = json!({
        "cluster": cluster(),
        "policy": policy(),
        "scenario": { "kind": "primary_failure" },
        "seed": 42
    });
    let (status, first) = call(&harness.app, "/v1/simulate", Some("ops-key"), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = call(&harness.app, "/v1/simulate", Some("ops-key"), body).await;
    assert_eq!(first["data"], second["data"]);
    assert_eq!(first["confidence"], 100);
    assert_eq!(first["data"]["plan"]["new_primary"], "n2");
}

#[tokio::test]
async fn metrics_exposes_failover_counters() {
    let harness = harness();
    let body = json!({ "cluster": cluster(), "policy": policy() });
    let (status, _) = call(&harness.app, "/v1/execute", Some("ops-key"), body).await;
    assert_eq!(status, StatusCode::OK);

    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("failover_executions_total"));
    assert!(text.contains("continuity_quorum_reached"));
}
