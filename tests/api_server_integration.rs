//! ---
//! bco_section: "15-testing-qa-runbook"
//! bco_subsection: "integration-tests"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Integration and validation tests for the R-BCO stack."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use r_bco_api::{spawn_api_server, ApiState};
use r_bco_common::config::{ApiRole, EngineConfig};
use r_bco_metrics::new_registry;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn send(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn post(path: &str, key: Option<&str>, body: &str) -> String {
    let key = key
        .map(|key| format!("x-api-key: {key}\r\n"))
        .unwrap_or_default();
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\n{key}Content-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn daemon_serves_status_and_metrics_until_shutdown() {
    let dir = tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.api.keys.insert("svc".to_owned(), ApiRole::Service);
    config.audit.log_path = dir.path().join("audit.ndjson");
    let state = Arc::new(ApiState::new(config, new_registry()).unwrap());
    let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.addr();
    assert_ne!(addr.port(), 0);

    let body = serde_json::json!({
        "cluster": {
            "id": "edge",
            "nodes": [
                { "id": "a", "role": "primary", "status": "healthy", "region": "r1", "site": "s1", "priority": 1, "capacity": 10.0 },
                { "id": "b", "role": "secondary", "status": "unhealthy", "region": "r1", "site": "s2", "priority": 1, "capacity": 10.0 }
            ]
        }
    })
    .to_string();

    let denied = send(addr, post("/v1/status", None, &body)).await;
    assert!(denied.starts_with("HTTP/1.1 401"), "{denied}");

    let status = send(addr, post("/v1/status", Some("svc"), &body)).await;
    assert!(status.starts_with("HTTP/1.1 200"), "{status}");
    assert!(status.contains("\"request_id\""));
    assert!(status.contains("\"has_quorum\":false"));

    let metrics = send(
        addr,
        "GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_owned(),
    )
    .await;
    assert!(metrics.starts_with("HTTP/1.1 200"), "{metrics}");
    assert!(metrics.contains("continuity_nodes_healthy 1"));

    server.shutdown().await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}
