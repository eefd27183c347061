//! ---
//! bco_section: "05-networking-external-interfaces"
//! bco_subsection: "binary"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Control CLI for operators driving failover planning and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

const CLUSTER: &str = r#"
id: payments
nodes:
  - { id: n1, role: primary, status: unhealthy, region: r1, site: s1, priority: 1, capacity: 100 }
  - { id: n2, role: secondary, status: healthy, region: r1, site: s2, priority: 2, capacity: 100 }
  - { id: n3, role: secondary, status: healthy, region: r2, site: s3, priority: 1, capacity: 100 }
"#;

const POLICY: &str = r#"
id: payments-policy
strategy: automatic
region_priority: [r1, r2]
min_healthy_nodes: 2
"#;

fn workspace() -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("cluster.yaml"), CLUSTER).unwrap();
    fs::write(dir.path().join("policy.yaml"), POLICY).unwrap();
    dir
}

fn bcoctl(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("r-bcoctl").unwrap();
    cmd.current_dir(dir).env_remove("R_BCO_CONFIG");
    cmd
}

fn stdout_json(output: std::process::Output) -> serde_json::Value {
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn plan_selects_same_region_secondary() {
    let dir = workspace();
    let output = bcoctl(dir.path())
        .args(["plan", "--cluster", "cluster.yaml", "--policy", "policy.yaml"])
        .output()
        .unwrap();
    let plan = stdout_json(output);
    assert_eq!(plan["new_primary"], "n2");
    assert_eq!(plan["old_primary"], "n1");
}

#[test]
fn simulate_output_is_reproducible() {
    let dir = workspace();
    let run = || {
        bcoctl(dir.path())
            .args([
                "simulate",
                "--cluster",
                "cluster.yaml",
                "--policy",
                "policy.yaml",
                "--scenario",
                "random_failures",
                "--seed",
                "99",
            ])
            .output()
            .unwrap()
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn unknown_scenario_is_rejected() {
    let dir = workspace();
    bcoctl(dir.path())
        .args([
            "simulate",
            "--cluster",
            "cluster.yaml",
            "--policy",
            "policy.yaml",
            "--scenario",
            "meteor_strike",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown scenario"));
}

#[test]
fn execute_then_audit_round_trip() {
    let dir = workspace();
    let plan = bcoctl(dir.path())
        .args(["plan", "--cluster", "cluster.yaml", "--policy", "policy.yaml"])
        .output()
        .unwrap();
    assert!(plan.status.success());
    fs::write(dir.path().join("plan.json"), &plan.stdout).unwrap();
    let plan_id = stdout_json(plan)["plan_id"].as_str().unwrap().to_owned();

    let outcome = bcoctl(dir.path())
        .args([
            "execute",
            "--plan",
            "plan.json",
            "--dry-run",
            "--strict",
            "--audit-log",
            "audit/trail.ndjson",
        ])
        .output()
        .unwrap();
    let outcome = stdout_json(outcome);
    assert_eq!(outcome["verification"]["passed"], true);
    assert_eq!(outcome["audit"]["confidence"], 100);

    let summary = bcoctl(dir.path())
        .args(["audit", "--log", "audit/trail.ndjson", "--plan-id", &plan_id])
        .output()
        .unwrap();
    let summary = stdout_json(summary);
    assert_eq!(summary["records"], 1);
    assert_eq!(summary["chain_valid"], true);
    assert_eq!(summary["manifest_valid"], true);
}

#[test]
fn engine_errors_exit_with_code_and_diagnostic() {
    let dir = workspace();
    let lonely = CLUSTER
        .replace("status: unhealthy", "status: healthy")
        .replace("status: healthy, region: r1, site: s2", "status: unhealthy, region: r1, site: s2")
        .replace("status: healthy, region: r2", "status: unhealthy, region: r2");
    fs::write(dir.path().join("lonely.yaml"), lonely).unwrap();
    bcoctl(dir.path())
        .args(["plan", "--cluster", "lonely.yaml", "--policy", "policy.yaml"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error[no_target_found]"));
}

#[test]
fn missing_document_reports_path() {
    let dir = workspace();
    bcoctl(dir.path())
        .args(["status", "--cluster", "absent.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.yaml"));
}
