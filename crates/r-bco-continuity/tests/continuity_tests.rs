//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r_bco_common::time::{ManualClock, SharedClock};
use r_bco_continuity::{
    AuditPack, AuditStore, CheckKind, ContinuityAuditor, ContinuityError, ContinuityPlanner,
    FailoverSimulator, Scenario, SimulationSettings,
};
use r_bco_topology::{parse_cluster_yaml, parse_policy_yaml, Cluster, FailoverPolicy};
use tempfile::tempdir;

fn clock() -> SharedClock {
    Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap(),
    ))
}

fn cluster(yaml: &str) -> Cluster {
    parse_cluster_yaml(yaml).unwrap()
}

fn policy(yaml: &str) -> FailoverPolicy {
    parse_policy_yaml(yaml).unwrap()
}

const THREE_NODE: &str = r#"
id: payments
nodes:
  - { id: n1, role: primary, status: unhealthy, region: r1, site: s1, priority: 1, capacity: 100 }
  - { id: n2, role: secondary, status: healthy, region: r1, site: s2, priority: 2, capacity: 100 }
  - { id: n3, role: secondary, status: healthy, region: r2, site: s3, priority: 1, capacity: 100 }
"#;

const REGION_POLICY: &str = r#"
id: payments-policy
strategy: automatic
region_priority: [r1, r2]
min_healthy_nodes: 2
"#;

const FIVE_NODE: &str = r#"
id: ledger
nodes:
  - { id: n1, role: primary, status: healthy, region: r1, site: s1, priority: 1, capacity: 100 }
  - { id: n2, role: secondary, status: healthy, region: r1, site: s1, priority: 1, capacity: 100 }
  - { id: n3, role: secondary, status: healthy, region: r1, site: s2, priority: 2, capacity: 100 }
  - { id: n4, role: secondary, status: healthy, region: r2, site: s3, priority: 2, capacity: 100 }
  - { id: n5, role: secondary, status: healthy, region: r2, site: s4, priority: 1, capacity: 50 }
"#;

#[test]
fn same_region_secondary_preferred_over_better_priority() {
    let plan = ContinuityPlanner::new(clock())
        .plan(&cluster(THREE_NODE), &policy(REGION_POLICY))
        .unwrap();
    assert_eq!(plan.new_primary(), "n2");
}

#[test]
fn only_primary_healthy_means_no_target() {
    let lonely = THREE_NODE
        .replace("status: unhealthy", "status: healthy")
        .replace(
            "status: healthy, region: r1, site: s2",
            "status: unhealthy, region: r1, site: s2",
        )
        .replace(
            "status: healthy, region: r2",
            "status: unhealthy, region: r2",
        );
    let err = ContinuityPlanner::new(clock())
        .plan(&cluster(&lonely), &policy(REGION_POLICY))
        .unwrap_err();
    assert!(matches!(err, ContinuityError::NoTargetFound { .. }), "{err}");
}

#[test]
fn region_failure_promotes_into_surviving_region() {
    let policy = policy("id: p\nstrategy: automatic\nregion_priority: [r1, r2]\nmin_healthy_nodes: 2\n");
    let result = FailoverSimulator::new(SimulationSettings::default())
        .simulate(
            &cluster(FIVE_NODE),
            &policy,
            &Scenario::RegionFailure { region: None },
            11,
        )
        .unwrap();
    assert_eq!(result.failed_nodes, vec!["n1", "n2", "n3"]);
    assert_eq!(result.plan.new_primary(), "n5");
    assert_eq!(result.faulted_cluster.healthy_count(), 2);
    // two survivors of five cannot hold quorum
    let quorum = result.verification.check(CheckKind::Quorum).unwrap();
    assert!(!quorum.passed);
    assert!(result
        .verification
        .warnings
        .iter()
        .any(|warning| warning.contains("outside preferred region 'r1'")));
}

#[test]
fn region_failure_without_survivors_finds_no_target() {
    let single_region = FIVE_NODE.replace("region: r2", "region: r1");
    let policy = policy("id: p\nstrategy: automatic\nmin_healthy_nodes: 1\n");
    let err = FailoverSimulator::new(SimulationSettings::default())
        .simulate(
            &cluster(&single_region),
            &policy,
            &Scenario::RegionFailure { region: None },
            3,
        )
        .unwrap_err();
    assert!(matches!(err, ContinuityError::NoTargetFound { .. }));
}

#[test]
fn quorum_based_policy_refuses_minority_region() {
    let policy = policy("id: p\nstrategy: quorum_based\nmin_healthy_nodes: 1\n");
    let err = FailoverSimulator::new(SimulationSettings::default())
        .simulate(
            &cluster(FIVE_NODE),
            &policy,
            &Scenario::RegionFailure {
                region: Some("r1".to_owned()),
            },
            3,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ContinuityError::InsufficientQuorum {
            healthy: 2,
            threshold: 3,
            ..
        }
    ));
}

#[test]
fn simulations_are_reproducible() {
    let simulator = FailoverSimulator::new(SimulationSettings::default());
    let cluster = cluster(FIVE_NODE);
    let policy = policy("id: p\nstrategy: automatic\nmin_healthy_nodes: 1\n");
    for scenario in [
        Scenario::PrimaryFailure,
        Scenario::RandomFailures,
        Scenario::RegionFailure {
            region: Some("r2".to_owned()),
        },
    ] {
        let first = simulator.simulate(&cluster, &policy, &scenario, 1234).unwrap();
        let second = simulator.simulate(&cluster, &policy, &scenario, 1234).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    let targets: Vec<String> = (0..16)
        .map(|_| {
            simulator
                .simulate(&cluster, &policy, &Scenario::PrimaryFailure, 7)
                .unwrap()
                .plan
                .new_primary()
                .to_owned()
        })
        .collect();
    assert!(targets.iter().all(|target| target == "n2"));
}

fn audited_pack() -> AuditPack {
    let result = FailoverSimulator::new(SimulationSettings::default())
        .simulate(&cluster(THREE_NODE), &policy(REGION_POLICY), &Scenario::PrimaryFailure, 1)
        .unwrap();
    ContinuityAuditor::new(clock())
        .with_signing_key(Some(b"k".to_vec()))
        .audit(&result.plan, &result.execution_log, &result.verification)
        .unwrap()
}

#[test]
fn tampered_action_breaks_manifest_and_signature() {
    let pack = audited_pack();
    assert!(pack.verify_manifest());
    assert!(pack.verify_signature(b"k"));
    assert_eq!(pack.confidence, 100);
    assert_eq!(pack.citations.len(), 3);

    let mut value = serde_json::to_value(&pack).unwrap();
    value["plan"]["actions"][1]["target"] = serde_json::json!("n3");
    let tampered: AuditPack = serde_json::from_value(value).unwrap();
    assert!(!tampered.verify_manifest());

    let mut value = serde_json::to_value(&pack).unwrap();
    value["confidence"] = serde_json::json!(0);
    let tampered: AuditPack = serde_json::from_value(value).unwrap();
    assert!(!tampered.verify_signature(b"k"));
}

#[test]
fn audit_store_chains_and_detects_edits() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit").join("failover.ndjson");
    let pack = audited_pack();

    let mut store = AuditStore::open(&path, clock()).unwrap();
    store.append(&pack).unwrap();
    store.append(&pack).unwrap();
    assert!(store.verify().unwrap());
    assert_eq!(store.entries().unwrap().len(), 2);
    assert!(store.find(pack.plan_id()).unwrap().is_some());
    assert!(store.find("plan-unknown").unwrap().is_none());

    let reopened = AuditStore::open(&path, clock()).unwrap();
    assert!(reopened.verify().unwrap());

    let contents = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    lines[0]["pack"]["confidence"] = serde_json::json!(5);
    let rewritten: String = lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect();
    fs::write(&path, rewritten).unwrap();
    assert!(!AuditStore::open(&path, clock()).unwrap().verify().unwrap());
}
