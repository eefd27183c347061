//! ---
//! bco_section: "02-topology-model"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Deployment topology value objects and validation."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use r_bco_topology::{
    load_cluster, load_policy, parse_cluster_yaml, parse_policy_yaml, FailoverStrategy,
    NodeRole, QuorumStatus, TopologyError,
};
use tempfile::tempdir;

const CLUSTER: &str = r#"
id: payments
nodes:
  - { id: n1, role: primary, status: healthy, region: r1, site: s1, priority: 1, capacity: 100.0 }
  - { id: n2, role: secondary, status: healthy, region: r1, site: s2, priority: 2, capacity: 80.0 }
  - { id: n3, role: secondary, status: unhealthy, region: r2, site: s3, priority: 1, capacity: 80.0 }
  - { id: w1, role: witness, status: healthy, region: r2, site: s3, priority: 9, capacity: 0.0 }
"#;

const POLICY: &str = r#"
id: payments-policy
strategy: quorum_based
region_priority: [r1, r2]
site_priority: [s2]
min_healthy_nodes: 2
timing:
  max_plan_time_ms: 2000
  max_execution_time_ms: 120000
action_durations_ms:
  dns_flip: 20000
"#;

#[test]
fn loads_documents_from_disk() {
    let dir = tempdir().unwrap();
    let cluster_path = dir.path().join("cluster.yaml");
    let policy_path = dir.path().join("policy.yaml");
    fs::write(&cluster_path, CLUSTER).unwrap();
    fs::write(&policy_path, POLICY).unwrap();

    let cluster = load_cluster(&cluster_path).unwrap();
    assert_eq!(cluster.id(), "payments");
    assert_eq!(cluster.len(), 4);
    assert_eq!(cluster.primary().unwrap().id(), "n1");
    assert_eq!(cluster.nodes_with_role(NodeRole::Witness).count(), 1);

    let policy = load_policy(&policy_path).unwrap();
    assert_eq!(policy.strategy(), FailoverStrategy::QuorumBased);
    assert_eq!(policy.timing().max_plan_time, Duration::from_secs(2));
    assert_eq!(policy.action_durations().dns_flip, Duration::from_secs(20));
    policy.validate_for(&cluster).unwrap();

    let quorum = QuorumStatus::from_cluster(&cluster);
    assert_eq!(quorum.healthy_nodes(), 3);
    assert_eq!(quorum.threshold(), 3);
    assert!(quorum.has_quorum());
    assert!(quorum.at_threshold());
}

#[test]
fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = load_cluster(&path).unwrap_err();
    match err {
        TopologyError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn invalid_documents_are_rejected() {
    let two_primaries = r#"
id: c
nodes:
  - { id: a, role: primary, status: healthy, region: r, site: s, priority: 1, capacity: 1 }
  - { id: b, role: primary, status: healthy, region: r, site: s, priority: 1, capacity: 1 }
"#;
    let err = parse_cluster_yaml(two_primaries).unwrap_err();
    assert!(err.to_string().contains("more than one primary"));

    let unknown_role = r#"
id: c
nodes:
  - { id: a, role: leader, status: healthy, region: r, site: s, priority: 1, capacity: 1 }
"#;
    assert!(parse_cluster_yaml(unknown_role).is_err());

    let empty = "id: c\nnodes: []\n";
    assert!(parse_cluster_yaml(empty).is_err());

    let bad_strategy = "id: p\nstrategy: eventually\nmin_healthy_nodes: 1\n";
    assert!(parse_policy_yaml(bad_strategy).is_err());
}

#[test]
fn policy_mismatch_detected_at_fit_time() {
    let cluster = parse_cluster_yaml(CLUSTER).unwrap();
    let policy = parse_policy_yaml(
        "id: p\nstrategy: automatic\nregion_priority: [eu-west]\nmin_healthy_nodes: 1\n",
    )
    .unwrap();
    let err = policy.validate_for(&cluster).unwrap_err();
    assert!(matches!(err, TopologyError::PolicyMismatch { .. }));
}
