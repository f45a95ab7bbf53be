//! End-to-end solve tests.
//!
//! Every scenario runs the full pipeline against an in-memory state store
//! seeded with nodes, running pods and daemon sets, or against readers that
//! fail or hang to exercise the fatal paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use provisio_core::labels::{
    CAPACITY_TYPE_LABEL, LABEL_HOSTNAME, LABEL_TOPOLOGY_ZONE, SCHEDULING_ATTEMPTS_ANNOTATION,
    SUBNET_SELECTOR_ANNOTATION,
};
use provisio_core::*;
use provisio_metrics::PrometheusMetrics;
use provisio_scheduling::{ConstraintHooks, Schedule, Scheduler, SchedulerError};
use provisio_state::{ClusterReader, StateError, StateResult, StateStore};

// ── Fixtures ──────────────────────────────────────────────────────

fn test_store() -> StateStore {
    StateStore::open_in_memory().unwrap()
}

fn selector() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([(
        "kubernetes.io/cluster/test".to_string(),
        "*".to_string(),
    )]))
}

fn provisioner() -> Provisioner {
    Provisioner::new(
        "default",
        Constraints {
            zones: vec!["zone-a".to_string(), "zone-b".to_string()],
            provider: ProviderConstraints {
                instance_profile: "node-role".to_string(),
                subnet_selector: selector(),
                security_group_selector: selector(),
                cluster: Some(Cluster {
                    name: "test".to_string(),
                    endpoint: "https://api.test.example.com".to_string(),
                }),
                ..ProviderConstraints::default()
            },
            ..Constraints::default()
        },
    )
}

fn pod(name: &str) -> Pod {
    let mut pod = Pod::new("default", name);
    pod.metadata
        .labels
        .insert("app".to_string(), "web".to_string());
    pod
}

fn scheduler(store: &StateStore) -> Scheduler<StateStore> {
    Scheduler::new(store.clone(), SchedulerConfig::default()).unwrap()
}

/// Pod names per schedule, order-insensitive.
fn grouping(schedules: &[Schedule]) -> BTreeSet<BTreeSet<String>> {
    schedules
        .iter()
        .map(|s| s.pods.iter().map(|p| p.metadata.name.clone()).collect())
        .collect()
}

fn names(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Cluster reader whose every call fails.
struct UnavailableCluster;

impl ClusterReader for UnavailableCluster {
    async fn list_daemon_sets(&self) -> StateResult<Vec<DaemonSet>> {
        Err(StateError::Unavailable("connection refused".to_string()))
    }

    async fn list_nodes(&self, _: &LabelSelector) -> StateResult<Vec<Node>> {
        Err(StateError::Unavailable("connection refused".to_string()))
    }

    async fn list_pods(&self, _: &str, _: &LabelSelector) -> StateResult<Vec<Pod>> {
        Err(StateError::Unavailable("connection refused".to_string()))
    }

    async fn get_node(&self, _: &str) -> StateResult<Option<Node>> {
        Err(StateError::Unavailable("connection refused".to_string()))
    }
}

/// Cluster reader that never answers.
struct HangingCluster;

impl ClusterReader for HangingCluster {
    async fn list_daemon_sets(&self) -> StateResult<Vec<DaemonSet>> {
        std::future::pending().await
    }

    async fn list_nodes(&self, _: &LabelSelector) -> StateResult<Vec<Node>> {
        std::future::pending().await
    }

    async fn list_pods(&self, _: &str, _: &LabelSelector) -> StateResult<Vec<Pod>> {
        std::future::pending().await
    }

    async fn get_node(&self, _: &str) -> StateResult<Option<Node>> {
        std::future::pending().await
    }
}

// ── Grouping ──────────────────────────────────────────────────────

#[tokio::test]
async fn set_equal_constraints_share_a_schedule() {
    let store = test_store();
    let tolerations = vec![
        Toleration::equal("dedicated", "ml", Some(TaintEffect::NoSchedule)),
        Toleration::equal("gpu", "true", Some(TaintEffect::NoExecute)),
    ];

    let mut a = pod("a");
    a.spec.tolerations = tolerations.clone();
    a.spec
        .node_selector
        .insert("team".to_string(), "ml".to_string());

    let mut b = pod("b");
    b.spec.tolerations = tolerations.into_iter().rev().collect();
    b.spec
        .node_selector
        .insert("team".to_string(), "ml".to_string());

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![a, b])
        .await
        .unwrap();

    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].pods.len(), 2);
    assert_eq!(schedules[0].constraints.taints.len(), 2);
    assert_eq!(
        schedules[0].constraints.labels.get("team").map(String::as_str),
        Some("ml")
    );
}

#[tokio::test]
async fn capacity_types_split_schedules() {
    let store = test_store();
    let mut spot = pod("spot");
    spot.spec
        .node_selector
        .insert(CAPACITY_TYPE_LABEL.to_string(), "spot".to_string());
    let mut on_demand = pod("on-demand");
    on_demand
        .spec
        .node_selector
        .insert(CAPACITY_TYPE_LABEL.to_string(), "on-demand".to_string());

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![spot, on_demand])
        .await
        .unwrap();

    assert_eq!(schedules.len(), 2);
    assert_eq!(schedules[0].constraints.capacity_types, ["spot"]);
    assert_eq!(schedules[1].constraints.capacity_types, ["on-demand"]);
}

#[tokio::test]
async fn invalid_pod_is_dropped_and_others_still_schedule() {
    let store = test_store();
    let mut invalid = pod("invalid");
    invalid.metadata.annotations.insert(
        SUBNET_SELECTOR_ANNOTATION.to_string(),
        r#"{"Name": ""}"#.to_string(),
    );

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![pod("valid-1"), invalid, pod("valid-2")])
        .await
        .unwrap();

    assert_eq!(grouping(&schedules), BTreeSet::from([names(&["valid-1", "valid-2"])]));
}

#[tokio::test]
async fn solving_twice_groups_identically() {
    let store = test_store();
    let mut pods = vec![pod("a"), pod("b"), pod("c")];
    pods[1]
        .spec
        .node_selector
        .insert(LABEL_TOPOLOGY_ZONE.to_string(), "zone-b".to_string());
    pods[2]
        .spec
        .node_selector
        .insert(LABEL_TOPOLOGY_ZONE.to_string(), "zone-b".to_string());

    let scheduler = scheduler(&store);
    let first = scheduler.solve(&provisioner(), pods.clone()).await.unwrap();
    let second = scheduler.solve(&provisioner(), pods).await.unwrap();

    assert_eq!(grouping(&first), grouping(&second));
    assert_eq!(
        grouping(&first),
        BTreeSet::from([names(&["a"]), names(&["b", "c"])])
    );
}

#[tokio::test]
async fn caller_constraints_are_not_mutated() {
    let store = test_store();
    let provisioner = provisioner();
    let before = provisioner.clone();
    let mut pinned = pod("pinned");
    pinned
        .spec
        .node_selector
        .insert(LABEL_TOPOLOGY_ZONE.to_string(), "zone-a".to_string());

    scheduler(&store)
        .solve(&provisioner, vec![pinned])
        .await
        .unwrap();
    assert_eq!(provisioner, before);
}

// ── Daemons ───────────────────────────────────────────────────────

#[tokio::test]
async fn daemons_that_fit_are_attached() {
    let store = test_store();
    store
        .put_daemon_set(&DaemonSet::new(
            "kube-system",
            "logging",
            PodSpec {
                tolerations: vec![Toleration::exists("", None)],
                ..PodSpec::default()
            },
        ))
        .unwrap();
    store
        .put_daemon_set(&DaemonSet::new(
            "kube-system",
            "gpu-driver",
            PodSpec {
                tolerations: vec![Toleration::exists("", None)],
                node_selector: BTreeMap::from([("gpu".to_string(), "true".to_string())]),
                ..PodSpec::default()
            },
        ))
        .unwrap();
    store
        .put_daemon_set(&DaemonSet::new("kube-system", "intolerant", PodSpec::default()))
        .unwrap();

    let mut provisioner = provisioner();
    provisioner
        .spec
        .constraints
        .taints
        .push(Taint::new("dedicated", "ml", TaintEffect::NoSchedule));
    let mut web = pod("web");
    web.spec.tolerations.push(Toleration::exists("dedicated", None));

    let schedules = scheduler(&store)
        .solve(&provisioner, vec![web])
        .await
        .unwrap();

    assert_eq!(schedules.len(), 1);
    let daemons: Vec<&str> = schedules[0]
        .daemons
        .iter()
        .map(|d| d.metadata.name.as_str())
        .collect();
    assert_eq!(daemons, ["logging"]);
}

// ── Topology ──────────────────────────────────────────────────────

#[tokio::test]
async fn hostname_spread_is_stripped_from_schedules() {
    let store = test_store();
    let spread = TopologySpreadConstraint {
        max_skew: 1,
        topology_key: LABEL_HOSTNAME.to_string(),
        when_unsatisfiable: UnsatisfiableConstraintAction::DoNotSchedule,
        label_selector: Some(LabelSelector::from_labels(&[("app", "web")])),
    };
    let pods: Vec<Pod> = (0..3)
        .map(|i| {
            let mut pod = pod(&format!("web-{i}"));
            pod.spec.topology_spread_constraints.push(spread.clone());
            pod
        })
        .collect();

    let schedules = scheduler(&store)
        .solve(&provisioner(), pods)
        .await
        .unwrap();

    assert_eq!(schedules.len(), 3);
    for schedule in &schedules {
        assert_eq!(schedule.pods.len(), 1);
        assert!(!schedule.constraints.labels.contains_key(LABEL_HOSTNAME));
        assert!(
            schedule
                .constraints
                .requirements
                .iter()
                .all(|r| r.key != LABEL_HOSTNAME)
        );
    }
}

#[tokio::test]
async fn zonal_spread_fills_the_emptier_zone_first() {
    let store = test_store();
    let mut node = Node::new("node-a");
    node.metadata
        .labels
        .insert(LABEL_TOPOLOGY_ZONE.to_string(), "zone-a".to_string());
    store.put_node(&node).unwrap();
    let mut existing = pod("existing");
    existing.spec.node_name = Some("node-a".to_string());
    existing.status.phase = PodPhase::Running;
    store.put_pod(&existing).unwrap();

    let spread = TopologySpreadConstraint {
        max_skew: 1,
        topology_key: LABEL_TOPOLOGY_ZONE.to_string(),
        when_unsatisfiable: UnsatisfiableConstraintAction::DoNotSchedule,
        label_selector: Some(LabelSelector::from_labels(&[("app", "web")])),
    };
    let mut incoming = pod("incoming");
    incoming.spec.topology_spread_constraints.push(spread);

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![incoming])
        .await
        .unwrap();

    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].constraints.zones, ["zone-b"]);
}

fn zonal_spread() -> TopologySpreadConstraint {
    TopologySpreadConstraint {
        max_skew: 1,
        topology_key: LABEL_TOPOLOGY_ZONE.to_string(),
        when_unsatisfiable: UnsatisfiableConstraintAction::DoNotSchedule,
        label_selector: Some(LabelSelector::from_labels(&[("app", "web")])),
    }
}

#[tokio::test]
async fn zonal_spread_keeps_a_selected_zone() {
    let store = test_store();
    let mut free = pod("free");
    free.spec.topology_spread_constraints.push(zonal_spread());
    let mut pinned = pod("pinned");
    pinned.spec.topology_spread_constraints.push(zonal_spread());
    pinned
        .spec
        .node_selector
        .insert(LABEL_TOPOLOGY_ZONE.to_string(), "zone-a".to_string());

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![free, pinned])
        .await
        .unwrap();

    assert_eq!(grouping(&schedules), BTreeSet::from([names(&["free", "pinned"])]));
    assert_eq!(schedules[0].constraints.zones, ["zone-a"]);
    for pod in &schedules[0].pods {
        assert_eq!(pod.spec.node_selector[LABEL_TOPOLOGY_ZONE], "zone-a");
    }
}

#[tokio::test]
async fn zonal_spread_honours_required_zone_affinity() {
    let store = test_store();
    let mut free = pod("free");
    free.spec.topology_spread_constraints.push(zonal_spread());
    let mut required = pod("required");
    required.spec.topology_spread_constraints.push(zonal_spread());
    required.spec.affinity = Some(Affinity {
        node_affinity: Some(NodeAffinitySpec {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: vec![NodeSelectorRequirement::new(
                        LABEL_TOPOLOGY_ZONE,
                        NodeSelectorOperator::In,
                        &["zone-b"],
                    )],
                }],
            }),
            ..NodeAffinitySpec::default()
        }),
    });

    let schedules = scheduler(&store)
        .solve(&provisioner(), vec![free, required])
        .await
        .unwrap();

    let scheduled: BTreeSet<String> = schedules
        .iter()
        .flat_map(|s| s.pods.iter().map(|p| p.metadata.name.clone()))
        .collect();
    assert_eq!(scheduled, names(&["free", "required"]));
    for schedule in &schedules {
        assert_eq!(schedule.constraints.zones, ["zone-b"]);
    }
}

// ── Preferences ───────────────────────────────────────────────────

#[tokio::test]
async fn failed_pods_lose_their_heaviest_preference() {
    let store = test_store();
    let mut preferring = pod("preferring");
    preferring.spec.affinity = Some(Affinity {
        node_affinity: Some(NodeAffinitySpec {
            preferred_during_scheduling_ignored_during_execution: vec![PreferredSchedulingTerm {
                weight: 10,
                preference: NodeSelectorTerm {
                    match_expressions: vec![NodeSelectorRequirement::new(
                        LABEL_TOPOLOGY_ZONE,
                        NodeSelectorOperator::In,
                        &["zone-a"],
                    )],
                },
            }],
            ..NodeAffinitySpec::default()
        }),
    });

    let scheduler = scheduler(&store);
    let fresh = scheduler
        .solve(&provisioner(), vec![preferring.clone()])
        .await
        .unwrap();
    assert_eq!(fresh[0].constraints.zones, ["zone-a"]);

    preferring
        .metadata
        .annotations
        .insert(SCHEDULING_ATTEMPTS_ANNOTATION.to_string(), "1".to_string());
    let relaxed = scheduler
        .solve(&provisioner(), vec![preferring])
        .await
        .unwrap();
    assert_eq!(relaxed[0].constraints.zones, ["zone-a", "zone-b"]);
    assert!(relaxed[0].constraints.requirements.is_empty());
}

// ── Failures ──────────────────────────────────────────────────────

#[tokio::test]
async fn daemon_listing_failure_is_fatal() {
    let scheduler = Scheduler::new(UnavailableCluster, SchedulerConfig::default()).unwrap();
    let err = scheduler
        .solve(&provisioner(), vec![pod("web")])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Daemons(_)));
    assert!(err.to_string().starts_with("computing node overhead"));
}

#[tokio::test]
async fn topology_read_failure_is_fatal() {
    let scheduler = Scheduler::new(UnavailableCluster, SchedulerConfig::default()).unwrap();
    let mut spread_pod = pod("web");
    spread_pod
        .spec
        .topology_spread_constraints
        .push(TopologySpreadConstraint {
            max_skew: 1,
            topology_key: LABEL_TOPOLOGY_ZONE.to_string(),
            when_unsatisfiable: UnsatisfiableConstraintAction::DoNotSchedule,
            label_selector: Some(LabelSelector::from_labels(&[("app", "web")])),
        });
    let err = scheduler
        .solve(&provisioner(), vec![spread_pod])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Topology(_)));
}

#[tokio::test]
async fn no_pods_means_no_cluster_reads() {
    let scheduler = Scheduler::new(UnavailableCluster, SchedulerConfig::default()).unwrap();
    let schedules = scheduler.solve(&provisioner(), Vec::new()).await.unwrap();
    assert!(schedules.is_empty());
}

struct RejectAll;

impl ConstraintHooks for RejectAll {
    fn constrain(&self, _: &mut Constraints, pods: &[Pod]) -> anyhow::Result<()> {
        anyhow::bail!("no capacity for {} pods", pods.len())
    }
}

#[tokio::test]
async fn constrain_hook_error_is_fatal() {
    let store = test_store();
    let err = scheduler(&store)
        .with_hooks(Arc::new(RejectAll))
        .solve(&provisioner(), vec![pod("web")])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Constrain(_)));
    assert_eq!(err.to_string(), "applying constraints: no capacity for 1 pods");
}

#[tokio::test]
async fn solve_deadline_expires() {
    let scheduler = Scheduler::new(HangingCluster, SchedulerConfig::default())
        .unwrap()
        .with_solve_timeout(Some(Duration::from_millis(20)));
    let err = scheduler
        .solve(&provisioner(), vec![pod("web")])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Timeout(_)));
}

#[test]
fn malformed_timeout_is_rejected() {
    let config = SchedulerConfig {
        solve_timeout: Some("soon".to_string()),
        ..SchedulerConfig::default()
    };
    assert!(matches!(
        Scheduler::new(test_store(), config),
        Err(SchedulerError::Config(_))
    ));
}

// ── Metrics ───────────────────────────────────────────────────────

#[tokio::test]
async fn every_solve_is_observed() {
    let store = test_store();
    let metrics = Arc::new(PrometheusMetrics::new().unwrap());
    let scheduler = scheduler(&store).with_metrics(metrics.clone());

    scheduler.solve(&provisioner(), vec![pod("web")]).await.unwrap();
    let failing = Scheduler::new(UnavailableCluster, SchedulerConfig::default())
        .unwrap()
        .with_metrics(metrics.clone());
    failing
        .solve(&provisioner(), vec![pod("web")])
        .await
        .unwrap_err();

    let rendered = provisio_metrics::render_prometheus(&metrics).unwrap();
    assert!(rendered.contains(
        r#"provisio_allocation_controller_scheduling_duration_seconds_count{provisioner="default",result="success"} 1"#
    ));
    assert!(rendered.contains(
        r#"provisio_allocation_controller_scheduling_duration_seconds_count{provisioner="default",result="error"} 1"#
    ));
}
