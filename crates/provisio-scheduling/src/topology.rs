//! Topology spread injection.
//!
//! Pods sharing a spread constraint are grouped; each group gets a set of
//! candidate domains (hostnames or zones) with the number of matching pods
//! already running in each. Pods that already select a domain are counted
//! where they are; every other pod is pinned, through its node selector,
//! to the least loaded domain its own affinity allows at the time it is
//! visited. From here on the spread requirement is an ordinary node
//! selector entry.

use std::collections::{BTreeMap, HashMap};

use provisio_core::labels::{LABEL_HOSTNAME, LABEL_TOPOLOGY_ZONE};
use provisio_core::{Constraints, Node, Pod, SchedulerConfig, TopologySpreadConstraint};
use provisio_state::{ClusterReader, StateResult};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::debug;

use crate::affinity::NodeAffinity;

const HOSTNAME_LENGTH: usize = 10;

/// Pods in one namespace sharing one spread constraint, and the running
/// count of matching pods per domain.
#[derive(Debug, Clone)]
pub struct TopologyGroup {
    pub namespace: String,
    pub constraint: TopologySpreadConstraint,
    /// Indices into the pod batch.
    pub pods: Vec<usize>,
    spread: BTreeMap<String, u32>,
}

impl TopologyGroup {
    fn new(namespace: String, constraint: TopologySpreadConstraint) -> Self {
        Self {
            namespace,
            constraint,
            pods: Vec::new(),
            spread: BTreeMap::new(),
        }
    }

    /// Register `domains` as candidates with no pods yet.
    pub fn register(&mut self, domains: impl IntoIterator<Item = String>) {
        for domain in domains {
            self.spread.entry(domain).or_insert(0);
        }
    }

    /// Count one more pod in `domain`, if it is a candidate.
    pub fn increment(&mut self, domain: &str) {
        if let Some(count) = self.spread.get_mut(domain) {
            *count += 1;
        }
    }

    /// Least loaded domain, ties broken by domain name. Counts the pod
    /// being placed.
    pub fn next_domain(&mut self) -> Option<String> {
        self.next_domain_within(None)
    }

    /// Like [`next_domain`](Self::next_domain), limited to `allowed` when
    /// given.
    pub fn next_domain_within(&mut self, allowed: Option<&[String]>) -> Option<String> {
        let domain = self
            .spread
            .iter()
            .filter(|(domain, _)| allowed.is_none_or(|values| values.contains(*domain)))
            .min_by_key(|(_, count)| **count)
            .map(|(domain, _)| domain.clone())?;
        self.increment(&domain);
        Some(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, u32)> {
        self.spread.iter().map(|(d, c)| (d.as_str(), *c))
    }
}

/// Computes spread domains from cluster state and injects them into pods.
pub struct Topology<'a, C> {
    cluster: &'a C,
}

impl<'a, C: ClusterReader> Topology<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self { cluster }
    }

    /// Pin every pod with a supported spread constraint to a domain.
    ///
    /// Pods with unsupported topology keys are left alone; they are
    /// rejected later when their constraints are derived.
    pub async fn inject(
        &self,
        constraints: &Constraints,
        config: &SchedulerConfig,
        pods: &mut [Pod],
    ) -> StateResult<()> {
        for mut group in group_pods(pods) {
            let key = group.constraint.topology_key.clone();
            match key.as_str() {
                LABEL_HOSTNAME => compute_hostname_topology(&mut group),
                LABEL_TOPOLOGY_ZONE => {
                    self.compute_zonal_topology(&mut group, constraints, config, pods)
                        .await?
                }
                _ => {
                    debug!(topology_key = %key, "skipping unsupported topology key");
                    continue;
                }
            }
            if group.spread.is_empty() {
                debug!(
                    namespace = %group.namespace,
                    topology_key = %key,
                    "no candidate domains, skipping topology injection"
                );
                continue;
            }
            // Pods that already select a domain keep it and count toward it.
            let members = group.pods.clone();
            let mut unpinned = Vec::with_capacity(members.len());
            for index in members {
                match pods[index].spec.node_selector.get(&key) {
                    Some(domain) => {
                        let domain = domain.clone();
                        group.increment(&domain);
                    }
                    None => unpinned.push(index),
                }
            }
            for index in unpinned {
                let allowed = allowed_domains(&pods[index], &key, constraints, config);
                let Some(domain) = group.next_domain_within(allowed.as_deref()) else {
                    debug!(
                        pod = %pods[index].metadata.name,
                        topology_key = %key,
                        "no candidate domain satisfies pod affinity"
                    );
                    continue;
                };
                debug!(
                    pod = %pods[index].metadata.name,
                    topology_key = %key,
                    %domain,
                    "injected topology domain"
                );
                pods[index].spec.node_selector.insert(key.clone(), domain);
            }
        }
        Ok(())
    }

    /// Zones the group's pods may use, each counted with the matching pods
    /// already bound to nodes in that zone.
    async fn compute_zonal_topology(
        &self,
        group: &mut TopologyGroup,
        constraints: &Constraints,
        config: &SchedulerConfig,
        pods: &[Pod],
    ) -> StateResult<()> {
        let affinity = NodeAffinity::for_pods(group.pods.iter().map(|&i| &pods[i]));
        let zones = affinity
            .feasible_values(
                LABEL_TOPOLOGY_ZONE,
                &[
                    constraints.zones.as_slice(),
                    config.well_known.for_key(LABEL_TOPOLOGY_ZONE),
                ],
            )
            .unwrap_or_default();
        group.register(zones);
        if group.spread.is_empty() {
            return Ok(());
        }

        // A spread constraint without a selector matches no existing pods.
        let Some(selector) = group.constraint.label_selector.clone() else {
            return Ok(());
        };
        let existing = self.cluster.list_pods(&group.namespace, &selector).await?;
        let mut nodes: HashMap<String, Option<Node>> = HashMap::new();
        for pod in existing {
            if pod.is_terminal() || !pod.is_scheduled() {
                continue;
            }
            let Some(node_name) = pod.spec.node_name else {
                continue;
            };
            if !nodes.contains_key(&node_name) {
                let node = self.cluster.get_node(&node_name).await?;
                nodes.insert(node_name.clone(), node);
            }
            if let Some(zone) = nodes
                .get(&node_name)
                .and_then(Option::as_ref)
                .and_then(|node| node.metadata.labels.get(LABEL_TOPOLOGY_ZONE))
            {
                group.increment(zone);
            }
        }
        Ok(())
    }
}

/// Values of `key` that `pod`'s own affinity admits, or `None` when it does
/// not bound the key.
fn allowed_domains(
    pod: &Pod,
    key: &str,
    constraints: &Constraints,
    config: &SchedulerConfig,
) -> Option<Vec<String>> {
    let provisioned: &[String] = if key == LABEL_TOPOLOGY_ZONE {
        &constraints.zones
    } else {
        &[]
    };
    NodeAffinity::for_pod(pod).feasible_values(key, &[provisioned, config.well_known.for_key(key)])
}

/// One fresh hostname per `max_skew` pods, so no more than `max_skew` of the
/// group share a node.
fn compute_hostname_topology(group: &mut TopologyGroup) {
    let max_skew = group.constraint.max_skew.max(1) as usize;
    let count = group.pods.len().div_ceil(max_skew);
    let mut rng = rand::rng();
    let hostnames: Vec<String> = (0..count)
        .map(|_| {
            (&mut rng)
                .sample_iter(Alphanumeric)
                .take(HOSTNAME_LENGTH)
                .map(|c| char::from(c).to_ascii_lowercase())
                .collect()
        })
        .collect();
    group.register(hostnames);
}

/// Group pods by namespace and identical spread constraint, in the order
/// groups are first seen.
pub fn group_pods(pods: &[Pod]) -> Vec<TopologyGroup> {
    let mut groups: Vec<TopologyGroup> = Vec::new();
    let mut index: HashMap<(String, TopologySpreadConstraint), usize> = HashMap::new();
    for (i, pod) in pods.iter().enumerate() {
        for constraint in &pod.spec.topology_spread_constraints {
            let key = (pod.metadata.namespace.clone(), constraint.clone());
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(TopologyGroup::new(
                    pod.metadata.namespace.clone(),
                    constraint.clone(),
                ));
                groups.len() - 1
            });
            groups[slot].pods.push(i);
        }
    }
    groups
}
