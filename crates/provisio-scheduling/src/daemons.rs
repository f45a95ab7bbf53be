//! Daemon overhead: which cluster daemons would land on a new node.

use provisio_core::{Constraints, DaemonSet, Pod};

use crate::taints::untolerated;

/// Whether a daemon pod would be scheduled onto a node launched with
/// `constraints`.
///
/// The pod must tolerate every constraint taint and its node selector must
/// be a subset of the constraint labels. Node affinity on daemon pods is
/// not evaluated, so affinity never excludes a daemon.
pub fn daemon_will_schedule(constraints: &Constraints, pod: &Pod) -> bool {
    if !untolerated(&constraints.taints, &pod.spec.tolerations).is_empty() {
        return false;
    }
    pod.spec
        .node_selector
        .iter()
        .all(|(key, value)| constraints.labels.get(key) == Some(value))
}

/// Template pods of every daemon set that would run on a node launched with
/// `constraints`.
pub fn daemons_for(constraints: &Constraints, daemon_sets: &[DaemonSet]) -> Vec<Pod> {
    daemon_sets
        .iter()
        .map(DaemonSet::template_pod)
        .filter(|pod| daemon_will_schedule(constraints, pod))
        .collect()
}
