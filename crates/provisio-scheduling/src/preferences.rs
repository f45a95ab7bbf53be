//! Relaxation of soft node-affinity preferences for pods that keep failing
//! to schedule.

use provisio_core::Pod;
use provisio_core::labels::SCHEDULING_ATTEMPTS_ANNOTATION;
use tracing::debug;

use crate::affinity::heaviest_preference_index;

/// Drops preferred node-affinity terms from pods that already failed to
/// schedule.
///
/// A pod annotated with `N` failed attempts loses its `N` heaviest
/// preferred terms; the first declared term goes first among equal
/// weights. Required terms and node selectors are never touched, and
/// terms are only ever removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preferences;

impl Preferences {
    pub fn new() -> Self {
        Self
    }

    pub fn relax(&self, pods: &mut [Pod]) {
        for pod in pods {
            relax_pod(pod);
        }
    }
}

fn failed_attempts(pod: &Pod) -> usize {
    let Some(raw) = pod.annotation(SCHEDULING_ATTEMPTS_ANNOTATION) else {
        return 0;
    };
    match raw.trim().parse() {
        Ok(attempts) => attempts,
        Err(_) => {
            debug!(
                pod = %pod.metadata.name,
                namespace = %pod.metadata.namespace,
                value = %raw,
                "ignoring malformed scheduling attempts annotation"
            );
            0
        }
    }
}

fn relax_pod(pod: &mut Pod) {
    let attempts = failed_attempts(pod);
    if attempts == 0 {
        return;
    }
    let Some(affinity) = pod
        .spec
        .affinity
        .as_mut()
        .and_then(|a| a.node_affinity.as_mut())
    else {
        return;
    };
    let terms = &mut affinity.preferred_during_scheduling_ignored_during_execution;
    for _ in 0..attempts {
        let Some(index) = heaviest_preference_index(terms) else {
            break;
        };
        let removed = terms.remove(index);
        debug!(
            pod = %pod.metadata.name,
            namespace = %pod.metadata.namespace,
            weight = removed.weight,
            expressions = ?removed.preference.match_expressions,
            "relaxed preferred node affinity"
        );
    }
}
