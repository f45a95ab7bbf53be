//! Taint toleration checks.

use provisio_core::{Taint, TaintEffect, Toleration, TolerationOperator};

/// Taints not covered by any of `tolerations`.
pub fn untolerated(taints: &[Taint], tolerations: &[Toleration]) -> Vec<Taint> {
    taints
        .iter()
        .filter(|taint| !tolerations.iter().any(|t| t.tolerates(taint)))
        .cloned()
        .collect()
}

/// Taints a node must carry so that only pods with these tolerations land
/// on it.
///
/// Only `Equal` tolerations with a key produce taints. An unset effect
/// expands to both `NoSchedule` and `NoExecute`.
pub fn taints_for_tolerations(tolerations: &[Toleration]) -> Vec<Taint> {
    let mut taints = Vec::new();
    for toleration in tolerations {
        if toleration.operator != TolerationOperator::Equal || toleration.key.is_empty() {
            continue;
        }
        let effects = match toleration.effect {
            Some(effect) => vec![effect],
            None => vec![TaintEffect::NoSchedule, TaintEffect::NoExecute],
        };
        for effect in effects {
            let taint = Taint {
                key: toleration.key.clone(),
                value: toleration.value.clone(),
                effect,
            };
            if !taints.contains(&taint) {
                taints.push(taint);
            }
        }
    }
    taints
}
