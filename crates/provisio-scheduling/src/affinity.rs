//! Node-affinity requirement algebra.
//!
//! A pod's node selector and node affinity collapse into a flat list of
//! requirements. Candidate label domains are then narrowed against that
//! list: intersect the supplied domains, keep what every `In` allows,
//! drop what any `NotIn` names.

use std::collections::BTreeSet;

use provisio_core::{NodeSelectorOperator, NodeSelectorRequirement, Pod, PreferredSchedulingTerm};

/// Flattened node-affinity requirements of one or more pods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAffinity(Vec<NodeSelectorRequirement>);

impl NodeAffinity {
    /// Requirements of a single pod.
    pub fn for_pod(pod: &Pod) -> Self {
        Self::for_pods([pod])
    }

    /// Requirements of every given pod, concatenated.
    ///
    /// Per pod: each node selector entry becomes a single-valued `In`, the
    /// heaviest preferred term contributes its expressions, and only the
    /// first required term is modelled.
    pub fn for_pods<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> Self {
        let mut requirements = Vec::new();
        for pod in pods {
            for (key, value) in &pod.spec.node_selector {
                requirements.push(NodeSelectorRequirement {
                    key: key.clone(),
                    operator: NodeSelectorOperator::In,
                    values: vec![value.clone()],
                });
            }
            let Some(affinity) = pod.spec.node_affinity() else {
                continue;
            };
            if let Some(term) =
                heaviest_preference(&affinity.preferred_during_scheduling_ignored_during_execution)
            {
                requirements.extend(term.preference.match_expressions.iter().cloned());
            }
            if let Some(term) = affinity
                .required_during_scheduling_ignored_during_execution
                .as_ref()
                .and_then(|required| required.node_selector_terms.first())
            {
                requirements.extend(term.match_expressions.iter().cloned());
            }
        }
        Self(requirements)
    }

    pub fn requirements(&self) -> &[NodeSelectorRequirement] {
        &self.0
    }

    pub fn into_requirements(self) -> Vec<NodeSelectorRequirement> {
        self.0
    }

    /// Distinct keys named by any requirement.
    pub fn label_keys(&self) -> BTreeSet<&str> {
        self.0.iter().map(|r| r.key.as_str()).collect()
    }

    /// Whether any requirement names `key`.
    pub fn constrains(&self, key: &str) -> bool {
        self.0.iter().any(|r| r.key == key)
    }

    /// Values of the first `In` requirement on `key`.
    pub fn first_in_values(&self, key: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|r| r.key == key && r.operator == NodeSelectorOperator::In)
            .map(|r| r.values.as_slice())
    }

    /// Candidate values for `key`.
    ///
    /// Starts from the intersection of `domains` (in the order of the first
    /// domain, duplicates removed), then applies every `In` and `NotIn`
    /// requirement on `key`. No domains means no candidates.
    pub fn label_values(&self, key: &str, domains: &[&[String]]) -> Vec<String> {
        let Some((first, rest)) = domains.split_first() else {
            return Vec::new();
        };
        let mut values: Vec<String> = Vec::with_capacity(first.len());
        for value in first.iter() {
            if !values.contains(value) && rest.iter().all(|domain| domain.contains(value)) {
                values.push(value.clone());
            }
        }
        for requirement in self.0.iter().filter(|r| r.key == key) {
            match requirement.operator {
                NodeSelectorOperator::In => values.retain(|v| requirement.values.contains(v)),
                NodeSelectorOperator::NotIn => values.retain(|v| !requirement.values.contains(v)),
                _ => {}
            }
        }
        values
    }

    /// Feasible values for `key` given a set of candidate domains, where an
    /// empty domain means "unconstrained".
    ///
    /// Returns `None` when nothing bounds the key at all: every domain is
    /// empty and no `In` requirement names it. Otherwise the result may be
    /// empty, which means the requirements cannot be met.
    pub fn feasible_values(&self, key: &str, domains: &[&[String]]) -> Option<Vec<String>> {
        let bounded: Vec<&[String]> = domains.iter().copied().filter(|d| !d.is_empty()).collect();
        if !bounded.is_empty() {
            return Some(self.label_values(key, &bounded));
        }
        let seed = self.first_in_values(key)?;
        Some(self.label_values(key, &[seed]))
    }
}

/// Index of the preferred term with the highest weight. The first declared
/// term wins a tie.
pub fn heaviest_preference_index(terms: &[PreferredSchedulingTerm]) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (i, term) in terms.iter().enumerate() {
        if best.is_none_or(|(_, weight)| term.weight > weight) {
            best = Some((i, term.weight));
        }
    }
    best.map(|(i, _)| i)
}

pub fn heaviest_preference(terms: &[PreferredSchedulingTerm]) -> Option<&PreferredSchedulingTerm> {
    heaviest_preference_index(terms).map(|i| &terms[i])
}
