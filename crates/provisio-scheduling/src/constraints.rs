//! Per-pod constraint derivation and the canonical grouping key.
//!
//! A pod's effective constraints start from the provisioner's, get
//! tightened by the pod's node selector and node affinity, pick up taints
//! for its tolerations and any provider overrides it carries in
//! annotations, and are finally validated. Any failure rejects only that
//! pod.

use std::collections::BTreeMap;

use provisio_core::labels::{
    CAPACITY_TYPE_ANNOTATION, CAPACITY_TYPE_LABEL, INSTANCE_PROFILE_ANNOTATION, LABEL_ARCH,
    LABEL_INSTANCE_TYPE, LABEL_OS, LABEL_TOPOLOGY_ZONE, SECURITY_GROUP_SELECTOR_ANNOTATION,
    SUBNET_SELECTOR_ANNOTATION, SUPPORTED_TOPOLOGY_KEYS, is_well_known,
};
use provisio_core::{
    Constraints, FieldError, NodeSelectorOperator, NodeSelectorRequirement, Pod, SchedulerConfig,
};

use crate::affinity::NodeAffinity;
use crate::error::ConstraintsError;
use crate::hooks::ConstraintHooks;
use crate::taints::{taints_for_tolerations, untolerated};

/// Reject pods no node launched under `base` could ever host.
pub fn validate_pod(base: &Constraints, pod: &Pod) -> Result<(), ConstraintsError> {
    let missing = untolerated(&base.taints, &pod.spec.tolerations);
    if !missing.is_empty() {
        return Err(ConstraintsError::Untolerated(missing));
    }
    if let Some(requirement) = affinity_requirements(pod).find(|r| {
        !matches!(
            r.operator,
            NodeSelectorOperator::In | NodeSelectorOperator::NotIn
        )
    }) {
        return Err(ConstraintsError::UnsupportedOperator {
            key: requirement.key.clone(),
            operator: requirement.operator,
        });
    }
    if let Some(spread) = pod
        .spec
        .topology_spread_constraints
        .iter()
        .find(|c| !SUPPORTED_TOPOLOGY_KEYS.contains(&c.topology_key.as_str()))
    {
        return Err(ConstraintsError::UnsupportedTopologyKey(
            spread.topology_key.clone(),
        ));
    }
    Ok(())
}

/// Every node-affinity expression the pod declares, across all terms.
fn affinity_requirements(pod: &Pod) -> impl Iterator<Item = &NodeSelectorRequirement> {
    let affinity = pod.spec.node_affinity();
    let required = affinity
        .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
        .into_iter()
        .flat_map(|r| r.node_selector_terms.iter())
        .flat_map(|t| t.match_expressions.iter());
    let preferred = affinity
        .into_iter()
        .flat_map(|a| a.preferred_during_scheduling_ignored_during_execution.iter())
        .flat_map(|t| t.preference.match_expressions.iter());
    required.chain(preferred)
}

/// Effective constraints for `pod` under the provisioner's `base`.
pub fn derive_constraints(
    base: &Constraints,
    pod: &Pod,
    hooks: &dyn ConstraintHooks,
    config: &SchedulerConfig,
) -> Result<Constraints, ConstraintsError> {
    validate_pod(base, pod)?;

    let affinity = NodeAffinity::for_pod(pod);
    let offered = &config.well_known;
    let mut constraints = base.clone();

    constraints.labels = derive_labels(&affinity, &base.labels)?;
    constraints.zones = tighten(
        &affinity,
        LABEL_TOPOLOGY_ZONE,
        &base.zones,
        offered.for_key(LABEL_TOPOLOGY_ZONE),
    )?;
    constraints.instance_types = tighten(
        &affinity,
        LABEL_INSTANCE_TYPE,
        &base.instance_types,
        offered.for_key(LABEL_INSTANCE_TYPE),
    )?;
    constraints.architectures = tighten(
        &affinity,
        LABEL_ARCH,
        &base.architectures,
        offered.for_key(LABEL_ARCH),
    )?;
    constraints.operating_systems = tighten(
        &affinity,
        LABEL_OS,
        &base.operating_systems,
        offered.for_key(LABEL_OS),
    )?;

    // Unknown capacity types are left for validation to report.
    let capacity_types = match pod.annotation(CAPACITY_TYPE_ANNOTATION) {
        Some(raw) => split_list(raw),
        None => base.capacity_types.clone(),
    };
    constraints.capacity_types = tighten(&affinity, CAPACITY_TYPE_LABEL, &capacity_types, &[])?;

    for taint in taints_for_tolerations(&pod.spec.tolerations) {
        if !constraints.taints.contains(&taint) {
            constraints.taints.push(taint);
        }
    }

    apply_provider_overrides(&mut constraints, pod)?;
    constraints.requirements = affinity.into_requirements();

    hooks.apply_defaults(&mut constraints);
    FieldError::default()
        .also_result(constraints.validate(&config.capacity_types))
        .also_result(hooks.validate(&constraints))
        .into_result()?;

    Ok(constraints)
}

/// Provisioner labels plus every non-well-known key the pod pins to a
/// single value.
fn derive_labels(
    affinity: &NodeAffinity,
    base: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ConstraintsError> {
    let mut labels = base.clone();
    for key in affinity.label_keys() {
        if is_well_known(key) {
            continue;
        }
        let current: Vec<String> = base.get(key).cloned().into_iter().collect();
        let Some(values) = affinity.feasible_values(key, &[current.as_slice()]) else {
            continue;
        };
        match values.as_slice() {
            [] => {
                return Err(ConstraintsError::TooConstrained {
                    key: key.to_string(),
                });
            }
            [value] => {
                labels.insert(key.to_string(), value.clone());
            }
            _ => {}
        }
    }
    Ok(labels)
}

/// Narrow `current` (empty = unconstrained) by the pod's requirements on
/// `key`, bounded by the values the provider offers.
fn tighten(
    affinity: &NodeAffinity,
    key: &str,
    current: &[String],
    offered: &[String],
) -> Result<Vec<String>, ConstraintsError> {
    if !affinity.constrains(key) {
        return Ok(current.to_vec());
    }
    match affinity.feasible_values(key, &[current, offered]) {
        None => Ok(current.to_vec()),
        Some(values) if values.is_empty() => Err(ConstraintsError::TooConstrained {
            key: key.to_string(),
        }),
        Some(values) => Ok(values),
    }
}

fn apply_provider_overrides(
    constraints: &mut Constraints,
    pod: &Pod,
) -> Result<(), ConstraintsError> {
    if let Some(profile) = pod.annotation(INSTANCE_PROFILE_ANNOTATION) {
        constraints.provider.instance_profile = profile.to_string();
    }
    if let Some(selector) = selector_annotation(pod, SUBNET_SELECTOR_ANNOTATION)? {
        constraints.provider.subnet_selector = Some(selector);
    }
    if let Some(selector) = selector_annotation(pod, SECURITY_GROUP_SELECTOR_ANNOTATION)? {
        constraints.provider.security_group_selector = Some(selector);
    }
    Ok(())
}

fn selector_annotation(
    pod: &Pod,
    key: &str,
) -> Result<Option<BTreeMap<String, String>>, ConstraintsError> {
    pod.annotation(key)
        .map(|raw| {
            serde_json::from_str(raw).map_err(|source| ConstraintsError::Annotation {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Grouping key for a constraint set.
///
/// Every set-valued field is sorted and deduplicated first, so two
/// constraint sets holding the same elements in a different order produce
/// the same key.
pub fn canonical_key(constraints: &Constraints) -> serde_json::Result<String> {
    let mut normalized = constraints.clone();
    for set in [
        &mut normalized.zones,
        &mut normalized.instance_types,
        &mut normalized.architectures,
        &mut normalized.operating_systems,
        &mut normalized.capacity_types,
    ] {
        set.sort();
        set.dedup();
    }
    normalized.taints.sort();
    normalized.taints.dedup();
    for requirement in &mut normalized.requirements {
        requirement.values.sort();
        requirement.values.dedup();
    }
    normalized.requirements.sort();
    normalized.requirements.dedup();
    serde_json::to_string(&normalized)
}
