//! Launch constraints: what a newly provisioned node must look like.
//!
//! A provisioner declares one [`Constraints`] value; the scheduler derives
//! a tightened copy per pod. Vector fields are sets: order carries no
//! meaning and equivalence is decided after normalisation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{NodeSelectorRequirement, Taint};
use crate::validation::FieldError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    /// Labels applied to the node.
    pub labels: BTreeMap<String, String>,
    /// Taints applied to the node.
    pub taints: Vec<Taint>,
    /// Candidate zones. Empty means unconstrained.
    pub zones: Vec<String>,
    pub instance_types: Vec<String>,
    pub architectures: Vec<String>,
    pub operating_systems: Vec<String>,
    pub capacity_types: Vec<String>,
    /// Node-affinity clauses contributed by the pod this copy was derived for.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<NodeSelectorRequirement>,
    pub provider: ProviderConstraints,
}

/// Cloud-provider specific launch parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConstraints {
    pub instance_profile: String,
    pub subnet_selector: Option<BTreeMap<String, String>>,
    pub security_group_selector: Option<BTreeMap<String, String>>,
    pub cluster: Option<Cluster>,
}

/// Identity of the cluster new nodes join.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    pub name: String,
    pub endpoint: String,
}

impl Constraints {
    /// Validate against the enumerated set of capacity types the provider
    /// offers. Every violation is reported, not only the first.
    pub fn validate(&self, known_capacity_types: &[String]) -> Result<(), FieldError> {
        FieldError::default()
            .also(self.validate_capacity_types(known_capacity_types))
            .also(self.provider.validate().via_field("provider"))
            .into_result()
    }

    fn validate_capacity_types(&self, known: &[String]) -> FieldError {
        self.capacity_types
            .iter()
            .enumerate()
            .filter(|(_, ct)| !known.contains(ct))
            .fold(FieldError::default(), |errs, (i, ct)| {
                errs.also(FieldError::invalid_value(
                    format!("{ct} not in {known:?}"),
                    &format!("capacityTypes[{i}]"),
                ))
            })
    }
}

impl ProviderConstraints {
    fn validate(&self) -> FieldError {
        let mut errs = FieldError::default();
        if self.instance_profile.is_empty() {
            errs = errs.also(FieldError::missing_field("instanceProfile"));
        }
        errs = errs
            .also(validate_selector(self.subnet_selector.as_ref(), "subnetSelector"))
            .also(validate_selector(
                self.security_group_selector.as_ref(),
                "securityGroupSelector",
            ));
        if let Some(cluster) = &self.cluster {
            errs = errs.also(cluster.validate().via_field("cluster"));
        }
        errs
    }
}

fn validate_selector(selector: Option<&BTreeMap<String, String>>, field: &str) -> FieldError {
    let Some(selector) = selector else {
        return FieldError::missing_field(field);
    };
    selector
        .iter()
        .filter(|(key, value)| key.is_empty() || value.is_empty())
        .fold(FieldError::default(), |errs, (key, _)| {
            errs.also(FieldError::invalid_value("\"\"", &format!("{field}['{key}']")))
        })
}

impl Cluster {
    fn validate(&self) -> FieldError {
        let mut errs = FieldError::default();
        if self.name.is_empty() {
            errs = errs.also(FieldError::missing_field("name"));
        }
        if self.endpoint.is_empty() {
            errs = errs.also(FieldError::missing_field("endpoint"));
        } else if !is_absolute_url(&self.endpoint) {
            errs = errs.also(FieldError::invalid_value(
                format!("{} not a valid URL", self.endpoint),
                "endpoint",
            ));
        }
        errs
    }
}

/// An absolute URL: has a scheme and a non-empty host.
fn is_absolute_url(raw: &str) -> bool {
    match raw.parse::<http::Uri>() {
        Ok(uri) => uri.scheme().is_some() && uri.host().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["spot".to_string(), "on-demand".to_string()]
    }

    fn selector(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn valid() -> Constraints {
        Constraints {
            capacity_types: vec!["spot".to_string()],
            provider: ProviderConstraints {
                instance_profile: "node-role".to_string(),
                subnet_selector: selector(&[("kubernetes.io/cluster/test", "*")]),
                security_group_selector: selector(&[("kubernetes.io/cluster/test", "*")]),
                cluster: Some(Cluster {
                    name: "test".to_string(),
                    endpoint: "https://api.test.example.com".to_string(),
                }),
                ..ProviderConstraints::default()
            },
            ..Constraints::default()
        }
    }

    #[test]
    fn valid_constraints_pass() {
        assert!(valid().validate(&known()).is_ok());
    }

    #[test]
    fn missing_instance_profile() {
        let mut c = valid();
        c.provider.instance_profile.clear();
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(errs.paths(), vec!["provider.instanceProfile"]);
    }

    #[test]
    fn unknown_capacity_type() {
        let mut c = valid();
        c.capacity_types.push("reserved".to_string());
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(errs.paths(), vec!["capacityTypes[1]"]);
    }

    #[test]
    fn nil_selectors_are_missing() {
        let mut c = valid();
        c.provider.subnet_selector = None;
        c.provider.security_group_selector = None;
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(
            errs.paths(),
            vec!["provider.subnetSelector", "provider.securityGroupSelector"]
        );
    }

    #[test]
    fn empty_selector_values_are_invalid() {
        let mut c = valid();
        c.provider.subnet_selector = selector(&[("Name", ""), ("tier", "private")]);
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(errs.paths(), vec!["provider.subnetSelector['Name']"]);
    }

    #[test]
    fn cluster_endpoint_must_be_absolute() {
        let mut c = valid();
        c.provider.cluster = Some(Cluster {
            name: "test".to_string(),
            endpoint: "api.test.example.com/path".to_string(),
        });
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(errs.paths(), vec!["provider.cluster.endpoint"]);
    }

    #[test]
    fn cluster_is_optional() {
        let mut c = valid();
        c.provider.cluster = None;
        assert!(c.validate(&known()).is_ok());
    }

    #[test]
    fn all_violations_are_reported() {
        let c = Constraints {
            capacity_types: vec!["bogus".to_string()],
            provider: ProviderConstraints {
                cluster: Some(Cluster::default()),
                ..ProviderConstraints::default()
            },
            ..Constraints::default()
        };
        let errs = c.validate(&known()).unwrap_err();
        assert_eq!(
            errs.paths(),
            vec![
                "capacityTypes[0]",
                "provider.instanceProfile",
                "provider.subnetSelector",
                "provider.securityGroupSelector",
                "provider.cluster.name",
                "provider.cluster.endpoint",
            ]
        );
    }
}
