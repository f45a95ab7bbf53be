//! Provisioner and scheduler configuration, read from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constraints::Constraints;
use crate::error::{ConfigError, ConfigResult};
use crate::labels;

/// A named launch policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Provisioner {
    pub name: String,
    #[serde(default)]
    pub spec: ProvisionerSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProvisionerSpec {
    #[serde(default)]
    pub constraints: Constraints,
}

impl Provisioner {
    pub fn new(name: &str, constraints: Constraints) -> Self {
        Self {
            name: name.to_string(),
            spec: ProvisionerSpec { constraints },
        }
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Candidate values the cloud provider offers for each well-known label.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WellKnownValues {
    pub zones: Vec<String>,
    pub instance_types: Vec<String>,
    pub architectures: Vec<String>,
    pub operating_systems: Vec<String>,
}

impl WellKnownValues {
    /// Values offered for a well-known label key; empty if unknown.
    pub fn for_key(&self, key: &str) -> &[String] {
        match key {
            labels::LABEL_TOPOLOGY_ZONE => &self.zones,
            labels::LABEL_INSTANCE_TYPE => &self.instance_types,
            labels::LABEL_ARCH => &self.architectures,
            labels::LABEL_OS => &self.operating_systems,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound for one solve call, e.g. "30s" or "2m".
    #[serde(default)]
    pub solve_timeout: Option<String>,
    #[serde(default)]
    pub well_known: WellKnownValues,
    /// Enumerated capacity types a constraint may name.
    #[serde(default = "default_capacity_types")]
    pub capacity_types: Vec<String>,
}

fn default_capacity_types() -> Vec<String> {
    vec![
        labels::CAPACITY_TYPE_SPOT.to_string(),
        labels::CAPACITY_TYPE_ON_DEMAND.to_string(),
    ]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            solve_timeout: None,
            well_known: WellKnownValues::default(),
            capacity_types: default_capacity_types(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        // Surface a malformed timeout at load time rather than per solve.
        config.solve_timeout()?;
        Ok(config)
    }

    pub fn solve_timeout(&self) -> ConfigResult<Option<Duration>> {
        self.solve_timeout.as_deref().map(parse_duration).transpose()
    }
}

/// Parse a duration string like "30s", "5m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());
    let secs = if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().map_err(|_| invalid())?
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().map_err(|_| invalid())? * 60
    } else {
        s.parse::<u64>().map_err(|_| invalid())?
    };
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_provisioner_toml() {
        let toml_str = r#"
name = "default"

[spec.constraints]
zones = ["us-west-2a", "us-west-2b"]
capacityTypes = ["spot"]

[spec.constraints.labels]
team = "ml"

[[spec.constraints.taints]]
key = "dedicated"
value = "ml"
effect = "NoSchedule"

[spec.constraints.provider]
instanceProfile = "node-role"

[spec.constraints.provider.subnetSelector]
"kubernetes.io/cluster/test" = "*"
"#;
        let provisioner = Provisioner::from_toml_str(toml_str).unwrap();
        let c = &provisioner.spec.constraints;
        assert_eq!(provisioner.name, "default");
        assert_eq!(c.zones, vec!["us-west-2a", "us-west-2b"]);
        assert_eq!(c.labels.get("team"), Some(&"ml".to_string()));
        assert_eq!(c.taints.len(), 1);
        assert_eq!(c.provider.instance_profile, "node-role");
        assert!(c.provider.subnet_selector.is_some());
        assert!(c.provider.security_group_selector.is_none());
    }

    #[test]
    fn provisioner_survives_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisioner.toml");

        let mut constraints = Constraints::default();
        constraints.zones = vec!["zone-1".to_string()];
        let provisioner = Provisioner::new("batch", constraints);
        std::fs::write(&path, provisioner.to_toml_string().unwrap()).unwrap();

        let loaded = Provisioner::from_file(&path).unwrap();
        assert_eq!(loaded, provisioner);
    }

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config.capacity_types, vec!["spot", "on-demand"]);
        assert_eq!(config.solve_timeout().unwrap(), None);
        assert!(config.well_known.zones.is_empty());
    }

    #[test]
    fn scheduler_config_full() {
        let config = SchedulerConfig::from_toml_str(
            r#"
solve_timeout = "2m"
capacity_types = ["on-demand"]

[well_known]
zones = ["a", "b", "c"]
architectures = ["amd64", "arm64"]
"#,
        )
        .unwrap();
        assert_eq!(config.solve_timeout().unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(config.well_known.for_key(labels::LABEL_TOPOLOGY_ZONE), ["a", "b", "c"]);
        assert_eq!(config.well_known.for_key(labels::LABEL_ARCH).len(), 2);
        assert!(config.well_known.for_key("unknown").is_empty());
    }

    #[test]
    fn malformed_timeout_is_rejected_at_load() {
        let err = SchedulerConfig::from_toml_str(r#"solve_timeout = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Duration(_)));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("invalid").is_err());
    }
}
