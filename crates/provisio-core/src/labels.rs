//! Well-known label, annotation and taint keys.

pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";
pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_OS: &str = "kubernetes.io/os";

/// Purchasing class of the node's capacity.
pub const CAPACITY_TYPE_LABEL: &str = "provisio.dev/capacity-type";

pub const CAPACITY_TYPE_SPOT: &str = "spot";
pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";

/// Pod annotation: comma-separated capacity types the pod accepts.
pub const CAPACITY_TYPE_ANNOTATION: &str = "provisio.dev/capacity-type";

/// Pod annotation: instance profile override.
pub const INSTANCE_PROFILE_ANNOTATION: &str = "provisio.dev/instance-profile";

/// Pod annotation: JSON object replacing the subnet selector.
pub const SUBNET_SELECTOR_ANNOTATION: &str = "provisio.dev/subnet-selector";

/// Pod annotation: JSON object replacing the security group selector.
pub const SECURITY_GROUP_SELECTOR_ANNOTATION: &str = "provisio.dev/security-group-selector";

/// Pod annotation: number of scheduling attempts that already failed.
pub const SCHEDULING_ATTEMPTS_ANNOTATION: &str = "provisio.dev/scheduling-attempts";

/// Label keys whose candidate values are tracked in dedicated
/// [`Constraints`](crate::Constraints) fields rather than in its label map.
pub const WELL_KNOWN_LABELS: &[&str] = &[
    LABEL_TOPOLOGY_ZONE,
    LABEL_INSTANCE_TYPE,
    LABEL_ARCH,
    LABEL_OS,
    CAPACITY_TYPE_LABEL,
];

/// Topology keys a spread constraint may use.
pub const SUPPORTED_TOPOLOGY_KEYS: &[&str] = &[LABEL_HOSTNAME, LABEL_TOPOLOGY_ZONE];

pub fn is_well_known(key: &str) -> bool {
    WELL_KNOWN_LABELS.contains(&key)
}
