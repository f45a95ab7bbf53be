//! provisio-scheduling: decides how unschedulable pods are batched onto
//! newly launched nodes.
//!
//! Given a provisioner's launch constraints and the pods that do not fit
//! on existing nodes, [`Scheduler::solve`] returns [`Schedule`]s: groups of
//! pods whose effective constraints are equivalent, each with the daemon
//! pods a node launched for it would also run.
//!
//! # Components
//!
//! - **`affinity`**: node-affinity requirement algebra and label domains
//! - **`constraints`**: per-pod constraint derivation, validation and the
//!   canonical grouping key
//! - **`preferences`**: relaxation of soft affinity for failing pods
//! - **`topology`**: topology spread turned into node selector values
//! - **`daemons`**: daemon overhead prediction
//! - **`hooks`**: provider extension points
//! - **`scheduler`**: the solve pipeline

pub mod affinity;
pub mod constraints;
pub mod daemons;
pub mod error;
pub mod hooks;
pub mod preferences;
pub mod scheduler;
pub mod taints;
pub mod topology;

pub use affinity::NodeAffinity;
pub use constraints::{canonical_key, derive_constraints, validate_pod};
pub use daemons::{daemon_will_schedule, daemons_for};
pub use error::{ConstraintsError, SchedulerError, SchedulerResult};
pub use hooks::{ConstraintHooks, HooksHandle, NoopHooks};
pub use preferences::Preferences;
pub use scheduler::{Schedule, Scheduler};
pub use topology::{Topology, TopologyGroup};
