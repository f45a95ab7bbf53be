//! provisio-core: shared types for the provisioning scheduler.
//!
//! Holds the cluster object model the scheduler reads (pods, nodes,
//! daemon sets), the launch [`Constraints`] a provisioner declares, the
//! accumulating [`FieldError`] tree used to report validation failures,
//! and the TOML configuration for provisioners and the scheduler itself.

pub mod config;
pub mod constraints;
pub mod error;
pub mod labels;
pub mod types;
pub mod validation;

pub use config::{Provisioner, ProvisionerSpec, SchedulerConfig, WellKnownValues, parse_duration};
pub use constraints::{Cluster, Constraints, ProviderConstraints};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
pub use validation::{FieldError, FieldViolation};
