//! Scheduler error types.

use std::time::Duration;

use provisio_core::{ConfigError, FieldError, NodeSelectorOperator, Taint};
use provisio_state::StateError;
use thiserror::Error;

/// Errors that abort a whole solve call.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("applying constraints: {0}")]
    Constrain(#[from] anyhow::Error),

    #[error("injecting topology: {0}")]
    Topology(#[source] StateError),

    #[error("computing node overhead: {0}")]
    Daemons(#[source] StateError),

    #[error("hashing constraints: {0}")]
    Hashing(#[source] serde_json::Error),

    #[error("solve exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Reasons a single pod's constraints cannot be derived.
///
/// These never abort a solve: the pod is dropped from the batch.
#[derive(Debug, Error)]
pub enum ConstraintsError {
    #[error("pod does not tolerate taints [{}]", display_taints(.0))]
    Untolerated(Vec<Taint>),

    #[error("node affinity operator {operator:?} on {key} is not supported")]
    UnsupportedOperator {
        key: String,
        operator: NodeSelectorOperator,
    },

    #[error("topology key {0} is not supported")]
    UnsupportedTopologyKey(String),

    #[error("too constrained: no feasible values remain for {key}")]
    TooConstrained { key: String },

    #[error("malformed annotation {key}: {source}")]
    Annotation {
        key: String,
        source: serde_json::Error,
    },

    #[error("invalid constraints: {0}")]
    Invalid(#[from] FieldError),
}

fn display_taints(taints: &[Taint]) -> String {
    taints
        .iter()
        .map(Taint::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
