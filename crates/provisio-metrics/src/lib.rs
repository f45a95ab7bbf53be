//! provisio-metrics: observability for scheduling passes.
//!
//! The scheduler reports one observation per solve call (provisioner,
//! outcome, duration) to an injected [`MetricsSink`]. Recording is
//! best-effort: a sink error is logged by the caller and never fails the
//! solve.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink (trait, shared as MetricsHandle)
//!   ├── NoopMetrics        ← default; records nothing
//!   └── PrometheusMetrics  ← scheduling_duration_seconds{provisioner, result}
//!         └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod error;
pub mod recorder;
pub mod sink;

pub use error::{MetricsError, MetricsResult};
pub use recorder::{PrometheusMetrics, render_prometheus};
pub use sink::{MetricsHandle, MetricsSink, NoopMetrics, SolveOutcome, noop_metrics};
