//! Metrics sink abstraction.

use std::sync::Arc;
use std::time::Duration;

use crate::error::MetricsResult;

/// Outcome of a solve call, used as the `result` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    Success,
    Error,
}

impl SolveOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            SolveOutcome::Success => "success",
            SolveOutcome::Error => "error",
        }
    }
}

/// Receives one observation per solve call.
///
/// Implementations must be safe to call from many reconciliation loops
/// at once.
pub trait MetricsSink: Send + Sync + 'static {
    /// Record how long a solve took for `provisioner` and how it ended.
    fn observe_solve(
        &self,
        provisioner: &str,
        outcome: SolveOutcome,
        duration: Duration,
    ) -> MetricsResult<()>;
}

/// Shared handle to a metrics sink.
pub type MetricsHandle = Arc<dyn MetricsSink>;

/// Sink that drops every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    #[inline(always)]
    fn observe_solve(&self, _: &str, _: SolveOutcome, _: Duration) -> MetricsResult<()> {
        Ok(())
    }
}

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
