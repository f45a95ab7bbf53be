//! Prometheus-backed metrics sink and text exposition.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};

use crate::error::MetricsResult;
use crate::sink::{MetricsSink, SolveOutcome};

const NAMESPACE: &str = "provisio";
const SUBSYSTEM: &str = "allocation_controller";

/// Records solve durations into a histogram keyed by provisioner and result.
///
/// ## Metrics
/// - `provisio_allocation_controller_scheduling_duration_seconds{provisioner, result}`
#[derive(Clone)]
pub struct PrometheusMetrics {
    scheduling_duration: HistogramVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create the sink and register its collectors with `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> MetricsResult<Self> {
        let scheduling_duration = HistogramVec::new(
            HistogramOpts::new(
                "scheduling_duration_seconds",
                "Duration of scheduling process in seconds. Broken down by provisioner and result.",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM)
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 17)?),
            &["provisioner", "result"],
        )?;
        registry.register(Box::new(scheduling_duration.clone()))?;

        Ok(Self {
            scheduling_duration,
            registry,
        })
    }

    /// Create the sink with its own registry.
    pub fn new() -> MetricsResult<Self> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_solve(
        &self,
        provisioner: &str,
        outcome: SolveOutcome,
        duration: Duration,
    ) -> MetricsResult<()> {
        let observer = self
            .scheduling_duration
            .get_metric_with_label_values(&[provisioner, outcome.as_label()])?;
        observer.observe(duration.as_secs_f64());
        Ok(())
    }
}

/// Render every metric in the sink's registry in Prometheus text format.
pub fn render_prometheus(metrics: &PrometheusMetrics) -> MetricsResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
