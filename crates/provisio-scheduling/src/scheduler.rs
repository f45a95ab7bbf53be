//! Scheduler: groups unschedulable pods into schedules a single launch can
//! satisfy.
//!
//! One `solve` call runs the whole pipeline:
//! - copy the provisioner's constraints and let the hooks restrict them
//! - relax soft preferences of pods that keep failing
//! - inject topology spread domains as node selectors
//! - derive each pod's constraints and group pods by canonical key
//! - attach the daemon pods each group's node would also run
//! - strip the injected hostname from the result

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use provisio_core::labels::LABEL_HOSTNAME;
use provisio_core::{Constraints, DaemonSet, Pod, Provisioner, SchedulerConfig};
use provisio_metrics::{MetricsHandle, SolveOutcome, noop_metrics};
use provisio_state::ClusterReader;
use tracing::{debug, info, warn};

use crate::constraints::{canonical_key, derive_constraints};
use crate::daemons::daemons_for;
use crate::error::{SchedulerError, SchedulerResult};
use crate::hooks::{HooksHandle, NoopHooks};
use crate::preferences::Preferences;
use crate::topology::Topology;

/// Pods that share equivalent constraints, and the daemon pods a node
/// launched for them would also run.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub constraints: Constraints,
    pub pods: Vec<Pod>,
    pub daemons: Vec<Pod>,
}

/// Stateless between calls; safe to share across reconciliation loops.
pub struct Scheduler<C> {
    cluster: C,
    config: SchedulerConfig,
    hooks: HooksHandle,
    metrics: MetricsHandle,
    preferences: Preferences,
    solve_timeout: Option<Duration>,
}

impl<C: ClusterReader> Scheduler<C> {
    /// Create a scheduler with no-op hooks and metrics.
    ///
    /// Fails if the configured solve timeout does not parse.
    pub fn new(cluster: C, config: SchedulerConfig) -> SchedulerResult<Self> {
        let solve_timeout = config.solve_timeout()?;
        Ok(Self {
            cluster,
            config,
            hooks: Arc::new(NoopHooks),
            metrics: noop_metrics(),
            preferences: Preferences::new(),
            solve_timeout,
        })
    }

    pub fn with_hooks(mut self, hooks: HooksHandle) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Override the deadline read from the config.
    pub fn with_solve_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.solve_timeout = timeout;
        self
    }

    /// Group `pods` into schedules under `provisioner`'s constraints.
    ///
    /// Pods whose constraints cannot be derived are dropped and logged. A
    /// failed cluster read, hook error, hashing error or expired deadline
    /// fails the whole call.
    pub async fn solve(
        &self,
        provisioner: &Provisioner,
        pods: Vec<Pod>,
    ) -> SchedulerResult<Vec<Schedule>> {
        let start = Instant::now();
        let pod_count = pods.len();

        let result = match self.solve_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(provisioner, pods))
                .await
                .unwrap_or(Err(SchedulerError::Timeout(limit))),
            None => self.run(provisioner, pods).await,
        };

        let duration = start.elapsed();
        let outcome = match &result {
            Ok(_) => SolveOutcome::Success,
            Err(_) => SolveOutcome::Error,
        };
        if let Err(e) = self
            .metrics
            .observe_solve(&provisioner.name, outcome, duration)
        {
            warn!(
                provisioner = %provisioner.name,
                result = outcome.as_label(),
                ?duration,
                error = %e,
                "failed to record scheduling duration"
            );
        }

        match &result {
            Ok(schedules) => info!(
                provisioner = %provisioner.name,
                pods = pod_count,
                schedules = schedules.len(),
                ?duration,
                "solved schedules"
            ),
            Err(e) => warn!(
                provisioner = %provisioner.name,
                pods = pod_count,
                error = %e,
                "solve failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        provisioner: &Provisioner,
        mut pods: Vec<Pod>,
    ) -> SchedulerResult<Vec<Schedule>> {
        let mut constraints = provisioner.spec.constraints.clone();
        self.hooks
            .constrain(&mut constraints, &pods)
            .map_err(SchedulerError::Constrain)?;

        self.preferences.relax(&mut pods);

        Topology::new(&self.cluster)
            .inject(&constraints, &self.config, &mut pods)
            .await
            .map_err(SchedulerError::Topology)?;

        let mut schedules = self.get_schedules(&constraints, pods).await?;

        // Injected hostnames only served to spread pods across schedules.
        for schedule in &mut schedules {
            schedule.constraints.labels.remove(LABEL_HOSTNAME);
            schedule
                .constraints
                .requirements
                .retain(|r| r.key != LABEL_HOSTNAME);
        }
        Ok(schedules)
    }

    /// Group pods by the canonical key of their derived constraints, in the
    /// order keys are first seen.
    async fn get_schedules(
        &self,
        constraints: &Constraints,
        pods: Vec<Pod>,
    ) -> SchedulerResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut daemon_sets: Option<Vec<DaemonSet>> = None;

        for pod in pods {
            let derived =
                match derive_constraints(constraints, &pod, self.hooks.as_ref(), &self.config) {
                    Ok(derived) => derived,
                    Err(error) => {
                        debug!(
                            pod = %pod.metadata.name,
                            namespace = %pod.metadata.namespace,
                            %error,
                            "dropping pod with unsatisfiable constraints"
                        );
                        continue;
                    }
                };
            let key = canonical_key(&derived).map_err(SchedulerError::Hashing)?;

            if let Some(&slot) = index.get(&key) {
                schedules[slot].pods.push(pod);
                continue;
            }

            if daemon_sets.is_none() {
                let listed = self
                    .cluster
                    .list_daemon_sets()
                    .await
                    .map_err(SchedulerError::Daemons)?;
                daemon_sets = Some(listed);
            }
            let daemons = daemons_for(&derived, daemon_sets.as_deref().unwrap_or_default());
            index.insert(key, schedules.len());
            schedules.push(Schedule {
                constraints: derived,
                pods: vec![pod],
                daemons,
            });
        }
        Ok(schedules)
    }
}
