//! Control loop scheduler.
//!
//! Fires a cycle every `interval`. Each cycle enumerates targets through
//! the capacity API, syncs the registry, then feeds every target into a
//! fixed-size worker pool over a channel. Workers run the per-target
//! pipeline under the target's lock:
//!
//! ```text
//! reconcile current ─► sample ─► decide ─► admit ─► (apply ─► commit)
//! ```
//!
//! Every stage failure is caught at the target boundary and turned into a
//! failed [`TargetEvaluation`]; only a `ListTargets` failure skips a whole
//! cycle, and no cycle failure ever ends the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::AutoscaleConfig;
use crate::deadline::Deadline;
use crate::decision::DecisionEngine;
use crate::error::{AutoscaleError, AutoscaleResult, CapacityOp};
use crate::events::{CycleReport, CycleSummary, TargetEvaluation};
use crate::executor::ScalingExecutor;
use crate::registry::{Target, TargetHandle, TargetRegistry};
use crate::sampler::Sampler;
use crate::source::{CapacityApi, MetricsSource};
use crate::stabilization::StabilizationFilter;
use crate::types::{TargetId, epoch_secs};

/// Shared handle to the most recent cycle report.
#[derive(Clone, Default)]
pub struct ControllerStatus {
    latest: Arc<RwLock<Option<CycleReport>>>,
}

impl ControllerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Option<CycleReport> {
        self.latest.read().await.clone()
    }

    pub async fn publish(&self, report: CycleReport) {
        *self.latest.write().await = Some(report);
    }
}

/// The per-target pipeline, shared by every worker task.
struct Pipeline {
    capacity: Arc<dyn CapacityApi>,
    sampler: Sampler,
    engine: DecisionEngine,
    filter: StabilizationFilter,
    executor: ScalingExecutor,
    call_timeout: Duration,
}

impl Pipeline {
    /// Evaluate one target, bounded as a whole by `deadline`.
    async fn evaluate(&self, id: TargetId, handle: TargetHandle, deadline: Deadline) -> TargetEvaluation {
        let started = Instant::now();

        let mut eval = match tokio::time::timeout_at(deadline.instant(), handle.lock()).await {
            Err(_) => TargetEvaluation::failed(&id, None, &AutoscaleError::CycleTimeout(id.clone())),
            Ok(mut target) => {
                let result =
                    tokio::time::timeout_at(deadline.instant(), self.run(&mut target, deadline))
                        .await;
                match result {
                    Ok(eval) => eval,
                    Err(_) => TargetEvaluation::failed(
                        &id,
                        target.current_replicas,
                        &AutoscaleError::CycleTimeout(id.clone()),
                    ),
                }
            }
        };

        eval.duration_ms = started.elapsed().as_millis() as u64;
        eval.emit();
        eval
    }

    async fn run(&self, target: &mut Target, deadline: Deadline) -> TargetEvaluation {
        let id = target.id().clone();

        let current = match self.read_replicas(&id, deadline).await {
            Ok(current) => current,
            Err(e) => return TargetEvaluation::failed(&id, target.current_replicas, &e),
        };
        target.current_replicas = Some(current);

        let samples = self.sampler.sample(&target.descriptor, deadline).await;
        let metric_failures: Vec<String> = samples.failures.iter().map(ToString::to_string).collect();
        if samples.deadline_hit || deadline.is_expired() {
            return TargetEvaluation::failed(&id, Some(current), &AutoscaleError::CycleTimeout(id.clone()))
                .with_metric_failures(metric_failures);
        }

        let now = Instant::now();
        let decision = match self
            .engine
            .decide(&target.descriptor, current, &samples.samples, now)
        {
            Ok(decision) => decision,
            Err(e) => {
                return TargetEvaluation::failed(&id, Some(current), &e).with_metric_failures(metric_failures);
            }
        };

        let admission = self
            .filter
            .admit(&target.descriptor, &mut target.scale_state, &decision, now);
        debug!(
            target_id = %id,
            desired = decision.desired_replicas,
            approved = admission.approved,
            verdict = ?admission.verdict,
            "decision admitted"
        );

        let mut eval = TargetEvaluation::decided(&decision, &admission, metric_failures);
        if !admission.requires_action(current) {
            return eval;
        }

        match self.executor.apply(target, admission.approved, deadline).await {
            Ok(attempts) => {
                self.filter
                    .commit(&mut target.scale_state, &admission, Instant::now());
                eval.attempts = attempts;
            }
            Err(e) => eval.fail_apply(&e),
        }
        eval
    }

    /// Fresh read of the authoritative replica count.
    async fn read_replicas(&self, id: &TargetId, deadline: Deadline) -> AutoscaleResult<u32> {
        let timeout = deadline.bound(self.call_timeout);
        let unavailable = |reason: String| AutoscaleError::CapacityApiUnavailable {
            target: id.clone(),
            op: CapacityOp::Read,
            attempts: 1,
            reason,
        };

        match tokio::time::timeout(timeout, self.capacity.get_current_replicas(id)).await {
            Ok(Ok(current)) => Ok(current),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) if deadline.is_expired() => Err(AutoscaleError::CycleTimeout(id.clone())),
            Err(_) => Err(unavailable(format!(
                "get_current_replicas timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

/// Drives evaluation cycles across every registered target.
pub struct Autoscaler {
    capacity: Arc<dyn CapacityApi>,
    registry: TargetRegistry,
    pipeline: Arc<Pipeline>,
    config: AutoscaleConfig,
    status: ControllerStatus,
    cycles: AtomicU64,
}

impl Autoscaler {
    pub fn new(
        capacity: Arc<dyn CapacityApi>,
        metrics: Arc<dyn MetricsSource>,
        config: AutoscaleConfig,
    ) -> AutoscaleResult<Self> {
        config.validate()?;

        let pipeline = Pipeline {
            capacity: capacity.clone(),
            sampler: Sampler::new(metrics, config.call_timeout, config.metric_window),
            engine: DecisionEngine::new(config.tolerance),
            filter: StabilizationFilter::new(config.up_cooldown, config.down_cooldown),
            executor: ScalingExecutor::new(
                capacity.clone(),
                config.retry.clone(),
                config.call_timeout,
            ),
            call_timeout: config.call_timeout,
        };

        Ok(Self {
            capacity,
            registry: TargetRegistry::new(config.history_capacity),
            pipeline: Arc::new(pipeline),
            config,
            status: ControllerStatus::new(),
            cycles: AtomicU64::new(0),
        })
    }

    /// Status handle shared with the HTTP surface.
    pub fn status(&self) -> ControllerStatus {
        self.status.clone()
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    /// Run one evaluation cycle over every target.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = epoch_secs();
        let started = Instant::now();

        let descriptors =
            match tokio::time::timeout(self.config.call_timeout, self.capacity.list_targets())
                .await
            {
                Ok(Ok(descriptors)) => descriptors,
                Ok(Err(e)) => {
                    let err = AutoscaleError::ListTargets(e.to_string());
                    return CycleReport::skipped(cycle, started_at, elapsed_ms(started), &err);
                }
                Err(_) => {
                    let err = AutoscaleError::ListTargets(format!(
                        "timed out after {}ms",
                        self.config.call_timeout.as_millis()
                    ));
                    return CycleReport::skipped(cycle, started_at, elapsed_ms(started), &err);
                }
            };

        let sync = self.registry.sync(descriptors).await;
        let deadline = Deadline::after(self.config.cycle_timeout);
        let evaluations = self.evaluate_all(deadline).await;

        CycleReport {
            summary: CycleSummary::tally(
                cycle,
                started_at,
                elapsed_ms(started),
                &evaluations,
                sync.invalid,
            ),
            evaluations,
        }
    }

    /// Fan every registered target out to the worker pool.
    async fn evaluate_all(&self, deadline: Deadline) -> Vec<TargetEvaluation> {
        let jobs = self.registry.handles().await;
        if jobs.is_empty() {
            return Vec::new();
        }

        let workers = self.config.workers.min(jobs.len());
        let (tx, rx) = mpsc::channel::<(TargetId, TargetHandle)>(jobs.len());
        for job in jobs {
            // Capacity equals the job count, so this never fails.
            let _ = tx.try_send(job);
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let rx = rx.clone();
            let pipeline = self.pipeline.clone();
            set.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some((id, handle)) = job else { break };
                    done.push(pipeline.evaluate(id, handle, deadline).await);
                }
                done
            });
        }

        let mut evaluations = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(batch) => evaluations.extend(batch),
                Err(e) => warn!(error = %e, "evaluation worker aborted"),
            }
        }
        evaluations.sort_by(|a, b| a.target.cmp(&b.target));
        evaluations
    }

    /// Run cycles until `shutdown` flips.
    ///
    /// A cycle in flight when shutdown arrives gets `shutdown_grace` to
    /// finish; after that it is dropped, which aborts its worker tasks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            workers = self.config.workers,
            "autoscaler started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }

            let cycle = self.run_cycle();
            tokio::pin!(cycle);

            tokio::select! {
                report = &mut cycle => self.finish(report).await,
                _ = shutdown.changed() => {
                    info!(
                        grace_ms = self.config.shutdown_grace.as_millis() as u64,
                        "autoscaler shutting down, waiting for in-flight evaluations"
                    );
                    match tokio::time::timeout(self.config.shutdown_grace, &mut cycle).await {
                        Ok(report) => self.finish(report).await,
                        Err(_) => warn!("shutdown grace elapsed, abandoning in-flight evaluations"),
                    }
                    break;
                }
            }
        }
    }

    async fn finish(&self, report: CycleReport) {
        report.summary.emit();
        self.status.publish(report).await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use crate::error::SourceError;
    use crate::events::Outcome;
    use crate::source::BoxFuture;
    use crate::types::{MetricSpec, TargetDescriptor, TimeRange};

    struct Capacity {
        targets: Vec<TargetDescriptor>,
        replicas: StdMutex<HashMap<TargetId, u32>>,
    }

    impl CapacityApi for Capacity {
        fn list_targets(&self) -> BoxFuture<'_, Result<Vec<TargetDescriptor>, SourceError>> {
            Box::pin(async move { Ok(self.targets.clone()) })
        }

        fn get_current_replicas<'a>(
            &'a self,
            target: &'a TargetId,
        ) -> BoxFuture<'a, Result<u32, SourceError>> {
            Box::pin(async move {
                self.replicas
                    .lock()
                    .unwrap()
                    .get(target)
                    .copied()
                    .ok_or_else(|| SourceError::NotFound(target.clone()))
            })
        }

        fn set_replicas<'a>(
            &'a self,
            target: &'a TargetId,
            replicas: u32,
        ) -> BoxFuture<'a, Result<(), SourceError>> {
            Box::pin(async move {
                self.replicas.lock().unwrap().insert(target.clone(), replicas);
                Ok(())
            })
        }
    }

    struct Load(f64);

    impl MetricsSource for Load {
        fn query<'a>(
            &'a self,
            _target: &'a TargetId,
            _spec: &'a MetricSpec,
            _range: TimeRange,
        ) -> BoxFuture<'a, Result<f64, SourceError>> {
            let value = self.0;
            Box::pin(async move { Ok(value) })
        }
    }

    fn setup(current: u32, load: f64) -> (Arc<Capacity>, Autoscaler) {
        let capacity = Arc::new(Capacity {
            targets: vec![TargetDescriptor {
                id: "default/api".to_string(),
                min_replicas: 2,
                max_replicas: 10,
                metrics: vec![MetricSpec {
                    metric: "cpu".to_string(),
                    target_value: 50.0,
                }],
            }],
            replicas: StdMutex::new(HashMap::from([("default/api".to_string(), current)])),
        });
        let autoscaler =
            Autoscaler::new(capacity.clone(), Arc::new(Load(load)), AutoscaleConfig::default())
                .unwrap();
        (capacity, autoscaler)
    }

    #[tokio::test]
    async fn cycle_scales_overloaded_target() {
        let (capacity, autoscaler) = setup(4, 90.0);
        let report = autoscaler.run_cycle().await;

        assert_eq!(report.summary.cycle, 1);
        assert_eq!(report.summary.scaled, 1);
        let eval = report.evaluation("default/api").unwrap();
        assert_eq!(eval.approved_replicas, Some(8));
        assert_eq!(eval.outcome, Outcome::Scaled);
        assert_eq!(capacity.replicas.lock().unwrap()["default/api"], 8);
    }

    #[tokio::test]
    async fn cycle_numbers_increase() {
        let (_, autoscaler) = setup(4, 50.0);
        assert_eq!(autoscaler.run_cycle().await.summary.cycle, 1);
        assert_eq!(autoscaler.run_cycle().await.summary.cycle, 2);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let capacity = Arc::new(Capacity {
            targets: vec![],
            replicas: StdMutex::new(HashMap::new()),
        });
        let config = AutoscaleConfig {
            workers: 0,
            ..AutoscaleConfig::default()
        };
        let result = Autoscaler::new(capacity, Arc::new(Load(0.0)), config);
        assert!(matches!(result, Err(AutoscaleError::Config(_))));
    }

    #[tokio::test]
    async fn status_holds_latest_report() {
        let (_, autoscaler) = setup(4, 50.0);
        let status = autoscaler.status();
        assert!(status.latest().await.is_none());

        let report = autoscaler.run_cycle().await;
        autoscaler.finish(report).await;
        assert_eq!(status.latest().await.unwrap().summary.cycle, 1);
    }
}
