//! Metric sampler: one bounded query per metric spec.
//!
//! Each metric is sampled independently. A failure on one metric is
//! recorded in [`SampleSet::failures`] and does not prevent the others
//! from being used.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::deadline::Deadline;
use crate::error::AutoscaleError;
use crate::source::MetricsSource;
use crate::types::{epoch_secs, MetricSample, TargetDescriptor, TimeRange};

/// Result of sampling every metric of one target.
#[derive(Debug, Default)]
pub struct SampleSet {
    pub samples: Vec<MetricSample>,
    /// One `MetricUnavailable` per metric that could not be read.
    pub failures: Vec<AutoscaleError>,
    /// Sampling stopped because the cycle deadline passed.
    pub deadline_hit: bool,
}

impl SampleSet {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub struct Sampler {
    source: Arc<dyn MetricsSource>,
    call_timeout: Duration,
    window: Duration,
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricsSource>, call_timeout: Duration, window: Duration) -> Self {
        Self {
            source,
            call_timeout,
            window,
        }
    }

    /// Query every metric spec of `target`, each bounded by the call
    /// timeout and the cycle deadline.
    pub async fn sample(&self, target: &TargetDescriptor, deadline: Deadline) -> SampleSet {
        let range = TimeRange::trailing(self.window);
        let mut set = SampleSet::default();

        for spec in &target.metrics {
            if deadline.is_expired() {
                set.deadline_hit = true;
                break;
            }

            let unavailable = |reason: String| AutoscaleError::MetricUnavailable {
                target: target.id.clone(),
                metric: spec.metric.clone(),
                reason,
            };

            let timeout = deadline.bound(self.call_timeout);
            let result =
                tokio::time::timeout(timeout, self.source.query(&target.id, spec, range)).await;

            match result {
                Ok(Ok(value)) if value.is_finite() && value >= 0.0 => {
                    set.samples.push(MetricSample {
                        target: target.id.clone(),
                        spec: spec.clone(),
                        observed: value,
                        timestamp: epoch_secs(),
                    });
                }
                Ok(Ok(value)) => {
                    set.failures
                        .push(unavailable(format!("unusable value {value}")));
                }
                Ok(Err(e)) => set.failures.push(unavailable(e.to_string())),
                Err(_) if deadline.is_expired() => {
                    set.deadline_hit = true;
                    break;
                }
                Err(_) => set.failures.push(unavailable(format!(
                    "query timed out after {}ms",
                    timeout.as_millis()
                ))),
            }
        }

        debug!(
            target_id = %target.id,
            sampled = set.samples.len(),
            failed = set.failures.len(),
            deadline_hit = set.deadline_hit,
            "metrics sampled"
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::SourceError;
    use crate::source::BoxFuture;
    use crate::types::{MetricSpec, TargetId};

    /// Returns a fixed result per metric; `None` hangs forever.
    struct FixedSource {
        values: HashMap<String, Option<Result<f64, SourceError>>>,
    }

    impl MetricsSource for FixedSource {
        fn query<'a>(
            &'a self,
            _target: &'a TargetId,
            spec: &'a MetricSpec,
            _range: TimeRange,
        ) -> BoxFuture<'a, Result<f64, SourceError>> {
            let value = self.values.get(&spec.metric).cloned();
            Box::pin(async move {
                match value {
                    Some(Some(result)) => result,
                    Some(None) => std::future::pending().await,
                    None => Err(SourceError::NotFound(spec.metric.clone())),
                }
            })
        }
    }

    fn target(metrics: &[&str]) -> TargetDescriptor {
        TargetDescriptor {
            id: "default/api".to_string(),
            min_replicas: 1,
            max_replicas: 10,
            metrics: metrics
                .iter()
                .map(|m| MetricSpec {
                    metric: m.to_string(),
                    target_value: 50.0,
                })
                .collect(),
        }
    }

    fn sampler(values: Vec<(&str, Option<Result<f64, SourceError>>)>) -> Sampler {
        let source = FixedSource {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        Sampler::new(
            Arc::new(source),
            Duration::from_millis(50),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn samples_every_metric() {
        let s = sampler(vec![("cpu", Some(Ok(90.0))), ("rps", Some(Ok(20.0)))]);
        let set = s
            .sample(&target(&["cpu", "rps"]), Deadline::after(Duration::from_secs(1)))
            .await;

        assert_eq!(set.samples.len(), 2);
        assert!(set.failures.is_empty());
        assert_eq!(set.samples[0].spec.metric, "cpu");
        assert!((set.samples[0].ratio() - 1.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn partial_failure_is_reported_per_metric() {
        let s = sampler(vec![
            ("cpu", Some(Ok(40.0))),
            ("rps", Some(Err(SourceError::Unavailable("down".into())))),
        ]);
        let set = s
            .sample(&target(&["cpu", "rps"]), Deadline::after(Duration::from_secs(1)))
            .await;

        assert_eq!(set.samples.len(), 1);
        assert_eq!(set.failures.len(), 1);
        assert!(matches!(
            &set.failures[0],
            AutoscaleError::MetricUnavailable { metric, .. } if metric == "rps"
        ));
    }

    #[tokio::test]
    async fn hung_query_times_out_as_unavailable() {
        let s = sampler(vec![("cpu", None), ("rps", Some(Ok(10.0)))]);
        let set = s
            .sample(&target(&["cpu", "rps"]), Deadline::after(Duration::from_secs(1)))
            .await;

        assert_eq!(set.samples.len(), 1);
        assert_eq!(set.samples[0].spec.metric, "rps");
        assert!(matches!(
            &set.failures[0],
            AutoscaleError::MetricUnavailable { reason, .. } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn rejects_negative_and_nan_values() {
        let s = sampler(vec![("cpu", Some(Ok(-1.0))), ("rps", Some(Ok(f64::NAN)))]);
        let set = s
            .sample(&target(&["cpu", "rps"]), Deadline::after(Duration::from_secs(1)))
            .await;

        assert!(set.is_empty());
        assert_eq!(set.failures.len(), 2);
    }

    #[tokio::test]
    async fn hung_query_within_deadline_is_not_a_deadline_hit() {
        let s = sampler(vec![("cpu", None)]);
        let set = s
            .sample(&target(&["cpu"]), Deadline::after(Duration::from_secs(1)))
            .await;

        assert!(!set.deadline_hit);
        assert_eq!(set.failures.len(), 1);
    }

    #[tokio::test]
    async fn expired_deadline_stops_sampling() {
        let s = sampler(vec![("cpu", Some(Ok(10.0)))]);
        let deadline = Deadline::at(tokio::time::Instant::now());
        let set = s.sample(&target(&["cpu"]), deadline).await;

        assert!(set.deadline_hit);
        assert!(set.is_empty());
        assert!(set.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn query_cut_short_by_deadline_is_a_deadline_hit() {
        let s = sampler(vec![("cpu", Some(Ok(90.0))), ("rps", None), ("mem", Some(Ok(1.0)))]);
        let set = s
            .sample(
                &target(&["cpu", "rps", "mem"]),
                Deadline::after(Duration::from_millis(20)),
            )
            .await;

        assert!(set.deadline_hit);
        assert_eq!(set.samples.len(), 1);
        assert!(set.failures.is_empty());
    }
}
