//! Scaling executor — applies approved replica counts through the
//! capacity API with bounded retries.
//!
//! Transient failures are retried with exponential backoff (base doubled
//! per failure, capped) for at most `max_attempts` calls and never past
//! the cycle deadline. When retries run out the decision is dropped; the
//! next cycle derives a fresh one from fresh metrics.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::deadline::Deadline;
use crate::error::{AutoscaleError, AutoscaleResult, CapacityOp, SourceError};
use crate::registry::Target;
use crate::source::CapacityApi;

pub struct ScalingExecutor {
    capacity: Arc<dyn CapacityApi>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl ScalingExecutor {
    pub fn new(capacity: Arc<dyn CapacityApi>, retry: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            capacity,
            retry,
            call_timeout,
        }
    }

    /// Set `target` to `approved` replicas.
    ///
    /// On success `target.current_replicas` is updated optimistically and
    /// the number of attempts is returned. On failure `current_replicas`
    /// is left untouched. A call that is still outstanding when the
    /// deadline passes, or a deadline that has already passed, yields
    /// `CycleTimeout`.
    pub async fn apply(
        &self,
        target: &mut Target,
        approved: u32,
        deadline: Deadline,
    ) -> AutoscaleResult<u32> {
        let id = target.id().clone();
        let from = target.current_replicas;
        let mut attempt = 0;

        loop {
            if deadline.is_expired() {
                warn!(target_id = %id, attempts = attempt, "cycle deadline passed before set_replicas");
                return Err(AutoscaleError::CycleTimeout(id.clone()));
            }

            attempt += 1;
            let timeout = deadline.bound(self.call_timeout);
            let result = match tokio::time::timeout(
                timeout,
                self.capacity.set_replicas(&id, approved),
            )
            .await
            {
                Ok(result) => result,
                Err(_) if deadline.is_expired() => {
                    warn!(target_id = %id, attempts = attempt, "set_replicas cut short by cycle deadline");
                    return Err(AutoscaleError::CycleTimeout(id.clone()));
                }
                Err(_) => Err(SourceError::Unavailable(format!(
                    "set_replicas timed out after {}ms",
                    timeout.as_millis()
                ))),
            };

            let err = match result {
                Ok(()) => {
                    target.current_replicas = Some(approved);
                    info!(target_id = %id, from = ?from, to = approved, attempts = attempt, "replicas set");
                    return Ok(attempt);
                }
                Err(e) => e,
            };

            let give_up = |reason: String| AutoscaleError::CapacityApiUnavailable {
                target: id.clone(),
                op: CapacityOp::Write,
                attempts: attempt,
                reason,
            };

            if !err.is_transient() {
                warn!(target_id = %id, error = %err, "scaling rejected, not retrying");
                return Err(give_up(err.to_string()));
            }
            if attempt >= self.retry.max_attempts {
                warn!(target_id = %id, attempts = attempt, error = %err, "scaling retries exhausted");
                return Err(give_up(err.to_string()));
            }

            let backoff = self.retry.backoff(attempt);
            if backoff >= deadline.remaining() {
                warn!(target_id = %id, attempts = attempt, error = %err, "no time left in cycle to retry");
                return Err(give_up(format!("{err} (cycle deadline reached)")));
            }

            debug!(
                target_id = %id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "set_replicas failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::source::BoxFuture;
    use crate::types::{MetricSpec, TargetDescriptor, TargetId};

    /// Fails the first `failures` writes with the given error.
    struct FlakyCapacity {
        failures: Mutex<u32>,
        error: SourceError,
        calls: Mutex<Vec<u32>>,
    }

    impl FlakyCapacity {
        fn new(failures: u32, error: SourceError) -> Self {
            Self {
                failures: Mutex::new(failures),
                error,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CapacityApi for FlakyCapacity {
        fn list_targets(&self) -> BoxFuture<'_, Result<Vec<TargetDescriptor>, SourceError>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn get_current_replicas<'a>(
            &'a self,
            _target: &'a TargetId,
        ) -> BoxFuture<'a, Result<u32, SourceError>> {
            Box::pin(async { Ok(0) })
        }

        fn set_replicas<'a>(
            &'a self,
            _target: &'a TargetId,
            replicas: u32,
        ) -> BoxFuture<'a, Result<(), SourceError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(replicas);
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    Err(self.error.clone())
                } else {
                    Ok(())
                }
            })
        }
    }

    fn target(current: u32) -> Target {
        let mut target = Target::new(
            TargetDescriptor {
                id: "default/api".to_string(),
                min_replicas: 1,
                max_replicas: 10,
                metrics: vec![MetricSpec {
                    metric: "cpu".to_string(),
                    target_value: 50.0,
                }],
            },
            16,
        );
        target.current_replicas = Some(current);
        target
    }

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn executor(capacity: Arc<FlakyCapacity>, max_attempts: u32) -> ScalingExecutor {
        ScalingExecutor::new(capacity, retry(max_attempts), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn applies_on_first_attempt() {
        let capacity = Arc::new(FlakyCapacity::new(0, SourceError::Unavailable("x".into())));
        let mut t = target(4);

        let attempts = executor(capacity.clone(), 3)
            .apply(&mut t, 8, Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(t.current_replicas, Some(8));
        assert_eq!(capacity.calls(), vec![8]);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let capacity = Arc::new(FlakyCapacity::new(2, SourceError::Unavailable("503".into())));
        let mut t = target(4);

        let attempts = executor(capacity.clone(), 3)
            .apply(&mut t, 8, Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(t.current_replicas, Some(8));
    }

    #[tokio::test]
    async fn exhausted_retries_leave_current_unchanged() {
        let capacity = Arc::new(FlakyCapacity::new(3, SourceError::Unavailable("503".into())));
        let mut t = target(4);

        let err = executor(capacity.clone(), 3)
            .apply(&mut t, 8, Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AutoscaleError::CapacityApiUnavailable { attempts: 3, op: CapacityOp::Write, .. }
        ));
        assert_eq!(t.current_replicas, Some(4));
        assert_eq!(capacity.calls().len(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let capacity = Arc::new(FlakyCapacity::new(5, SourceError::NotFound("default/api".into())));
        let mut t = target(4);

        let err = executor(capacity.clone(), 3)
            .apply(&mut t, 8, Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoscaleError::CapacityApiUnavailable { attempts: 1, .. }));
        assert_eq!(capacity.calls().len(), 1);
    }

    #[tokio::test]
    async fn stops_retrying_at_deadline() {
        let capacity = Arc::new(FlakyCapacity::new(10, SourceError::Unavailable("503".into())));
        let mut t = target(4);
        let exec = ScalingExecutor::new(
            capacity.clone(),
            RetryConfig {
                max_attempts: 10,
                base_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(1),
            },
            Duration::from_secs(1),
        );

        let err = exec
            .apply(&mut t, 8, Deadline::after(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("deadline"));
        assert_eq!(capacity.calls().len(), 1);
        assert_eq!(t.current_replicas, Some(4));
    }

    #[tokio::test]
    async fn expired_deadline_makes_no_call() {
        let capacity = Arc::new(FlakyCapacity::new(0, SourceError::Unavailable("x".into())));
        let mut t = target(4);

        let err = executor(capacity.clone(), 3)
            .apply(&mut t, 8, Deadline::at(tokio::time::Instant::now()))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoscaleError::CycleTimeout(_)));
        assert!(capacity.calls().is_empty());
        assert_eq!(t.current_replicas, Some(4));
    }

    struct HungCapacity;

    impl CapacityApi for HungCapacity {
        fn list_targets(&self) -> BoxFuture<'_, Result<Vec<TargetDescriptor>, SourceError>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn get_current_replicas<'a>(
            &'a self,
            _target: &'a TargetId,
        ) -> BoxFuture<'a, Result<u32, SourceError>> {
            Box::pin(async { Ok(0) })
        }

        fn set_replicas<'a>(
            &'a self,
            _target: &'a TargetId,
            _replicas: u32,
        ) -> BoxFuture<'a, Result<(), SourceError>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn write_cut_short_by_deadline_is_cycle_timeout() {
        let exec = ScalingExecutor::new(Arc::new(HungCapacity), retry(3), Duration::from_secs(5));
        let mut t = target(4);

        let err = exec
            .apply(&mut t, 8, Deadline::after(Duration::from_secs(2)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "cycle_timeout");
        assert_eq!(t.current_replicas, Some(4));
    }
}
