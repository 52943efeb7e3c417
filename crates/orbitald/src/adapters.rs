//! Store-backed implementations of the autoscaler's boundary traits.
//!
//! `StoreCapacity` treats the workload table as the capacity API: the
//! `replicas` column is the authoritative count and writes go straight to
//! it. `StoreMetrics` answers queries from the readings table.

use orbital_autoscale::{
    BoxFuture, CapacityApi, MetricSpec, MetricsSource, SourceError, TargetDescriptor, TargetId,
    TimeRange,
};
use orbital_state::{StateError, StateStore, WorkloadRecord};

fn source_error(e: StateError) -> SourceError {
    match e {
        StateError::NotFound(what) => SourceError::NotFound(what),
        StateError::Invalid(why) => SourceError::Rejected(why),
        other => SourceError::Unavailable(other.to_string()),
    }
}

fn descriptor(record: WorkloadRecord) -> TargetDescriptor {
    TargetDescriptor {
        id: record.id,
        min_replicas: record.min_replicas,
        max_replicas: record.max_replicas,
        metrics: record
            .metrics
            .into_iter()
            .map(|m| MetricSpec {
                metric: m.metric,
                target_value: m.target_value,
            })
            .collect(),
    }
}

#[derive(Clone)]
pub struct StoreCapacity {
    store: StateStore,
}

impl StoreCapacity {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl CapacityApi for StoreCapacity {
    fn list_targets(&self) -> BoxFuture<'_, Result<Vec<TargetDescriptor>, SourceError>> {
        Box::pin(async move {
            let workloads = self.store.list_workloads().map_err(source_error)?;
            Ok(workloads.into_iter().map(descriptor).collect())
        })
    }

    fn get_current_replicas<'a>(
        &'a self,
        target: &'a TargetId,
    ) -> BoxFuture<'a, Result<u32, SourceError>> {
        Box::pin(async move {
            match self.store.get_workload(target).map_err(source_error)? {
                Some(record) => Ok(record.replicas),
                None => Err(SourceError::NotFound(target.clone())),
            }
        })
    }

    fn set_replicas<'a>(
        &'a self,
        target: &'a TargetId,
        replicas: u32,
    ) -> BoxFuture<'a, Result<(), SourceError>> {
        Box::pin(async move {
            self.store
                .set_replicas(target, replicas)
                .map(|_| ())
                .map_err(source_error)
        })
    }
}

#[derive(Clone)]
pub struct StoreMetrics {
    store: StateStore,
}

impl StoreMetrics {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl MetricsSource for StoreMetrics {
    /// Mean of the readings recorded within `range`.
    fn query<'a>(
        &'a self,
        target: &'a TargetId,
        spec: &'a MetricSpec,
        range: TimeRange,
    ) -> BoxFuture<'a, Result<f64, SourceError>> {
        Box::pin(async move {
            let readings = self
                .store
                .readings_in_range(target, &spec.metric, range.start, range.end)
                .map_err(source_error)?;

            if readings.is_empty() {
                return Err(SourceError::Unavailable(format!(
                    "no {} readings for {target} in the last {}s",
                    spec.metric,
                    range.end - range.start
                )));
            }
            let sum: f64 = readings.iter().map(|r| r.value).sum();
            Ok(sum / readings.len() as f64)
        })
    }
}
