//! Record types for the Orbital state store.
//!
//! Workloads carry the replica count the autoscaler reads and writes plus
//! the bounds and metric targets it scales by. Readings are raw metric
//! observations pushed by whatever collects load.

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Unique identifier for a workload, `{namespace}/{name}`.
pub type WorkloadId = String;

// ── Workload ───────────────────────────────────────────────────────

/// A metric the workload scales on and its per-replica target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricTarget {
    pub metric: String,
    pub target_value: f64,
}

/// An autoscaled workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadRecord {
    pub id: WorkloadId,
    pub namespace: String,
    pub name: String,
    /// Replica count currently in effect.
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub metrics: Vec<MetricTarget>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl WorkloadRecord {
    /// Build the composite key for the workloads table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Reject records the autoscaler could never manage.
    pub fn validate(&self) -> StateResult<()> {
        if self.namespace.is_empty() || self.name.is_empty() {
            return Err(StateError::Invalid(
                "namespace and name must be non-empty".to_string(),
            ));
        }
        if self.namespace.contains('/') || self.name.contains(['/', ':']) {
            return Err(StateError::Invalid(format!(
                "{}: namespace and name must not contain '/' or ':'",
                self.table_key()
            )));
        }
        if self.min_replicas > self.max_replicas {
            return Err(StateError::Invalid(format!(
                "{}: min_replicas {} exceeds max_replicas {}",
                self.table_key(),
                self.min_replicas,
                self.max_replicas
            )));
        }
        if self.metrics.is_empty() {
            return Err(StateError::Invalid(format!(
                "{}: at least one metric target is required",
                self.table_key()
            )));
        }
        for m in &self.metrics {
            if m.metric.is_empty() || m.metric.contains(':') {
                return Err(StateError::Invalid(format!(
                    "{}: invalid metric name {:?}",
                    self.table_key(),
                    m.metric
                )));
            }
            if !(m.target_value.is_finite() && m.target_value > 0.0) {
                return Err(StateError::Invalid(format!(
                    "{}: metric {} target must be positive",
                    self.table_key(),
                    m.metric
                )));
            }
        }
        Ok(())
    }
}

// ── Readings ───────────────────────────────────────────────────────

/// One observed metric value for a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricReading {
    pub workload_id: WorkloadId,
    pub metric: String,
    pub value: f64,
    /// Unix seconds.
    pub epoch: u64,
}

impl MetricReading {
    /// Build the composite key for the readings table.
    pub fn table_key(&self) -> String {
        reading_key(&self.workload_id, &self.metric, self.epoch)
    }
}

/// Key for a reading; the zero-padded epoch keeps one series in time order.
pub fn reading_key(workload_id: &str, metric: &str, epoch: u64) -> String {
    format!("{workload_id}:{metric}:{epoch:020}")
}
