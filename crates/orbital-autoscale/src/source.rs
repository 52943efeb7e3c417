//! Boundary traits for the two external collaborators: the capacity API
//! and the metrics source.
//!
//! Both are object-safe so the control loop can hold them as
//! `Arc<dyn ...>` and share them across worker tasks. Implementations
//! return boxed futures, which keeps the traits free of any async-trait
//! machinery.

use std::future::Future;
use std::pin::Pin;

use crate::error::SourceError;
use crate::types::{MetricSpec, TargetDescriptor, TargetId, TimeRange};

/// Boxed, sendable future returned by the boundary traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authoritative view of targets and their replica counts.
pub trait CapacityApi: Send + Sync {
    /// Enumerate every target under management.
    fn list_targets(&self) -> BoxFuture<'_, Result<Vec<TargetDescriptor>, SourceError>>;

    /// Read the replica count currently in effect for a target.
    fn get_current_replicas<'a>(
        &'a self,
        target: &'a TargetId,
    ) -> BoxFuture<'a, Result<u32, SourceError>>;

    /// Set the replica count for a target.
    fn set_replicas<'a>(
        &'a self,
        target: &'a TargetId,
        replicas: u32,
    ) -> BoxFuture<'a, Result<(), SourceError>>;
}

/// Source of observed metric values.
pub trait MetricsSource: Send + Sync {
    /// Observed value of `spec.metric` for `target` over `range`.
    fn query<'a>(
        &'a self,
        target: &'a TargetId,
        spec: &'a MetricSpec,
        range: TimeRange,
    ) -> BoxFuture<'a, Result<f64, SourceError>>;
}
