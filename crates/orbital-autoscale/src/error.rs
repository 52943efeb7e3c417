//! Autoscaler error types.
//!
//! Every variant except `ListTargets` and `Config` is scoped to a single
//! target and is recovered at the target-evaluation boundary.

use thiserror::Error;

use crate::types::TargetId;

/// Which capacity API call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityOp {
    Read,
    Write,
}

impl std::fmt::Display for CapacityOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityOp::Read => f.write_str("read"),
            CapacityOp::Write => f.write_str("write"),
        }
    }
}

/// Errors produced while evaluating targets or running the control loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AutoscaleError {
    #[error("metric {metric} unavailable for {target}: {reason}")]
    MetricUnavailable {
        target: TargetId,
        metric: String,
        reason: String,
    },

    #[error("no usable metrics for {0}")]
    NoUsableMetrics(TargetId),

    #[error("capacity API unavailable ({op}) for {target} after {attempts} attempt(s): {reason}")]
    CapacityApiUnavailable {
        target: TargetId,
        op: CapacityOp,
        attempts: u32,
        reason: String,
    },

    #[error("evaluation of {0} exceeded the cycle deadline")]
    CycleTimeout(TargetId),

    #[error("failed to enumerate targets: {0}")]
    ListTargets(String),

    #[error("invalid target {target}: {reason}")]
    InvalidTarget { target: TargetId, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AutoscaleError {
    /// Short, stable label used in structured events and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AutoscaleError::MetricUnavailable { .. } => "metric_unavailable",
            AutoscaleError::NoUsableMetrics(_) => "no_usable_metrics",
            AutoscaleError::CapacityApiUnavailable { .. } => "capacity_api_unavailable",
            AutoscaleError::CycleTimeout(_) => "cycle_timeout",
            AutoscaleError::ListTargets(_) => "list_targets",
            AutoscaleError::InvalidTarget { .. } => "invalid_target",
            AutoscaleError::Config(_) => "config",
        }
    }
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Errors returned across the `CapacityApi` / `MetricsSource` boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Network or backend unavailable; worth retrying.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl SourceError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}
