//! Domain types shared by every stage of the scaling pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{AutoscaleError, AutoscaleResult};

/// Opaque target identity, `{namespace}/{name}`.
pub type TargetId = String;

// ── Descriptors ────────────────────────────────────────────────────

/// One metric a target scales on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSpec {
    /// Metric name understood by the metrics source ("cpu", "rps", ...).
    pub metric: String,
    /// Per-replica utilization the target should settle at.
    pub target_value: f64,
}

/// A target as enumerated by the capacity API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Ordered metric definitions; must be non-empty.
    pub metrics: Vec<MetricSpec>,
}

impl TargetDescriptor {
    /// Check the structural invariants the engine relies on.
    pub fn validate(&self) -> AutoscaleResult<()> {
        let invalid = |reason: String| AutoscaleError::InvalidTarget {
            target: self.id.clone(),
            reason,
        };

        if self.min_replicas > self.max_replicas {
            return Err(invalid(format!(
                "min_replicas {} exceeds max_replicas {}",
                self.min_replicas, self.max_replicas
            )));
        }
        if self.metrics.is_empty() {
            return Err(invalid("no metric specs".to_string()));
        }
        for spec in &self.metrics {
            if !(spec.target_value.is_finite() && spec.target_value > 0.0) {
                return Err(invalid(format!(
                    "metric {} has non-positive target value {}",
                    spec.metric, spec.target_value
                )));
            }
        }
        Ok(())
    }

    /// Clamp a replica count into `[min_replicas, max_replicas]`.
    pub fn clamp(&self, replicas: u32) -> u32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

// ── Samples ────────────────────────────────────────────────────────

/// Wall-clock range handed to the metrics source, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    /// The trailing `window` ending now.
    pub fn trailing(window: std::time::Duration) -> Self {
        let end = epoch_secs();
        Self {
            start: end.saturating_sub(window.as_secs()),
            end,
        }
    }
}

/// One observed metric value for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub target: TargetId,
    pub spec: MetricSpec,
    pub observed: f64,
    /// Unix seconds at which the sample was taken.
    pub timestamp: u64,
}

impl MetricSample {
    /// Observed value normalized against the spec's target value.
    pub fn ratio(&self) -> f64 {
        self.observed / self.spec.target_value
    }
}

// ── Decisions ──────────────────────────────────────────────────────

/// Direction of a replica change relative to the current count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Hold,
}

impl Direction {
    pub fn between(current: u32, desired: u32) -> Self {
        match desired.cmp(&current) {
            std::cmp::Ordering::Greater => Direction::Up,
            std::cmp::Ordering::Less => Direction::Down,
            std::cmp::Ordering::Equal => Direction::Hold,
        }
    }
}

/// Why the decision engine produced its desired count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    WithinTolerance,
    ScaleUp,
    ScaleDown,
    ClampedToMin,
    ClampedToMax,
    Steady,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::WithinTolerance => "within-tolerance",
            DecisionReason::ScaleUp => "scale-up",
            DecisionReason::ScaleDown => "scale-down",
            DecisionReason::ClampedToMin => "clamped-to-min",
            DecisionReason::ClampedToMax => "clamped-to-max",
            DecisionReason::Steady => "steady",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the decision engine for one target in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    pub target: TargetId,
    pub current_replicas: u32,
    /// Max across metrics before clamping.
    pub raw_desired: u32,
    /// `raw_desired` clamped to the target's bounds.
    pub desired_replicas: u32,
    pub reason: DecisionReason,
    /// Metric that produced `raw_desired`, if any metric left the dead zone.
    pub driving_metric: Option<String>,
    pub at: Instant,
}

impl ScalingDecision {
    pub fn direction(&self) -> Direction {
        Direction::between(self.current_replicas, self.desired_replicas)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
