//! Structured evaluation events.
//!
//! One [`TargetEvaluation`] is produced per target per cycle and one
//! [`CycleSummary`] per cycle. Both are logged through `tracing` and kept
//! in the latest [`CycleReport`] for the status and metrics endpoints.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AutoscaleError;
use crate::stabilization::Admission;
use crate::types::{Direction, ScalingDecision, TargetId};

/// Terminal state of one target evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The executor applied a new replica count.
    Scaled,
    /// Desired equalled current; nothing to do.
    Unchanged,
    /// A change was wanted but the stabilization filter held it.
    Held,
    /// The pipeline aborted for this target.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetEvaluation {
    pub target: TargetId,
    /// `None` when the count could not be observed this cycle.
    pub current_replicas: Option<u32>,
    pub desired_replicas: Option<u32>,
    pub approved_replicas: Option<u32>,
    pub reason: String,
    /// Why the filter changed the decision, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stabilization: Option<&'static str>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Per-metric sampling failures that did not abort the evaluation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metric_failures: Vec<String>,
    /// Capacity API write attempts, zero when nothing was applied.
    pub attempts: u32,
    pub duration_ms: u64,
}

impl TargetEvaluation {
    /// An evaluation that ran through the stabilization filter.
    pub fn decided(
        decision: &ScalingDecision,
        admission: &Admission,
        metric_failures: Vec<String>,
    ) -> Self {
        let current = decision.current_replicas;
        let outcome = if admission.approved != current {
            Outcome::Scaled
        } else if decision.direction() == Direction::Hold {
            Outcome::Unchanged
        } else {
            Outcome::Held
        };

        Self {
            target: decision.target.clone(),
            current_replicas: Some(current),
            desired_replicas: Some(decision.desired_replicas),
            approved_replicas: Some(admission.approved),
            reason: decision.reason.to_string(),
            stabilization: admission.verdict.reason(),
            outcome,
            error: None,
            error_kind: None,
            metric_failures,
            attempts: 0,
            duration_ms: 0,
        }
    }

    /// An evaluation that aborted before reaching the executor.
    pub fn failed(target: &TargetId, current_replicas: Option<u32>, error: &AutoscaleError) -> Self {
        Self {
            target: target.clone(),
            current_replicas,
            desired_replicas: None,
            approved_replicas: None,
            reason: error.kind().to_string(),
            stabilization: None,
            outcome: Outcome::Failed,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            metric_failures: Vec::new(),
            attempts: 0,
            duration_ms: 0,
        }
    }

    /// Mark a decided evaluation as failed in the executor. The decision
    /// fields are kept so the report shows what was dropped.
    pub fn fail_apply(&mut self, error: &AutoscaleError) {
        if let AutoscaleError::CapacityApiUnavailable { attempts, .. } = error {
            self.attempts = *attempts;
        }
        self.outcome = Outcome::Failed;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
    }

    pub fn with_metric_failures(mut self, failures: Vec<String>) -> Self {
        self.metric_failures = failures;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }

    /// Log this evaluation as a single structured event.
    pub fn emit(&self) {
        let error = self.error.as_deref().unwrap_or("none");
        if self.is_failed() {
            warn!(
                target_id = %self.target,
                current_replicas = ?self.current_replicas,
                desired_replicas = ?self.desired_replicas,
                approved_replicas = ?self.approved_replicas,
                reason = %self.reason,
                error,
                metric_failures = self.metric_failures.len(),
                duration_ms = self.duration_ms,
                "target evaluation failed"
            );
        } else {
            info!(
                target_id = %self.target,
                current_replicas = ?self.current_replicas,
                desired_replicas = ?self.desired_replicas,
                approved_replicas = ?self.approved_replicas,
                reason = %self.reason,
                stabilization = self.stabilization.unwrap_or("none"),
                outcome = ?self.outcome,
                error,
                duration_ms = self.duration_ms,
                "target evaluated"
            );
        }
    }
}

// ── Cycle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    /// Unix seconds at cycle start.
    pub started_at: u64,
    pub evaluated: usize,
    pub scaled: usize,
    pub held: usize,
    /// Targets skipped because their descriptor was invalid.
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Set when the whole cycle was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleSummary {
    pub fn tally(
        cycle: u64,
        started_at: u64,
        duration_ms: u64,
        evaluations: &[TargetEvaluation],
        skipped: usize,
    ) -> Self {
        let count = |outcome: Outcome| {
            evaluations
                .iter()
                .filter(|e| e.outcome == outcome)
                .count()
        };
        Self {
            cycle,
            started_at,
            evaluated: evaluations.len(),
            scaled: count(Outcome::Scaled),
            held: count(Outcome::Held),
            skipped,
            failed: count(Outcome::Failed),
            duration_ms,
            error: None,
        }
    }

    pub fn emit(&self) {
        match &self.error {
            Some(error) => warn!(
                cycle = self.cycle,
                error = %error,
                duration_ms = self.duration_ms,
                "cycle skipped"
            ),
            None => info!(
                cycle = self.cycle,
                evaluated = self.evaluated,
                scaled = self.scaled,
                held = self.held,
                skipped = self.skipped,
                failed = self.failed,
                duration_ms = self.duration_ms,
                "cycle complete"
            ),
        }
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub summary: CycleSummary,
    /// Sorted by target ID.
    pub evaluations: Vec<TargetEvaluation>,
}

impl CycleReport {
    /// A cycle skipped before any target was evaluated.
    pub fn skipped(cycle: u64, started_at: u64, duration_ms: u64, error: &AutoscaleError) -> Self {
        Self {
            summary: CycleSummary {
                cycle,
                started_at,
                duration_ms,
                error: Some(error.to_string()),
                ..CycleSummary::default()
            },
            evaluations: Vec::new(),
        }
    }

    pub fn evaluation(&self, target: &str) -> Option<&TargetEvaluation> {
        self.evaluations.iter().find(|e| e.target == target)
    }
}
