//! Decision engine — desired replicas from observed utilization.
//!
//! # Algorithm
//!
//! ```text
//! for each sample:
//!     ratio = observed / target_value
//!     if |ratio - 1| <= tolerance:  proposal = current      (dead zone)
//!     else:                         proposal = ceil(current * ratio)
//!
//! raw     = max(proposals)              // most demanding metric wins
//! desired = clamp(raw, min, max)
//! ```
//!
//! With zero current replicas any positive load proposes `ceil(ratio)`
//! (at least one), so a target scaled to zero can wake up.

use tokio::time::Instant;

use crate::error::{AutoscaleError, AutoscaleResult};
use crate::types::{DecisionReason, MetricSample, ScalingDecision, TargetDescriptor};

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    tolerance: f64,
}

impl DecisionEngine {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Compute the desired replica count for `target` from `samples`.
    ///
    /// Fails with `NoUsableMetrics` when `samples` is empty.
    pub fn decide(
        &self,
        target: &TargetDescriptor,
        current: u32,
        samples: &[MetricSample],
        now: Instant,
    ) -> AutoscaleResult<ScalingDecision> {
        if samples.is_empty() {
            return Err(AutoscaleError::NoUsableMetrics(target.id.clone()));
        }

        let mut raw = None::<u32>;
        let mut driving_metric = None;
        let mut all_within_tolerance = true;

        for sample in samples {
            let ratio = sample.ratio();
            let proposal = if (ratio - 1.0).abs() <= self.tolerance {
                current
            } else {
                all_within_tolerance = false;
                proposal_for(current, ratio)
            };

            if raw.is_none_or(|r| proposal > r) {
                raw = Some(proposal);
                driving_metric = (proposal != current).then(|| sample.spec.metric.clone());
            }
        }

        let raw = raw.unwrap_or(current);
        let desired = target.clamp(raw);

        let reason = if desired != raw {
            if desired > raw {
                DecisionReason::ClampedToMin
            } else {
                DecisionReason::ClampedToMax
            }
        } else if all_within_tolerance {
            DecisionReason::WithinTolerance
        } else if desired > current {
            DecisionReason::ScaleUp
        } else if desired < current {
            DecisionReason::ScaleDown
        } else {
            DecisionReason::Steady
        };

        Ok(ScalingDecision {
            target: target.id.clone(),
            current_replicas: current,
            raw_desired: raw,
            desired_replicas: desired,
            reason,
            driving_metric,
            at: now,
        })
    }
}

/// `ceil(current * ratio)`, saturating at `u32::MAX`.
fn proposal_for(current: u32, ratio: f64) -> u32 {
    let scaled = if current == 0 {
        if ratio > 0.0 { ratio.ceil().max(1.0) } else { 0.0 }
    } else {
        (current as f64 * ratio).ceil()
    };
    scaled.min(u32::MAX as f64) as u32
}
