//! Stabilization filter — per-direction cooldowns and the scale-down
//! look-back rule.
//!
//! Every decision is recorded in the target's [`DecisionHistory`]. A
//! scale-up is admitted once the up cooldown has elapsed. A scale-down is
//! admitted once the down cooldown has elapsed, and then only down to the
//! highest desired count recorded within the down window, so a transient
//! dip never removes capacity a recent cycle asked for.
//!
//! Admission is two-phase. [`StabilizationFilter::admit`] records the
//! decision and computes the approved count; [`StabilizationFilter::commit`]
//! starts the cooldown once the executor has actually applied it.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::{Direction, ScalingDecision, TargetDescriptor};

/// One recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub at: Instant,
    pub desired: u32,
    pub direction: Direction,
    /// Set once the decision was admitted and applied as-is.
    pub applied: bool,
}

/// Bounded, time-ordered record of recent decisions for one target.
#[derive(Debug, Clone)]
pub struct DecisionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Drop entries older than `window` before `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.at) > window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Remove recorded-but-unapplied entries pointing in `direction`.
    pub fn clear_unapplied(&mut self, direction: Direction) {
        self.entries
            .retain(|e| e.applied || e.direction != direction);
    }

    fn mark_last_applied(&mut self) {
        if let Some(last) = self.entries.back_mut() {
            last.applied = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Highest desired count recorded within `window` before `now`.
pub fn recent_max<'a>(
    entries: impl IntoIterator<Item = &'a HistoryEntry>,
    now: Instant,
    window: Duration,
) -> Option<u32> {
    entries
        .into_iter()
        .filter(|e| now.saturating_duration_since(e.at) <= window)
        .map(|e| e.desired)
        .max()
}

/// Per-target cooldown tracking and decision history.
#[derive(Debug, Clone)]
pub struct ScaleState {
    /// Last time a scale-up was applied; `None` means never.
    pub last_scale_up: Option<Instant>,
    /// Last time a scale-down was applied; `None` means never.
    pub last_scale_down: Option<Instant>,
    pub history: DecisionHistory,
}

impl ScaleState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            last_scale_up: None,
            last_scale_down: None,
            history: DecisionHistory::new(history_capacity),
        }
    }
}

/// What the filter did with a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Desired equals current; nothing to do.
    Unchanged,
    /// Admitted at the decided value.
    Admitted,
    /// Scale-down admitted, but floored at a higher recent decision.
    Floored { floor: u32 },
    /// Held at current by the cooldown for this direction.
    CoolingDown { remaining: Duration },
    /// Scale-down vetoed: a recent decision was at or above current.
    HeldByHistory { floor: u32 },
}

impl Verdict {
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Verdict::Unchanged | Verdict::Admitted => None,
            Verdict::Floored { .. } => Some("floored-by-history"),
            Verdict::CoolingDown { .. } => Some("cooldown"),
            Verdict::HeldByHistory { .. } => Some("held-by-history"),
        }
    }
}

/// Outcome of [`StabilizationFilter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub approved: u32,
    pub direction: Direction,
    pub verdict: Verdict,
}

impl Admission {
    /// Whether the executor has anything to apply.
    pub fn requires_action(&self, current: u32) -> bool {
        self.approved != current
    }
}

#[derive(Debug, Clone)]
pub struct StabilizationFilter {
    up_cooldown: Duration,
    down_cooldown: Duration,
}

impl StabilizationFilter {
    pub fn new(up_cooldown: Duration, down_cooldown: Duration) -> Self {
        Self {
            up_cooldown,
            down_cooldown,
        }
    }

    /// Record `decision` and decide what may be applied now.
    pub fn admit(
        &self,
        target: &TargetDescriptor,
        state: &mut ScaleState,
        decision: &ScalingDecision,
        now: Instant,
    ) -> Admission {
        let current = decision.current_replicas;
        let desired = decision.desired_replicas;
        let direction = decision.direction();

        state.history.prune(now, self.down_cooldown);
        state.history.record(HistoryEntry {
            at: now,
            desired,
            direction,
            applied: false,
        });

        let hold = |verdict| Admission {
            approved: current,
            direction,
            verdict,
        };

        match direction {
            Direction::Hold => hold(Verdict::Unchanged),
            Direction::Up => {
                if let Some(remaining) =
                    cooldown_remaining(state.last_scale_up, self.up_cooldown, now)
                {
                    return hold(Verdict::CoolingDown { remaining });
                }
                Admission {
                    approved: target.clamp(desired),
                    direction,
                    verdict: Verdict::Admitted,
                }
            }
            Direction::Down => {
                if let Some(remaining) =
                    cooldown_remaining(state.last_scale_down, self.down_cooldown, now)
                {
                    return hold(Verdict::CoolingDown { remaining });
                }

                let floor = recent_max(state.history.entries(), now, self.down_cooldown)
                    .unwrap_or(desired);
                let approved = target.clamp(floor.max(desired));

                if approved >= current {
                    hold(Verdict::HeldByHistory { floor })
                } else if approved > desired {
                    Admission {
                        approved,
                        direction,
                        verdict: Verdict::Floored { floor },
                    }
                } else {
                    Admission {
                        approved,
                        direction,
                        verdict: Verdict::Admitted,
                    }
                }
            }
        }
    }

    /// Start the cooldown for an admission that was applied.
    ///
    /// Clears the opposing direction's unapplied history so a pending
    /// decision in the other direction cannot immediately veto this one.
    pub fn commit(&self, state: &mut ScaleState, admission: &Admission, now: Instant) {
        match admission.direction {
            Direction::Up => {
                state.last_scale_up = Some(now);
                state.history.clear_unapplied(Direction::Down);
            }
            Direction::Down => {
                state.last_scale_down = Some(now);
                state.history.clear_unapplied(Direction::Up);
            }
            Direction::Hold => return,
        }
        if admission.verdict == Verdict::Admitted {
            state.history.mark_last_applied();
        }
    }
}

/// Time left on a cooldown that started at `last`, if still running.
fn cooldown_remaining(last: Option<Instant>, cooldown: Duration, now: Instant) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(last?);
    (elapsed < cooldown).then(|| cooldown - elapsed)
}
