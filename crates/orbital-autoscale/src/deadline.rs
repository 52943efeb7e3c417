//! Cycle deadline token.
//!
//! A `Deadline` is created once per cycle and passed down through the
//! sampler and executor. Every suspending call is bounded by
//! [`Deadline::bound`], so no single target can hold its worker past the
//! end of the cycle budget.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Shorten a per-call timeout so it never outlives the deadline.
    pub fn bound(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}
