//! Autoscaler configuration.
//!
//! Durations are written as short strings (`"500ms"`, `"30s"`, `"5m"`,
//! `"1h"`), matching how scaling windows are expressed in workload specs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AutoscaleError, AutoscaleResult};

/// Retry policy for capacity API writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub base_backoff: Duration,
    #[serde(with = "duration_str")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based): base doubled per
    /// prior failure, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Control loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    /// Time between evaluation cycles.
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Budget for one cycle; must be shorter than `interval`.
    #[serde(with = "duration_str")]
    pub cycle_timeout: Duration,
    /// Timeout for a single capacity API or metrics source call.
    #[serde(with = "duration_str")]
    pub call_timeout: Duration,
    /// Trailing range queried from the metrics source.
    #[serde(with = "duration_str")]
    pub metric_window: Duration,
    #[serde(with = "duration_str")]
    pub up_cooldown: Duration,
    /// Also the stabilization window for scale-down.
    #[serde(with = "duration_str")]
    pub down_cooldown: Duration,
    /// Dead-zone half width, as a fraction of the target utilization.
    pub tolerance: f64,
    /// Worker pool size per cycle.
    pub workers: usize,
    /// Maximum decisions retained per target.
    pub history_capacity: usize,
    /// How long shutdown waits for in-flight evaluations.
    #[serde(with = "duration_str")]
    pub shutdown_grace: Duration,
    pub retry: RetryConfig,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cycle_timeout: Duration::from_secs(20),
            call_timeout: Duration::from_secs(5),
            metric_window: Duration::from_secs(60),
            up_cooldown: Duration::from_secs(30),
            down_cooldown: Duration::from_secs(300),
            tolerance: 0.1,
            workers: 8,
            history_capacity: 64,
            shutdown_grace: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

impl AutoscaleConfig {
    /// Reject configurations the control loop cannot honor.
    pub fn validate(&self) -> AutoscaleResult<()> {
        let fail = |msg: String| Err(AutoscaleError::Config(msg));

        if self.interval.is_zero() {
            return fail("interval must be positive".to_string());
        }
        if self.cycle_timeout >= self.interval {
            return fail(format!(
                "cycle_timeout ({}) must be shorter than interval ({})",
                format_duration(self.cycle_timeout),
                format_duration(self.interval)
            ));
        }
        if self.call_timeout > self.cycle_timeout {
            return fail(format!(
                "call_timeout ({}) must not exceed cycle_timeout ({})",
                format_duration(self.call_timeout),
                format_duration(self.cycle_timeout)
            ));
        }
        if self.workers == 0 {
            return fail("workers must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return fail(format!("tolerance {} must be in [0, 1)", self.tolerance));
        }
        if self.history_capacity == 0 {
            return fail("history_capacity must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Parse a duration string like "250ms", "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parse = |n: &str| {
        n.trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid duration: {s:?}"))
    };

    if let Some(ms) = s.strip_suffix("ms") {
        parse(ms).map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        parse(secs).map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(parse(mins)?, 60, s)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(parse(hours)?, 3600, s)
    } else {
        parse(s).map(Duration::from_secs)
    }
}

fn scaled(n: u64, unit_secs: u64, raw: &str) -> Result<Duration, String> {
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {raw:?}"))
}

/// Render a duration in the shortest exact unit `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else {
        let secs = d.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        }
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
