//! orbital-autoscale — metrics-driven replica decisions.
//!
//! Periodically observes load metrics for every managed target, computes
//! a desired replica count, filters it through per-direction cooldowns and
//! a scale-down look-back window, and applies the result through a
//! capacity API.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────── Autoscaler (every interval) ───────────────────┐
//!              │  ListTargets ─► TargetRegistry::sync ─► channel ─► N workers        │
//!              └──────────────────────────────────────────────┬─────────────────────┘
//!                                                             │ per target, under its lock
//!   ┌──────────┐    ┌────────────────┐    ┌─────────────────────┐    ┌─────────────────┐
//!   │ Sampler  │ ─► │ DecisionEngine │ ─► │ StabilizationFilter │ ─► │ ScalingExecutor │
//!   └────┬─────┘    └────────────────┘    └─────────────────────┘    └────────┬────────┘
//!        │ MetricsSource::query                                               │ CapacityApi::set_replicas
//! ```
//!
//! # Scaling Algorithm
//!
//! ```text
//! ratio    = observed / target_value                 (per metric)
//! proposal = current            if |ratio - 1| <= tolerance
//!            ceil(current * ratio)  otherwise
//! desired  = clamp(max(proposals), min, max)
//!
//! scale up:   only once up_cooldown has passed since the last scale-up
//! scale down: only once down_cooldown has passed since the last scale-down,
//!             and never below the highest desired value recorded within
//!             the last down_cooldown
//! ```
//!
//! Failures are scoped to a single target and reported through
//! [`TargetEvaluation`] events; only a failed `ListTargets` skips a cycle.

pub mod config;
pub mod controller;
pub mod deadline;
pub mod decision;
pub mod error;
pub mod events;
pub mod executor;
pub mod prometheus;
pub mod registry;
pub mod sampler;
pub mod source;
pub mod stabilization;
pub mod types;

pub use config::{AutoscaleConfig, RetryConfig, format_duration, parse_duration};
pub use controller::{Autoscaler, ControllerStatus};
pub use deadline::Deadline;
pub use decision::DecisionEngine;
pub use error::{AutoscaleError, AutoscaleResult, CapacityOp, SourceError};
pub use events::{CycleReport, CycleSummary, Outcome, TargetEvaluation};
pub use executor::ScalingExecutor;
pub use prometheus::render_prometheus;
pub use registry::{Target, TargetHandle, TargetRegistry};
pub use sampler::{SampleSet, Sampler};
pub use source::{BoxFuture, CapacityApi, MetricsSource};
pub use stabilization::{Admission, StabilizationFilter, Verdict};
pub use types::*;
