//! orbital-state — embedded store for workloads and metric readings.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the workloads the autoscaler manages and the raw metric
//! readings it samples.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Workloads are keyed `{namespace}/{name}`; readings are keyed
//! `{workload_id}:{metric}:{epoch}` with a zero-padded epoch, so one
//! workload/metric series is a contiguous, time-ordered key range.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
