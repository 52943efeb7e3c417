//! redb table definitions for the Orbital state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Workload records keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Metric readings keyed by `{workload_id}:{metric}:{epoch:020}`.
pub const READINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("readings");
