//! StateStore — redb-backed persistence for workloads and readings.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(READINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or update a workload record.
    pub fn put_workload(&self, record: &WorkloadRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "workload stored");
        Ok(())
    }

    /// Create or replace a workload in one write transaction.
    ///
    /// `build` receives the stored record, if any, and returns the record
    /// to write; it is validated before insertion. Reading and writing under
    /// the same transaction keeps a concurrent `set_replicas` from being
    /// overwritten by a stale count. Returns the stored record and whether
    /// it was newly created.
    pub fn upsert_workload<F>(&self, key: &str, build: F) -> StateResult<(WorkloadRecord, bool)>
    where
        F: FnOnce(Option<&WorkloadRecord>) -> WorkloadRecord,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        let created;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let existing: Option<WorkloadRecord> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };
            created = existing.is_none();

            let next = build(existing.as_ref());
            if next.table_key() != key {
                return Err(StateError::Invalid(format!(
                    "record key {} does not match {key}",
                    next.table_key()
                )));
            }
            next.validate()?;

            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
            record = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, created, "workload upserted");
        Ok((record, created))
    }

    /// Get a workload by namespace/name key.
    pub fn get_workload(&self, key: &str) -> StateResult<Option<WorkloadRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: WorkloadRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all workloads, ordered by key.
    pub fn list_workloads(&self) -> StateResult<Vec<WorkloadRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: WorkloadRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete a workload and all of its readings. Returns true if it existed.
    pub fn delete_workload(&self, key: &str) -> StateResult<bool> {
        let reading_keys = self.reading_keys_with_prefix(&format!("{key}:"))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();

            let mut readings = txn.open_table(READINGS).map_err(map_err!(Table))?;
            for k in &reading_keys {
                readings.remove(k.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, readings = reading_keys.len(), "workload deleted");
        Ok(existed)
    }

    /// Set the replica count of an existing workload.
    pub fn set_replicas(&self, key: &str, replicas: u32) -> StateResult<WorkloadRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let mut current: WorkloadRecord = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.to_string())),
            };
            current.replicas = replicas;
            current.updated_at = epoch_secs();

            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
            record = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, replicas, "replicas updated");
        Ok(record)
    }

    // ── Readings ───────────────────────────────────────────────────

    /// Insert a metric reading. A reading at the same epoch replaces the
    /// previous one.
    pub fn put_reading(&self, reading: &MetricReading) -> StateResult<()> {
        let key = reading.table_key();
        let value = serde_json::to_vec(reading).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(READINGS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Readings for one workload/metric series with `from <= epoch <= to`,
    /// oldest first.
    pub fn readings_in_range(
        &self,
        workload_id: &str,
        metric: &str,
        from: u64,
        to: u64,
    ) -> StateResult<Vec<MetricReading>> {
        if from > to {
            return Ok(Vec::new());
        }
        let start = reading_key(workload_id, metric, from);
        let end = reading_key(workload_id, metric, to);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(READINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let reading: MetricReading =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(reading);
        }
        Ok(results)
    }

    /// Delete every reading older than `before` (unix seconds). Returns
    /// the number deleted.
    pub fn prune_readings(&self, before: u64) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(READINGS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let reading: MetricReading =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if reading.epoch < before {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        if keys.is_empty() {
            return Ok(0);
        }

        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(READINGS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, before, "readings pruned");
        Ok(count)
    }

    fn reading_keys_with_prefix(&self, prefix: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(READINGS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                keys.push(key.value().to_string());
            }
        }
        Ok(keys)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
