//! Target registry — the process-wide set of managed targets.
//!
//! Each target sits behind its own `tokio::sync::Mutex`. A worker holds
//! that lock for a target's whole pipeline, which serializes cycles per
//! target while letting distinct targets run in parallel. Cooldowns and
//! decision history live inside the `Target`, so removing a target from
//! the registry frees its history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::stabilization::ScaleState;
use crate::types::{TargetDescriptor, TargetId};

/// One managed target and its stabilization state.
#[derive(Debug)]
pub struct Target {
    pub descriptor: TargetDescriptor,
    /// Last replica count read from (or optimistically written to) the
    /// capacity API; `None` until the first successful read.
    pub current_replicas: Option<u32>,
    pub scale_state: ScaleState,
}

impl Target {
    pub fn new(descriptor: TargetDescriptor, history_capacity: usize) -> Self {
        Self {
            descriptor,
            current_replicas: None,
            scale_state: ScaleState::new(history_capacity),
        }
    }

    pub fn id(&self) -> &TargetId {
        &self.descriptor.id
    }
}

pub type TargetHandle = Arc<Mutex<Target>>;

/// Counts from one registry sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub invalid: usize,
}

pub struct TargetRegistry {
    targets: RwLock<HashMap<TargetId, TargetHandle>>,
    history_capacity: usize,
}

impl TargetRegistry {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            history_capacity,
        }
    }

    /// Reconcile the registry against a fresh enumeration.
    ///
    /// New targets are added with empty history, existing ones keep their
    /// state but pick up new bounds and metrics, and targets missing from
    /// `descriptors` are dropped. Invalid descriptors are skipped; an
    /// already-registered target whose new descriptor is invalid is removed.
    pub async fn sync(&self, descriptors: Vec<TargetDescriptor>) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let mut seen = std::collections::HashSet::new();
        let mut targets = self.targets.write().await;

        for descriptor in descriptors {
            if let Err(e) = descriptor.validate() {
                warn!(target_id = %descriptor.id, error = %e, "skipping invalid target");
                outcome.invalid += 1;
                continue;
            }
            seen.insert(descriptor.id.clone());

            match targets.get(&descriptor.id) {
                Some(handle) => {
                    let mut target = handle.lock().await;
                    if target.descriptor != descriptor {
                        debug!(target_id = %descriptor.id, "target descriptor updated");
                        target.descriptor = descriptor;
                        outcome.updated += 1;
                    }
                }
                None => {
                    debug!(target_id = %descriptor.id, "target registered");
                    let id = descriptor.id.clone();
                    let target = Target::new(descriptor, self.history_capacity);
                    targets.insert(id, Arc::new(Mutex::new(target)));
                    outcome.added += 1;
                }
            }
        }

        let before = targets.len();
        targets.retain(|id, _| seen.contains(id));
        outcome.removed = before - targets.len();

        if outcome.added + outcome.removed > 0 {
            info!(
                added = outcome.added,
                removed = outcome.removed,
                total = targets.len(),
                "target registry changed"
            );
        }
        outcome
    }

    /// Snapshot of all handles with their IDs, sorted by target ID.
    ///
    /// The ID travels alongside the handle so a caller can report on a
    /// target whose lock it never managed to take.
    pub async fn handles(&self) -> Vec<(TargetId, TargetHandle)> {
        let targets = self.targets.read().await;
        let mut entries: Vec<(TargetId, TargetHandle)> = targets
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn get(&self, id: &str) -> Option<TargetHandle> {
        self.targets.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}
