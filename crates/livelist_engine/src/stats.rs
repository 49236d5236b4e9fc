//! Synchronization statistics.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Counters describing both directions of one synced list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Remote batches applied to the list.
    pub batches_applied: u64,
    /// Remote events applied to the list.
    pub events_applied: u64,
    /// Remote events discarded because the observation stopped mid-batch.
    pub events_dropped: u64,
    /// Remote batches aborted by an inconsistent event.
    pub batch_errors: u64,
    /// Local change detection cycles that found at least one edit.
    pub detection_cycles: u64,
    /// Inserts issued for local additions.
    pub local_inserts: u64,
    /// Updates issued for local field changes.
    pub local_updates: u64,
    /// Removes issued for local deletions.
    pub local_removes: u64,
    /// Store calls that failed during write-back.
    pub store_failures: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Statistics shared between the reconcilers of one list.
pub(crate) type SharedStats = Arc<RwLock<SyncStats>>;

impl SyncStats {
    /// Records an error message.
    pub(crate) fn record_error(&mut self, error: &impl ToString) {
        self.last_error = Some(error.to_string());
    }
}
