//! Local change detection and write-back.
//!
//! The downstream reconciler keeps a baseline snapshot of the list. On each
//! detection cycle it diffs the baseline against the current contents and
//! replays the edits against the document store:
//!
//! | edit        | store calls                                         |
//! |-------------|-----------------------------------------------------|
//! | `AddedAt`   | upsert; the item leaves the list until it is echoed |
//! | `RemovedAt` | `remove(id)`                                        |
//! | `ChangedAt` | `update(id, $set)` and/or `update(id, $unset)`      |
//! | `MovedTo`   | none, order is not persisted                        |
//!
//! Detection only runs while the reconciler is attached, and it is only
//! attached while the reentrancy guard is idle.

use crate::error::{SyncError, SyncResult};
use crate::guard::ReentrancyGuard;
use crate::persist::{self, ModifierKind, StoreAction};
use crate::scheduler::{EventLoop, WatchId};
use crate::stats::SharedStats;
use crate::store::{DocumentStore, Modifier};
use crate::SharedList;
use livelist_core::{
    ChangeEvent, CoreResult, DiffPrimitive, DocId, Document, Edit, Fields, KeyedOrderedList,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// List contents that detection compares against.
#[derive(Debug, Clone, Default)]
pub(crate) struct Baseline {
    docs: Vec<Document>,
    version: u64,
}

impl Baseline {
    pub(crate) fn capture(list: &KeyedOrderedList) -> Self {
        Self {
            docs: list.snapshot(),
            version: list.version(),
        }
    }

    /// Applies a remote event to the baseline contents, keeping its
    /// version. Removing a document the baseline lacks is a no-op.
    pub(crate) fn apply(&mut self, event: &ChangeEvent) -> CoreResult<()> {
        let mut docs = KeyedOrderedList::from_documents(std::mem::take(&mut self.docs));
        let result = match event {
            ChangeEvent::Removed { id } if !docs.contains(id) => Ok(()),
            _ => docs.apply(event).map(|_| ()),
        };
        self.docs = docs.into_documents();
        result
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }
}

/// Outcome of one detection cycle.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    /// Edits found between the baseline and the list.
    pub edits: Vec<Edit>,
    /// Store calls issued.
    pub writes: usize,
    /// Store calls that failed.
    pub failures: Vec<SyncError>,
}

impl DetectionReport {
    /// Returns true if no edit was found.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LocalWrite {
    Upsert(Document),
    Delete(DocId),
    Set(DocId, Fields),
    Unset(DocId, Vec<String>),
}

struct Registration {
    watch: Option<WatchId>,
    baseline: Baseline,
}

/// Replays local list edits to the document store.
pub struct DownstreamReconciler {
    list: SharedList,
    store: Arc<dyn DocumentStore>,
    diff: Arc<dyn DiffPrimitive>,
    guard: Arc<ReentrancyGuard>,
    events: EventLoop,
    stats: SharedStats,
    enabled: bool,
    registration: Mutex<Registration>,
}

impl DownstreamReconciler {
    pub(crate) fn new(
        list: SharedList,
        store: Arc<dyn DocumentStore>,
        diff: Arc<dyn DiffPrimitive>,
        guard: Arc<ReentrancyGuard>,
        events: EventLoop,
        stats: SharedStats,
        enabled: bool,
    ) -> Self {
        Self {
            list,
            store,
            diff,
            guard,
            events,
            stats,
            enabled,
            registration: Mutex::new(Registration {
                watch: None,
                baseline: Baseline::default(),
            }),
        }
    }

    /// Returns true if local edits are written back at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true while a watcher is registered on the event loop.
    pub fn is_attached(&self) -> bool {
        self.registration.lock().watch.is_some()
    }

    /// Starts watching with the current list as baseline.
    ///
    /// Does nothing while write-back is disabled or the guard is
    /// suppressed; the settling window attaches in that case.
    pub fn attach(self: &Arc<Self>) -> bool {
        if !self.enabled || self.guard.is_suppressed() {
            return false;
        }
        let mut registration = self.registration.lock();
        if registration.watch.is_none() {
            registration.baseline = Baseline::capture(&self.list.lock());
            registration.watch = Some(self.register());
        }
        true
    }

    /// Stops watching. The baseline is kept until the next attach.
    pub fn detach(&self) {
        let watch = self.registration.lock().watch.take();
        if let Some(id) = watch {
            self.events.unwatch(id);
            trace!("downstream detached");
        }
    }

    /// Re-attaches after a suppression window, comparing future cycles
    /// against `baseline`.
    ///
    /// If the list already moved past `baseline`, a flush is requested so
    /// the consumer's edits made inside the window are still detected.
    pub(crate) fn resume(self: &Arc<Self>, baseline: Baseline) {
        if !self.enabled {
            return;
        }
        let behind = {
            let mut registration = self.registration.lock();
            let behind = self.list.lock().version() != baseline.version;
            registration.baseline = baseline;
            if registration.watch.is_none() {
                registration.watch = Some(self.register());
            }
            behind
        };
        debug!(behind, "downstream resumed");
        if behind {
            self.events.request_flush();
        }
    }

    fn register(self: &Arc<Self>) -> WatchId {
        let weak = Arc::downgrade(self);
        self.events.watch(Arc::new(move || {
            weak.upgrade()
                .map_or(false, |downstream| downstream.on_flush())
        }))
    }

    fn on_flush(&self) -> bool {
        match self.detect_now() {
            Ok(report) => !report.is_empty(),
            Err(err) => {
                error!(error = %err, "local change detection failed");
                self.stats.write().record_error(&err);
                false
            }
        }
    }

    /// Runs one detection cycle now.
    ///
    /// Returns an empty report when detached or suppressed. Store failures
    /// are collected in the report; the cycle itself only fails if the list
    /// could not be updated.
    pub fn detect_now(&self) -> SyncResult<DetectionReport> {
        if self.guard.is_suppressed() {
            return Ok(DetectionReport::default());
        }
        let edits = {
            let mut registration = self.registration.lock();
            if registration.watch.is_none() {
                return Ok(DetectionReport::default());
            }
            let mut list = self.list.lock();
            if list.version() == registration.baseline.version {
                return Ok(DetectionReport::default());
            }
            let edits = self.diff.diff(&registration.baseline.docs, list.as_slice());

            // Additions leave the list; the store echo puts them back at the
            // position the source decides.
            let mut added: Vec<usize> = edits
                .iter()
                .filter_map(|edit| match edit {
                    Edit::AddedAt { index, .. } => Some(*index),
                    _ => None,
                })
                .collect();
            added.sort_unstable_by(|a, b| b.cmp(a));
            for index in added {
                list.remove(index)?;
            }
            registration.baseline = Baseline::capture(&list);
            edits
        };

        if edits.is_empty() {
            return Ok(DetectionReport::default());
        }

        self.stats.write().detection_cycles += 1;
        debug!(edits = edits.len(), "local edits detected");

        let writes = plan_writes(&edits);
        let failures = self.execute(&writes);
        Ok(DetectionReport {
            edits,
            writes: writes.len(),
            failures,
        })
    }

    fn execute(&self, writes: &[LocalWrite]) -> Vec<SyncError> {
        let mut failures = Vec::new();
        for write in writes {
            trace!(?write, "write-back");
            let result = match write {
                LocalWrite::Upsert(doc) => {
                    persist::upsert(self.store.as_ref(), doc, ModifierKind::Set)
                        .map(|outcome| outcome.action)
                }
                LocalWrite::Delete(id) => self.store.remove(id).map(|()| StoreAction::Removed),
                LocalWrite::Set(id, fields) => self
                    .store
                    .update(id, Modifier::Set(fields.clone()))
                    .map(|()| StoreAction::Updated),
                LocalWrite::Unset(id, names) => self
                    .store
                    .update(id, Modifier::Unset(names.clone()))
                    .map(|()| StoreAction::Updated),
            };

            let mut stats = self.stats.write();
            match result {
                Ok(StoreAction::Inserted) => stats.local_inserts += 1,
                Ok(StoreAction::Updated) => stats.local_updates += 1,
                Ok(StoreAction::Removed) => stats.local_removes += 1,
                Err(err) => {
                    warn!(error = %err, "write-back failed");
                    stats.store_failures += 1;
                    stats.record_error(&err);
                    failures.push(err);
                }
            }
        }
        failures
    }
}

fn plan_writes(edits: &[Edit]) -> Vec<LocalWrite> {
    let mut writes = Vec::new();
    for edit in edits {
        match edit {
            Edit::AddedAt { item, .. } => writes.push(LocalWrite::Upsert(item.clone())),
            Edit::RemovedAt { id, .. } => writes.push(LocalWrite::Delete(id.clone())),
            Edit::ChangedAt { id, set, unset, .. } => {
                if !set.is_empty() {
                    writes.push(LocalWrite::Set(id.clone(), set.clone()));
                }
                if !unset.is_empty() {
                    writes.push(LocalWrite::Unset(id.clone(), unset.clone()));
                }
            }
            // Order is not persisted.
            Edit::MovedTo { id, from, to, .. } => trace!(%id, from, to, "move ignored"),
        }
    }
    writes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_edit_splits_into_set_and_unset() {
        let edits = vec![Edit::ChangedAt {
            id: "1".into(),
            set: Fields::from([("y".to_string(), json!(2))]),
            unset: vec!["x".into()],
            index: 0,
        }];
        assert_eq!(
            plan_writes(&edits),
            vec![
                LocalWrite::Set("1".into(), Fields::from([("y".to_string(), json!(2))])),
                LocalWrite::Unset("1".into(), vec!["x".into()]),
            ]
        );
    }

    #[test]
    fn baseline_follows_remote_events() {
        let mut list = KeyedOrderedList::from_documents(vec![Document::with_id("1")]);
        let mut baseline = Baseline::capture(&list);
        list.push(Document::with_id("local"));

        baseline
            .apply(&ChangeEvent::added("2", Fields::new(), Some("1".into())))
            .unwrap();
        baseline.apply(&ChangeEvent::removed("gone")).unwrap();

        assert_eq!(baseline.docs, vec![Document::with_id("2"), Document::with_id("1")]);
        assert_eq!(baseline.version(), 0);
        assert!(baseline
            .apply(&ChangeEvent::moved_before("9", None))
            .is_err());
    }

    #[test]
    fn empty_halves_are_skipped() {
        let edits = vec![Edit::ChangedAt {
            id: "1".into(),
            set: Fields::new(),
            unset: vec!["x".into()],
            index: 0,
        }];
        assert_eq!(
            plan_writes(&edits),
            vec![LocalWrite::Unset("1".into(), vec!["x".into()])]
        );
    }

    #[test]
    fn moves_plan_nothing() {
        let edits = vec![Edit::MovedTo {
            id: "1".into(),
            item: Document::with_id("1"),
            from: 0,
            to: 2,
        }];
        assert!(plan_writes(&edits).is_empty());
    }

    #[test]
    fn additions_and_removals() {
        let draft = Document::new().with("a", 1);
        let edits = vec![
            Edit::RemovedAt {
                id: "9".into(),
                item: Document::with_id("9"),
                index: 0,
            },
            Edit::AddedAt {
                id: None,
                item: draft.clone(),
                index: 0,
            },
        ];
        assert_eq!(
            plan_writes(&edits),
            vec![LocalWrite::Delete("9".into()), LocalWrite::Upsert(draft)]
        );
    }
}
