//! Remote-to-list reconciliation.
//!
//! The upstream reconciler observes one reactive source and applies each
//! batch of change events to the shared list, in arrival order, inside a
//! suppression window of the reentrancy guard.
//!
//! Batches never interleave. A batch that arrives while another is being
//! applied, for example the store's echo of a write made by the drain step,
//! waits in an inbox and is applied after the current one, so the list sees
//! events in the order the source sent them.

use crate::downstream::{Baseline, DownstreamReconciler};
use crate::error::SyncResult;
use crate::guard::ReentrancyGuard;
use crate::scheduler::EventLoop;
use crate::source::{EventSink, ObserveHandle, ReactiveSource};
use crate::stats::SharedStats;
use crate::SharedList;
use livelist_core::ChangeEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

struct Observation {
    source: String,
    sink: EventSink,
    live: Arc<AtomicBool>,
    handle: Box<dyn ObserveHandle>,
}

struct QueuedBatch {
    batch: Vec<ChangeEvent>,
    notify: bool,
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<QueuedBatch>,
    applying: bool,
}

/// Applies remote change events to the shared list.
pub struct UpstreamReconciler {
    list: SharedList,
    guard: Arc<ReentrancyGuard>,
    downstream: Arc<DownstreamReconciler>,
    events: EventLoop,
    stats: SharedStats,
    drain_before_suppress: bool,
    observation: Mutex<Option<Observation>>,
    inbox: Mutex<Inbox>,
    window: Mutex<Option<Baseline>>,
}

impl UpstreamReconciler {
    pub(crate) fn new(
        list: SharedList,
        guard: Arc<ReentrancyGuard>,
        downstream: Arc<DownstreamReconciler>,
        events: EventLoop,
        stats: SharedStats,
        drain_before_suppress: bool,
    ) -> Self {
        Self {
            list,
            guard,
            downstream,
            events,
            stats,
            drain_before_suppress,
            observation: Mutex::new(None),
            inbox: Mutex::new(Inbox::default()),
            window: Mutex::new(None),
        }
    }

    /// Starts observing `source`, stopping any previous observation first.
    ///
    /// The source's initial result set is applied without requesting a
    /// flush per batch; a single flush is requested once `observe` returns.
    pub fn observe(self: &Arc<Self>, source: &dyn ReactiveSource) -> SyncResult<()> {
        self.stop();

        let initial_load = Arc::new(AtomicBool::new(true));
        let live = Arc::new(AtomicBool::new(true));
        let sink = {
            let weak = Arc::downgrade(self);
            let initial_load = Arc::clone(&initial_load);
            let live = Arc::clone(&live);
            EventSink::new(move |batch, active| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(upstream) = weak.upgrade() {
                    let notify = !initial_load.load(Ordering::SeqCst);
                    upstream.receive(batch, notify, &live);
                }
            })
        };

        let handle = match source.observe(sink.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                sink.close();
                live.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        initial_load.store(false, Ordering::SeqCst);
        self.events.request_flush();

        info!(source = source.name(), "observation started");
        *self.observation.lock() = Some(Observation {
            source: source.name().to_string(),
            sink,
            live,
            handle,
        });
        Ok(())
    }

    /// Stops the current observation. Returns false if there was none.
    ///
    /// No batch is applied after this returns, including the rest of a
    /// batch that is being applied.
    pub fn stop(&self) -> bool {
        let Some(observation) = self.observation.lock().take() else {
            return false;
        };
        observation.sink.close();
        observation.live.store(false, Ordering::SeqCst);
        observation.handle.stop();
        info!(source = %observation.source, "observation stopped");
        true
    }

    /// Returns true while a source is observed.
    pub fn is_observing(&self) -> bool {
        self.observation.lock().is_some()
    }

    /// Applies `batch` now, or queues it behind the batch being applied.
    ///
    /// The caller that finds the inbox idle applies every queued batch in
    /// arrival order before returning. Queued batches of a stopped
    /// observation are dropped when their turn comes.
    fn receive(&self, batch: Vec<ChangeEvent>, notify: bool, live: &Arc<AtomicBool>) {
        {
            let mut inbox = self.inbox.lock();
            inbox.queue.push_back(QueuedBatch {
                batch,
                notify,
                live: Arc::clone(live),
            });
            if inbox.applying {
                trace!(queued = inbox.queue.len(), "batch queued behind current batch");
                return;
            }
            inbox.applying = true;
        }

        loop {
            let next = {
                let mut inbox = self.inbox.lock();
                let next = inbox.queue.pop_front();
                if next.is_none() {
                    inbox.applying = false;
                }
                next
            };
            let Some(queued) = next else {
                break;
            };
            // Failures are logged and counted by apply_batch.
            let _ = self.apply_batch(queued.batch, queued.notify, &queued.live);
        }
    }

    /// Applies one batch, returning the number of events applied.
    ///
    /// Events are applied strictly in order. Removing a document that is no
    /// longer listed is a no-op. The batch stops at the first other event
    /// that does not fit the list (unknown id, missing anchor, duplicate id)
    /// or as soon as `active` is cleared. The suppression
    /// window is settled one turn later in every case.
    ///
    /// When the window is still open from an earlier batch and the list was
    /// edited since, the earlier baseline is carried forward with this
    /// batch's events applied to it, so the edit is detected once the
    /// window settles.
    pub(crate) fn apply_batch(
        &self,
        batch: Vec<ChangeEvent>,
        notify: bool,
        active: &AtomicBool,
    ) -> SyncResult<usize> {
        if !active.load(Ordering::SeqCst) {
            self.stats.write().events_dropped += batch.len() as u64;
            trace!(events = batch.len(), "batch of stopped observation dropped");
            return Ok(0);
        }
        if self.drain_before_suppress {
            if let Err(err) = self.downstream.detect_now() {
                warn!(error = %err, "drain before remote batch failed");
            }
        }

        let window_open = self.guard.is_suppressed();
        let carried = self.window.lock().take().filter(|_| window_open);
        let ticket = self.guard.begin();
        self.downstream.detach();

        let mut applied = 0;
        let mut dropped = 0;
        let mut failure = None;
        let baseline = {
            let mut list = self.list.lock();
            let mut carried = carried.filter(|b| b.version() != list.version());
            for (position, event) in batch.iter().enumerate() {
                if !active.load(Ordering::SeqCst) {
                    dropped = batch.len() - position;
                    break;
                }
                let result = match event {
                    ChangeEvent::Removed { id } if !list.contains(id) => {
                        // Echo of a removal the consumer already made.
                        trace!(%id, "removed document already gone");
                        Ok(())
                    }
                    _ => list.apply(event).map(|index| {
                        trace!(kind = ?event.kind(), id = %event.id(), index, "applied");
                    }),
                };
                if let Err(err) = result {
                    error!(error = %err, "remote batch aborted");
                    failure = Some(err);
                    break;
                }
                applied += 1;
                if let Some(baseline) = &mut carried {
                    if let Err(err) = baseline.apply(event) {
                        warn!(error = %err, "pending edits absorbed into baseline");
                        carried = None;
                    }
                }
            }
            carried.unwrap_or_else(|| Baseline::capture(&list))
        };
        *self.window.lock() = Some(baseline.clone());

        {
            let mut stats = self.stats.write();
            stats.batches_applied += 1;
            stats.events_applied += applied as u64;
            stats.events_dropped += dropped as u64;
            if let Some(err) = &failure {
                stats.batch_errors += 1;
                stats.record_error(err);
            }
        }
        debug!(events = batch.len(), applied, dropped, notify, "remote batch applied");

        if notify && applied > 0 {
            self.events.request_flush();
        }
        let downstream = Arc::clone(&self.downstream);
        self.guard
            .settle_after_turn(&self.events, ticket, move || downstream.resume(baseline));

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(applied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::memory::MemoryCollection;
    use crate::stats::SyncStats;
    use livelist_core::{CoreError, Document, KeyedOrderedList, OrderedDiff};
    use parking_lot::RwLock;

    struct Fixture {
        list: SharedList,
        guard: Arc<ReentrancyGuard>,
        events: EventLoop,
        stats: SharedStats,
        upstream: Arc<UpstreamReconciler>,
    }

    fn fixture() -> Fixture {
        let list: SharedList = Arc::new(Mutex::new(KeyedOrderedList::new()));
        let guard = Arc::new(ReentrancyGuard::new());
        let events = EventLoop::new();
        let stats = Arc::new(RwLock::new(SyncStats::default()));
        let downstream = Arc::new(DownstreamReconciler::new(
            Arc::clone(&list),
            Arc::new(MemoryCollection::new("items")),
            Arc::new(OrderedDiff),
            Arc::clone(&guard),
            events.clone(),
            Arc::clone(&stats),
            true,
        ));
        let upstream = Arc::new(UpstreamReconciler::new(
            Arc::clone(&list),
            Arc::clone(&guard),
            downstream,
            events.clone(),
            Arc::clone(&stats),
            true,
        ));
        Fixture {
            list,
            guard,
            events,
            stats,
            upstream,
        }
    }

    fn ids(list: &SharedList) -> Vec<String> {
        list.lock().ids().map(ToString::to_string).collect()
    }

    #[test]
    fn batch_opens_window_until_next_turn() {
        let f = fixture();
        let active = AtomicBool::new(true);
        f.upstream
            .apply_batch(vec![ChangeEvent::added("1", Default::default(), None)], true, &active)
            .unwrap();

        assert!(f.guard.is_suppressed());
        assert!(f.events.flush_pending());
        f.events.run_until_idle(10).unwrap();
        assert!(!f.guard.is_suppressed());
    }

    #[test]
    fn anchors_resolve_against_current_state() {
        let f = fixture();
        let active = AtomicBool::new(true);
        let batch = vec![
            ChangeEvent::added("1", Default::default(), None),
            ChangeEvent::added("2", Default::default(), Some("1".into())),
            ChangeEvent::added("3", Default::default(), Some("2".into())),
        ];
        assert_eq!(f.upstream.apply_batch(batch, true, &active).unwrap(), 3);
        assert_eq!(ids(&f.list), vec!["3", "2", "1"]);
    }

    #[test]
    fn missing_anchor_aborts_batch() {
        let f = fixture();
        let active = AtomicBool::new(true);
        let batch = vec![
            ChangeEvent::added("1", Default::default(), None),
            ChangeEvent::added("2", Default::default(), Some("9".into())),
            ChangeEvent::added("3", Default::default(), None),
        ];
        let err = f.upstream.apply_batch(batch, true, &active).unwrap_err();
        assert_eq!(
            err,
            SyncError::Core(CoreError::AnchorNotFound { id: "9".into() })
        );
        assert_eq!(ids(&f.list), vec!["1"]);

        let stats = f.stats.read();
        assert_eq!(stats.batch_errors, 1);
        assert_eq!(stats.events_applied, 1);
        drop(stats);

        // The window still settles.
        f.events.run_until_idle(10).unwrap();
        assert!(!f.guard.is_suppressed());
    }

    #[test]
    fn removal_of_absent_document_is_tolerated() {
        let f = fixture();
        let active = AtomicBool::new(true);
        let batch = vec![
            ChangeEvent::added("1", Default::default(), None),
            ChangeEvent::removed("2"),
        ];
        assert_eq!(f.upstream.apply_batch(batch, true, &active).unwrap(), 2);
        assert_eq!(ids(&f.list), vec!["1"]);
        assert_eq!(f.stats.read().batch_errors, 0);
    }

    #[test]
    fn inactive_batch_is_dropped() {
        let f = fixture();
        let active = AtomicBool::new(false);
        let batch = vec![
            ChangeEvent::added("1", Default::default(), None),
            ChangeEvent::added("2", Default::default(), None),
        ];
        assert_eq!(f.upstream.apply_batch(batch, true, &active).unwrap(), 0);
        assert!(f.list.lock().is_empty());
        assert_eq!(f.stats.read().events_dropped, 2);
        assert!(!f.events.flush_pending());
        assert!(!f.guard.is_suppressed());
    }

    #[test]
    fn edit_between_batches_keeps_earlier_baseline() {
        let f = fixture();
        let active = AtomicBool::new(true);
        f.upstream
            .apply_batch(vec![ChangeEvent::added("1", Default::default(), None)], true, &active)
            .unwrap();
        f.list.lock().find_mut(&"1".into()).unwrap().set("seen", true);
        f.upstream
            .apply_batch(vec![ChangeEvent::added("2", Default::default(), None)], true, &active)
            .unwrap();

        let carried = f.upstream.window.lock().clone().unwrap();
        assert_ne!(carried.version(), f.list.lock().version());
        assert_eq!(ids(&f.list), vec!["1", "2"]);
    }

    #[test]
    fn untouched_window_takes_fresh_baseline() {
        let f = fixture();
        let active = AtomicBool::new(true);
        for id in ["1", "2"] {
            f.upstream
                .apply_batch(vec![ChangeEvent::added(id, Default::default(), None)], true, &active)
                .unwrap();
        }

        let baseline = f.upstream.window.lock().clone().unwrap();
        assert_eq!(baseline.version(), f.list.lock().version());
    }

    #[test]
    fn initial_load_requests_exactly_one_flush() {
        let f = fixture();
        let source = MemoryCollection::with_documents(
            "items",
            vec![Document::with_id("a"), Document::with_id("b")],
        );
        f.upstream.observe(&source).unwrap();

        assert_eq!(ids(&f.list), vec!["a", "b"]);
        assert_eq!(f.events.stats().flush_requests, 1);
        assert!(f.upstream.is_observing());
    }

    #[test]
    fn reobserve_stops_previous_source() {
        let f = fixture();
        let first = MemoryCollection::new("first");
        let second = MemoryCollection::new("second");
        f.upstream.observe(&first).unwrap();
        f.upstream.observe(&second).unwrap();

        assert_eq!(first.observer_count(), 0);
        assert_eq!(second.observer_count(), 1);

        first
            .publish(vec![ChangeEvent::added("x", Default::default(), None)])
            .unwrap();
        assert!(f.list.lock().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let f = fixture();
        let source = MemoryCollection::new("items");
        f.upstream.observe(&source).unwrap();
        assert!(f.upstream.stop());
        assert!(!f.upstream.stop());
        assert!(!f.upstream.is_observing());
    }
}
