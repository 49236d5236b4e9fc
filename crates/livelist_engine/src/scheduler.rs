//! Cooperative single-threaded scheduler.
//!
//! The event loop models a task queue with two kinds of work:
//!
//! - **Flushes**: requested with [`EventLoop::request_flush`] and coalesced,
//!   so any number of requests within one turn produce a single flush. A
//!   flush runs every registered watcher until none of them reports a change.
//! - **Deferred tasks**: queued with [`EventLoop::defer`] and run after the
//!   flush of the turn they are picked up in. A task deferred while a turn is
//!   running waits for the next turn.
//!
//! One turn therefore runs the pending flush and then the tasks queued before
//! the turn began. This is the "after the current synchronous cycle settles"
//! boundary the reentrancy guard relies on.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// A change watcher. Returns true if it found and handled a change.
pub type Watcher = Arc<dyn Fn() -> bool + Send + Sync>;

/// Handle identifying a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Turns run.
    pub turns: u64,
    /// Flushes run.
    pub flushes: u64,
    /// Flush requests received, including coalesced ones.
    pub flush_requests: u64,
    /// Deferred tasks run.
    pub tasks_run: u64,
}

struct LoopState {
    deferred: VecDeque<Task>,
    flush_requested: bool,
    flushing: bool,
    watchers: Vec<(WatchId, Watcher)>,
    next_watch_id: u64,
    stats: LoopStats,
}

/// A cooperative task queue with coalesced flushes.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct EventLoop {
    state: Arc<Mutex<LoopState>>,
    max_flush_passes: usize,
}

impl EventLoop {
    /// Creates an empty event loop.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState {
                deferred: VecDeque::new(),
                flush_requested: false,
                flushing: false,
                watchers: Vec::new(),
                next_watch_id: 1,
                stats: LoopStats::default(),
            })),
            max_flush_passes: 10,
        }
    }

    /// Sets how many watcher passes a flush may run before failing.
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }

    /// Queues a task for the next turn.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        self.state.lock().deferred.push_back(Box::new(task));
    }

    /// Requests a flush. Redundant requests before the flush are coalesced.
    pub fn request_flush(&self) {
        let mut state = self.state.lock();
        state.flush_requested = true;
        state.stats.flush_requests += 1;
    }

    /// Returns true while a flush is running.
    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    /// Returns true if a flush was requested and has not run yet.
    pub fn flush_pending(&self) -> bool {
        self.state.lock().flush_requested
    }

    /// Returns true if a flush or deferred task is waiting.
    pub fn has_pending_work(&self) -> bool {
        let state = self.state.lock();
        state.flush_requested || !state.deferred.is_empty()
    }

    /// Registers a watcher to run on every flush.
    pub fn watch(&self, watcher: Watcher) -> WatchId {
        let mut state = self.state.lock();
        let id = WatchId(state.next_watch_id);
        state.next_watch_id += 1;
        state.watchers.push((id, watcher));
        id
    }

    /// Deregisters a watcher. Returns false if it was not registered.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut state = self.state.lock();
        let before = state.watchers.len();
        state.watchers.retain(|(watch_id, _)| *watch_id != id);
        state.watchers.len() != before
    }

    /// Returns true if the watcher is registered.
    pub fn is_watching(&self, id: WatchId) -> bool {
        self.state
            .lock()
            .watchers
            .iter()
            .any(|(watch_id, _)| *watch_id == id)
    }

    /// Returns the number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> LoopStats {
        self.state.lock().stats
    }

    /// Runs a flush now and returns the number of passes it took.
    ///
    /// A flush requested while one is already running is queued for the
    /// next turn instead of nesting.
    pub fn flush(&self) -> SyncResult<usize> {
        {
            let mut state = self.state.lock();
            if state.flushing {
                state.flush_requested = true;
                return Ok(0);
            }
            state.flushing = true;
            state.flush_requested = false;
            state.stats.flushes += 1;
        }

        let result = self.run_passes();
        self.state.lock().flushing = false;
        result
    }

    fn run_passes(&self) -> SyncResult<usize> {
        for pass in 1..=self.max_flush_passes {
            let watchers = self.state.lock().watchers.clone();
            let mut dirty = false;
            for (id, watcher) in watchers {
                // A watcher may have been removed by an earlier one.
                if !self.is_watching(id) {
                    continue;
                }
                dirty |= watcher();
            }
            if !dirty {
                return Ok(pass);
            }
        }
        tracing::error!(passes = self.max_flush_passes, "flush did not settle");
        Err(SyncError::FlushLimit {
            passes: self.max_flush_passes,
        })
    }

    /// Runs one turn: the pending flush, then the tasks queued before the
    /// turn started. Returns true if any work was done.
    pub fn run_turn(&self) -> SyncResult<bool> {
        let flush = std::mem::take(&mut self.state.lock().flush_requested);
        if flush {
            self.flush()?;
        }

        let tasks: Vec<Task> = self.state.lock().deferred.drain(..).collect();
        let task_count = tasks.len() as u64;
        for task in tasks {
            task();
        }

        let mut state = self.state.lock();
        state.stats.turns += 1;
        state.stats.tasks_run += task_count;
        Ok(flush || task_count > 0)
    }

    /// Runs turns until no work is left. Returns the number of turns run.
    pub fn run_until_idle(&self, max_turns: usize) -> SyncResult<usize> {
        let mut turns = 0;
        while self.has_pending_work() {
            if turns == max_turns {
                return Err(SyncError::TurnLimit { turns });
            }
            self.run_turn()?;
            turns += 1;
        }
        Ok(turns)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventLoop")
            .field("deferred", &state.deferred.len())
            .field("flush_requested", &state.flush_requested)
            .field("watchers", &state.watchers.len())
            .field("stats", &state.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn deferred_tasks_run_in_order() {
        let events = EventLoop::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            events.defer(move || log.lock().push(i));
        }
        assert!(events.run_turn().unwrap());
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(!events.has_pending_work());
    }

    #[test]
    fn task_deferred_during_turn_waits_for_next_turn() {
        let events = EventLoop::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let events2 = events.clone();
            let hits = Arc::clone(&hits);
            events.defer(move || {
                let hits = Arc::clone(&hits);
                events2.defer(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        events.run_turn().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        events.run_turn().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flush_requests_coalesce() {
        let events = EventLoop::new();
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = Arc::clone(&runs);
            events.watch(Arc::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                false
            }));
        }

        events.request_flush();
        events.request_flush();
        events.request_flush();
        assert_eq!(events.run_until_idle(10).unwrap(), 1);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let stats = events.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.flush_requests, 3);
    }

    #[test]
    fn flush_runs_before_deferred_tasks() {
        let events = EventLoop::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = Arc::clone(&log);
            events.watch(Arc::new(move || {
                log.lock().push("flush");
                false
            }));
        }
        {
            let log = Arc::clone(&log);
            events.defer(move || log.lock().push("task"));
        }
        events.request_flush();
        events.run_turn().unwrap();
        assert_eq!(*log.lock(), vec!["flush", "task"]);
    }

    #[test]
    fn dirty_watcher_reruns_until_clean() {
        let events = EventLoop::new();
        let remaining = Arc::new(AtomicUsize::new(2));
        {
            let remaining = Arc::clone(&remaining);
            events.watch(Arc::new(move || {
                remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            }));
        }
        assert_eq!(events.flush().unwrap(), 3);
    }

    #[test]
    fn runaway_watcher_hits_flush_limit() {
        let events = EventLoop::new().with_max_flush_passes(4);
        events.watch(Arc::new(|| true));
        assert_eq!(
            events.flush().unwrap_err(),
            SyncError::FlushLimit { passes: 4 }
        );
        assert!(!events.is_flushing());
    }

    #[test]
    fn unwatch_during_flush_skips_watcher() {
        let events = EventLoop::new();
        let second_runs = Arc::new(AtomicUsize::new(0));
        let second_id = Arc::new(Mutex::new(None));
        {
            let events2 = events.clone();
            let second_id = Arc::clone(&second_id);
            events.watch(Arc::new(move || {
                if let Some(id) = *second_id.lock() {
                    events2.unwatch(id);
                }
                false
            }));
        }
        {
            let second_runs = Arc::clone(&second_runs);
            let id = events.watch(Arc::new(move || {
                second_runs.fetch_add(1, Ordering::SeqCst);
                false
            }));
            *second_id.lock() = Some(id);
        }

        events.flush().unwrap();
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);
        assert_eq!(events.watcher_count(), 1);
    }

    #[test]
    fn nested_flush_request_is_deferred() {
        let events = EventLoop::new();
        {
            let events2 = events.clone();
            events.watch(Arc::new(move || {
                // Re-entrant flush from inside a watcher must not recurse.
                assert_eq!(events2.flush().unwrap(), 0);
                false
            }));
        }
        events.flush().unwrap();
        assert!(events.flush_pending());
    }

    #[test]
    fn turn_limit() {
        let events = EventLoop::new();
        fn requeue(events: EventLoop) {
            let next = events.clone();
            events.defer(move || requeue(next));
        }
        requeue(events.clone());
        assert_eq!(
            events.run_until_idle(5).unwrap_err(),
            SyncError::TurnLimit { turns: 5 }
        );
    }
}
