//! Reactive source abstraction.
//!
//! A reactive source runs one ordered query and reports how its result
//! evolves as batches of [`ChangeEvent`]s. Observing a source returns a
//! handle; stopping the handle guarantees no further batches are delivered
//! to the sink, including batches the source had already started sending.

use crate::error::SyncResult;
use livelist_core::ChangeEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type DeliverFn = dyn Fn(Vec<ChangeEvent>, &AtomicBool) + Send + Sync;

/// Receiving end of an observation.
///
/// Cloning yields another handle to the same sink. Once closed, a sink
/// drops every batch handed to it.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<DeliverFn>,
    active: Arc<AtomicBool>,
}

impl EventSink {
    /// Creates an open sink.
    ///
    /// `deliver` receives each batch together with the sink's active flag,
    /// so a consumer can stop mid-batch once the sink is closed.
    pub fn new(deliver: impl Fn(Vec<ChangeEvent>, &AtomicBool) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Delivers a batch. Empty batches and closed sinks are ignored.
    pub fn deliver(&self, batch: Vec<ChangeEvent>) {
        if batch.is_empty() || !self.is_active() {
            return;
        }
        (self.deliver)(batch, &self.active);
    }

    /// Returns true until the sink is closed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Closes the sink.
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A running observation.
pub trait ObserveHandle: Send + Sync {
    /// Stops the observation. No batch is delivered after this returns.
    fn stop(&self);

    /// Returns true once stopped.
    fn is_stopped(&self) -> bool;
}

/// A source of ordered change events for one query.
pub trait ReactiveSource: Send + Sync {
    /// Name of the underlying collection, for diagnostics.
    fn name(&self) -> &str;

    /// Starts observing.
    ///
    /// The current result set may be delivered synchronously, before this
    /// returns, as one batch of `Added` events.
    fn observe(&self, sink: EventSink) -> SyncResult<Box<dyn ObserveHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn closed_sink_drops_batches() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let received = Arc::clone(&received);
            EventSink::new(move |batch, _| received.lock().extend(batch))
        };

        sink.deliver(vec![ChangeEvent::removed("1")]);
        sink.clone().close();
        sink.deliver(vec![ChangeEvent::removed("2")]);

        assert_eq!(*received.lock(), vec![ChangeEvent::removed("1")]);
        assert!(!sink.is_active());
    }

    #[test]
    fn empty_batches_are_not_delivered() {
        let calls = Arc::new(Mutex::new(0));
        let sink = {
            let calls = Arc::clone(&calls);
            EventSink::new(move |_, _| *calls.lock() += 1)
        };
        sink.deliver(Vec::new());
        assert_eq!(*calls.lock(), 0);
    }
}
