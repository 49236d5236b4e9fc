//! In-memory collection.
//!
//! [`MemoryCollection`] is both a [`DocumentStore`] and a
//! [`ReactiveSource`]: writes go to an ordered in-memory list and are
//! reported back to observers, the way a latency-compensated client
//! collection behaves. It records every store call and can be told to
//! fail upcoming operations, which makes it the workhorse of the tests.

use crate::error::{SyncError, SyncResult};
use crate::source::{EventSink, ObserveHandle, ReactiveSource};
use crate::store::{DocumentStore, Modifier, StoreCall};
use livelist_core::{ChangeEvent, DocId, Document, FieldChanges, KeyedOrderedList};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// When writes are reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoMode {
    /// Report each write to observers before the write returns.
    #[default]
    Immediate,
    /// Hold reports until [`MemoryCollection::release_held`] is called,
    /// simulating a slow server confirmation.
    Held,
}

struct CollectionState {
    docs: KeyedOrderedList,
    observers: Vec<(u64, EventSink)>,
    next_observer: u64,
    calls: Vec<StoreCall>,
    echo: EchoMode,
    held: Vec<ChangeEvent>,
    failures: VecDeque<(&'static str, String)>,
}

impl CollectionState {
    fn take_failure(&mut self, op: &'static str) -> Option<SyncError> {
        let index = self.failures.iter().position(|(o, _)| *o == op)?;
        let (_, message) = self.failures.remove(index)?;
        Some(SyncError::store(op, message))
    }

    /// Routes a write event according to the echo mode and returns the
    /// sinks it must be delivered to now.
    fn route(&mut self, event: Option<ChangeEvent>) -> (Vec<EventSink>, Vec<ChangeEvent>) {
        let Some(event) = event else {
            return (Vec::new(), Vec::new());
        };
        match self.echo {
            EchoMode::Immediate => (self.sinks(), vec![event]),
            EchoMode::Held => {
                self.held.push(event);
                (Vec::new(), Vec::new())
            }
        }
    }

    fn sinks(&self) -> Vec<EventSink> {
        self.observers.iter().map(|(_, sink)| sink.clone()).collect()
    }
}

/// An ordered in-memory document collection.
pub struct MemoryCollection {
    name: String,
    state: Arc<Mutex<CollectionState>>,
}

impl MemoryCollection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_documents(name, Vec::new())
    }

    /// Creates a collection holding `docs` in order.
    ///
    /// Drafts are assigned fresh ids.
    pub fn with_documents(name: impl Into<String>, docs: Vec<Document>) -> Self {
        let docs = docs
            .into_iter()
            .map(|mut doc| {
                doc.id.get_or_insert_with(DocId::random);
                doc
            })
            .collect();
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(CollectionState {
                docs: KeyedOrderedList::from_documents(docs),
                observers: Vec::new(),
                next_observer: 1,
                calls: Vec::new(),
                echo: EchoMode::Immediate,
                held: Vec::new(),
                failures: VecDeque::new(),
            })),
        }
    }

    /// Sets the echo mode. Switching to `Immediate` does not release
    /// held events.
    pub fn set_echo(&self, echo: EchoMode) {
        self.state.lock().echo = echo;
    }

    /// Makes the next `op` call ("insert", "update" or "remove") fail.
    pub fn fail_next(&self, op: &'static str, message: impl Into<String>) {
        self.state.lock().failures.push_back((op, message.into()));
    }

    /// Returns the documents in order.
    pub fn documents(&self) -> Vec<Document> {
        self.state.lock().docs.snapshot()
    }

    /// Returns the document with the given id.
    pub fn get(&self, id: &DocId) -> Option<Document> {
        self.state.lock().docs.find(id).cloned()
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every store call received so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Returns and forgets the recorded store calls.
    pub fn take_calls(&self) -> Vec<StoreCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Returns the number of active observers.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Returns the number of held events.
    pub fn held_count(&self) -> usize {
        self.state.lock().held.len()
    }

    /// Delivers held events to observers as one batch. Returns the number
    /// of events released.
    pub fn release_held(&self) -> usize {
        let (sinks, batch) = {
            let mut state = self.state.lock();
            (state.sinks(), std::mem::take(&mut state.held))
        };
        let count = batch.len();
        deliver(&sinks, batch);
        count
    }

    /// Applies a server-originated batch and delivers it to observers.
    ///
    /// Published batches bypass the echo mode and the call log.
    pub fn publish(&self, batch: Vec<ChangeEvent>) -> SyncResult<()> {
        let sinks = {
            let mut state = self.state.lock();
            for event in &batch {
                state.docs.apply(event)?;
            }
            state.sinks()
        };
        deliver(&sinks, batch);
        Ok(())
    }
}

fn deliver(sinks: &[EventSink], batch: Vec<ChangeEvent>) {
    if batch.is_empty() {
        return;
    }
    for sink in sinks {
        sink.deliver(batch.clone());
    }
}

impl DocumentStore for MemoryCollection {
    fn insert(&self, mut doc: Document) -> SyncResult<DocId> {
        let (id, sinks, batch) = {
            let mut state = self.state.lock();
            state.calls.push(StoreCall::Insert { doc: doc.clone() });
            if let Some(err) = state.take_failure("insert") {
                return Err(err);
            }
            let id = doc.id.get_or_insert_with(DocId::random).clone();
            if state.docs.contains(&id) {
                return Err(SyncError::store("insert", format!("duplicate id {id}")));
            }
            let event = ChangeEvent::added(id.clone(), doc.fields.clone(), None);
            state.docs.push(doc);
            let (sinks, batch) = state.route(Some(event));
            (id, sinks, batch)
        };
        deliver(&sinks, batch);
        Ok(id)
    }

    fn update(&self, id: &DocId, modifier: Modifier) -> SyncResult<()> {
        let (sinks, batch) = {
            let mut state = self.state.lock();
            state.calls.push(StoreCall::Update {
                id: id.clone(),
                modifier: modifier.clone(),
            });
            if let Some(err) = state.take_failure("update") {
                return Err(err);
            }
            let current = state
                .docs
                .find(id)
                .ok_or_else(|| SyncError::NotFound { id: id.clone() })?;

            let changes: FieldChanges = match modifier {
                Modifier::Set(fields) => fields
                    .into_iter()
                    .filter(|(name, value)| current.get(name) != Some(value))
                    .map(|(name, value)| (name, Some(value)))
                    .collect(),
                Modifier::Unset(names) => names
                    .into_iter()
                    .filter(|name| current.get(name).is_some())
                    .map(|name| (name, None))
                    .collect(),
            };
            if changes.is_empty() {
                return Ok(());
            }
            state.docs.merge_fields(id, &changes)?;
            state.route(Some(ChangeEvent::changed(id.clone(), changes)))
        };
        deliver(&sinks, batch);
        Ok(())
    }

    fn remove(&self, id: &DocId) -> SyncResult<()> {
        let (sinks, batch) = {
            let mut state = self.state.lock();
            state.calls.push(StoreCall::Remove { id: id.clone() });
            if let Some(err) = state.take_failure("remove") {
                return Err(err);
            }
            if state.docs.remove_by_id(id).is_none() {
                return Err(SyncError::NotFound { id: id.clone() });
            }
            state.route(Some(ChangeEvent::removed(id.clone())))
        };
        deliver(&sinks, batch);
        Ok(())
    }
}

impl ReactiveSource for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn observe(&self, sink: EventSink) -> SyncResult<Box<dyn ObserveHandle>> {
        let (id, initial) = {
            let mut state = self.state.lock();
            let id = state.next_observer;
            state.next_observer += 1;
            state.observers.push((id, sink.clone()));
            let initial: Vec<ChangeEvent> = state
                .docs
                .iter()
                .filter_map(|doc| {
                    let id = doc.id()?.clone();
                    Some(ChangeEvent::added(id, doc.fields.clone(), None))
                })
                .collect();
            (id, initial)
        };
        sink.deliver(initial);

        Ok(Box::new(MemoryObserveHandle {
            id,
            sink,
            state: Arc::downgrade(&self.state),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct MemoryObserveHandle {
    id: u64,
    sink: EventSink,
    state: Weak<Mutex<CollectionState>>,
    stopped: AtomicBool,
}

impl ObserveHandle for MemoryObserveHandle {
    fn stop(&self) {
        self.sink.close();
        if let Some(state) = self.state.upgrade() {
            state.lock().observers.retain(|(id, _)| *id != self.id);
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
