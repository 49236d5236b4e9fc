//! The synced list controller.
//!
//! A [`SyncedList`] owns the shared ordered list together with both
//! reconcilers, the reentrancy guard between them, and the event loop they
//! are scheduled on. It exposes the list contents plus `save`, `remove`,
//! `subscribe` and `stop`.

use crate::config::SyncOptions;
use crate::downstream::{DetectionReport, DownstreamReconciler};
use crate::error::{SyncError, SyncResult};
use crate::guard::{GuardState, ReentrancyGuard};
use crate::persist::{self, BatchReport, ModifierKind, StoreOutcome, Target};
use crate::scheduler::EventLoop;
use crate::source::ReactiveSource;
use crate::stats::{SharedStats, SyncStats};
use crate::store::DocumentStore;
use crate::subscription::{SubscriptionHandle, SubscriptionManager};
use crate::upstream::UpstreamReconciler;
use crate::SharedList;
use livelist_core::{DiffPrimitive, DocId, Document, KeyedOrderedList, OrderedDiff, Value};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tracing::info;

type QueryFn = dyn Fn() -> SyncResult<Arc<dyn ReactiveSource>> + Send + Sync;

/// Where a synced list gets its reactive source from.
#[derive(Clone)]
pub enum QuerySource {
    /// A fixed source.
    Collection(Arc<dyn ReactiveSource>),
    /// A query evaluated on every (re)start, so the list can follow
    /// changing query parameters.
    Query(Arc<QueryFn>),
}

impl QuerySource {
    /// Wraps a fixed source.
    pub fn collection(source: Arc<dyn ReactiveSource>) -> Self {
        QuerySource::Collection(source)
    }

    /// Wraps a query function.
    pub fn query(
        query: impl Fn() -> SyncResult<Arc<dyn ReactiveSource>> + Send + Sync + 'static,
    ) -> Self {
        QuerySource::Query(Arc::new(query))
    }

    /// Returns the source to observe now.
    pub fn resolve(&self) -> SyncResult<Arc<dyn ReactiveSource>> {
        match self {
            QuerySource::Collection(source) => Ok(Arc::clone(source)),
            QuerySource::Query(query) => query(),
        }
    }
}

impl fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::Collection(source) => {
                f.debug_tuple("Collection").field(&source.name()).finish()
            }
            QuerySource::Query(_) => f.write_str("Query(..)"),
        }
    }
}

/// Builder for [`SyncedList`].
#[derive(Default)]
pub struct SyncedListBuilder {
    source: Option<QuerySource>,
    store: Option<Arc<dyn DocumentStore>>,
    events: Option<EventLoop>,
    diff: Option<Arc<dyn DiffPrimitive>>,
    subscriptions: Option<Arc<dyn SubscriptionManager>>,
    options: SyncOptions,
}

impl SyncedListBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query source.
    pub fn source(mut self, source: QuerySource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets a query function as the source.
    pub fn query(
        self,
        query: impl Fn() -> SyncResult<Arc<dyn ReactiveSource>> + Send + Sync + 'static,
    ) -> Self {
        self.source(QuerySource::query(query))
    }

    /// Sets the document store.
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses one collection as both source and store.
    pub fn collection<C>(self, collection: Arc<C>) -> Self
    where
        C: ReactiveSource + DocumentStore + 'static,
    {
        let store: Arc<dyn DocumentStore> = collection.clone();
        self.source(QuerySource::Collection(collection)).store(store)
    }

    /// Shares an existing event loop instead of creating one.
    pub fn event_loop(mut self, events: EventLoop) -> Self {
        self.events = Some(events);
        self
    }

    /// Replaces the diff primitive.
    pub fn diff(mut self, diff: Arc<dyn DiffPrimitive>) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Sets the subscription manager `subscribe` forwards to.
    pub fn subscriptions(mut self, subscriptions: Arc<dyn SubscriptionManager>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    /// Sets all options.
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets whether local edits are written back.
    pub fn auto_sync(mut self, auto_sync: bool) -> Self {
        self.options.auto_sync = auto_sync;
        self
    }

    /// Builds the list and starts observing.
    ///
    /// Fails before anything is observed if the source or the store is
    /// missing, or if the source cannot be resolved.
    pub fn build(self) -> SyncResult<SyncedList> {
        let source = self
            .source
            .ok_or_else(|| SyncError::invalid_setup("a query source is required"))?;
        let store = self
            .store
            .ok_or_else(|| SyncError::invalid_setup("a document store is required"))?;
        let options = self.options;
        let events = self.events.unwrap_or_else(|| {
            EventLoop::new().with_max_flush_passes(options.max_flush_passes)
        });
        let diff = self.diff.unwrap_or_else(|| Arc::new(OrderedDiff));

        let list: SharedList = Arc::new(Mutex::new(KeyedOrderedList::new()));
        let guard = Arc::new(ReentrancyGuard::new());
        let stats: SharedStats = Arc::new(RwLock::new(SyncStats::default()));
        let downstream = Arc::new(DownstreamReconciler::new(
            Arc::clone(&list),
            Arc::clone(&store),
            diff,
            Arc::clone(&guard),
            events.clone(),
            Arc::clone(&stats),
            options.auto_sync,
        ));
        let upstream = Arc::new(UpstreamReconciler::new(
            Arc::clone(&list),
            Arc::clone(&guard),
            Arc::clone(&downstream),
            events.clone(),
            Arc::clone(&stats),
            options.drain_before_suppress,
        ));

        let synced = SyncedList {
            source: Mutex::new(source),
            list,
            store,
            subscriptions: self.subscriptions,
            events,
            guard,
            upstream,
            downstream,
            stats,
            options,
        };
        synced.start()?;
        Ok(synced)
    }
}

/// Creates a started synced list over `source`, writing back to `store`.
pub fn create_synced_list(
    source: QuerySource,
    store: Arc<dyn DocumentStore>,
    options: SyncOptions,
) -> SyncResult<SyncedList> {
    SyncedListBuilder::new()
        .source(source)
        .store(store)
        .options(options)
        .build()
}

/// An ordered document list kept in sync with a reactive source and a
/// document store in both directions.
pub struct SyncedList {
    source: Mutex<QuerySource>,
    list: SharedList,
    store: Arc<dyn DocumentStore>,
    subscriptions: Option<Arc<dyn SubscriptionManager>>,
    events: EventLoop,
    guard: Arc<ReentrancyGuard>,
    upstream: Arc<UpstreamReconciler>,
    downstream: Arc<DownstreamReconciler>,
    stats: SharedStats,
    options: SyncOptions,
}

impl SyncedList {
    /// Returns a builder.
    pub fn builder() -> SyncedListBuilder {
        SyncedListBuilder::new()
    }

    /// Starts observing the query source. Does nothing if already started.
    pub fn start(&self) -> SyncResult<()> {
        if self.upstream.is_observing() {
            return Ok(());
        }
        let source = self.source.lock().resolve()?;
        self.upstream.observe(source.as_ref())?;
        self.downstream.attach();
        Ok(())
    }

    /// Stops observing, empties the list and returns the guard to idle.
    ///
    /// No remote event reaches the list after this returns.
    pub fn stop(&self) {
        self.upstream.stop();
        self.downstream.detach();
        self.list.lock().clear();
        self.guard.reset();
    }

    /// Tears the observation down and starts a fresh one, re-evaluating
    /// the query.
    pub fn rederive(&self) -> SyncResult<()> {
        info!("re-deriving synced list");
        self.stop();
        self.start()
    }

    /// Switches to a new query source.
    pub fn replace_source(&self, source: QuerySource) -> SyncResult<()> {
        *self.source.lock() = source;
        self.rederive()
    }

    /// Returns a copy of the documents in order.
    pub fn documents(&self) -> Vec<Document> {
        self.list.lock().snapshot()
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the document at `index`.
    pub fn get(&self, index: usize) -> Option<Document> {
        self.list.lock().get(index).cloned()
    }

    /// Returns a copy of the document with the given id.
    pub fn find(&self, id: &DocId) -> Option<Document> {
        self.list.lock().find(id).cloned()
    }

    /// Reads the list in place.
    pub fn read<R>(&self, f: impl FnOnce(&KeyedOrderedList) -> R) -> R {
        f(&*self.list.lock())
    }

    /// Mutates the list as a consumer and requests a flush, so the edit is
    /// detected on the next turn.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut KeyedOrderedList) -> R) -> R {
        let result = f(&mut *self.list.lock());
        self.events.request_flush();
        result
    }

    /// Returns the shared list for consumers that mutate it directly and
    /// rely on polling via [`SyncedList::detect_changes`] or a flush.
    pub fn shared_list(&self) -> SharedList {
        Arc::clone(&self.list)
    }

    /// Runs one local change detection cycle now.
    pub fn detect_changes(&self) -> SyncResult<DetectionReport> {
        self.downstream.detect_now()
    }

    /// Forwards a subscription request to the subscription manager.
    pub fn subscribe(&self, name: &str, params: &[Value]) -> SyncResult<SubscriptionHandle> {
        self.subscriptions
            .as_ref()
            .ok_or(SyncError::NoSubscriptionManager)?
            .subscribe(name, params)
    }

    /// Saves documents to the store.
    ///
    /// A single document fails with its own error; several documents fail
    /// with a batch error if any of them failed, without undoing the rest.
    pub fn save(
        &self,
        target: impl Into<Target<Document>>,
        kind: ModifierKind,
    ) -> SyncResult<Vec<StoreOutcome>> {
        let docs = match target.into() {
            Target::One(doc) => {
                return persist::upsert(self.store.as_ref(), &doc, kind).map(|o| vec![o]);
            }
            Target::Many(docs) => docs,
            Target::All => self.documents(),
        };
        BatchReport::collect(
            docs.iter()
                .map(|doc| persist::upsert(self.store.as_ref(), doc, kind)),
        )
        .into_result()
    }

    /// Removes documents from the store by key, one call per document.
    pub fn remove(
        &self,
        target: impl Into<Target<Option<DocId>>>,
    ) -> SyncResult<Vec<StoreOutcome>> {
        let keys = match target.into() {
            Target::One(key) => {
                return persist::remove(self.store.as_ref(), key.as_ref()).map(|o| vec![o]);
            }
            Target::Many(keys) => keys,
            Target::All => self.read(|list| list.ids().cloned().map(Some).collect()),
        };
        BatchReport::collect(
            keys.iter()
                .map(|key| persist::remove(self.store.as_ref(), key.as_ref())),
        )
        .into_result()
    }

    /// Runs the event loop until no work is left.
    pub fn settle(&self) -> SyncResult<usize> {
        self.events.run_until_idle(self.options.max_turns)
    }

    /// Returns the event loop the list is scheduled on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.events
    }

    /// Returns the reentrancy guard state.
    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    /// Returns true if local edits are written back.
    pub fn is_auto_sync(&self) -> bool {
        self.options.auto_sync
    }

    /// Returns true while the source is observed.
    pub fn is_observing(&self) -> bool {
        self.upstream.is_observing()
    }

    /// Returns true while local change detection is attached.
    pub fn is_watching(&self) -> bool {
        self.downstream.is_attached()
    }

    /// Returns a copy of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }
}

impl fmt::Debug for SyncedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedList")
            .field("source", &*self.source.lock())
            .field("len", &self.len())
            .field("guard", &self.guard_state())
            .field("observing", &self.is_observing())
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl Drop for SyncedList {
    fn drop(&mut self) {
        self.upstream.stop();
        self.downstream.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCollection;

    #[test]
    fn missing_source_fails_fast() {
        let store = Arc::new(MemoryCollection::new("items"));
        let err = SyncedList::builder().store(store).build().unwrap_err();
        assert!(matches!(err, SyncError::InvalidSetup(_)));
    }

    #[test]
    fn missing_store_fails_fast() {
        let source = Arc::new(MemoryCollection::new("items"));
        let err = SyncedList::builder()
            .source(QuerySource::collection(source.clone()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidSetup(_)));
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn failing_query_fails_build() {
        let store = Arc::new(MemoryCollection::new("items"));
        let err = SyncedList::builder()
            .store(store)
            .query(|| Err(SyncError::Source("offline".into())))
            .build()
            .unwrap_err();
        assert_eq!(err, SyncError::Source("offline".into()));
    }

    #[test]
    fn subscribe_without_manager() {
        let collection = Arc::new(MemoryCollection::new("items"));
        let list = SyncedList::builder().collection(collection).build().unwrap();
        assert_eq!(
            list.subscribe("items", &[]).unwrap_err(),
            SyncError::NoSubscriptionManager
        );
    }

    #[test]
    fn drop_stops_observation() {
        let collection = Arc::new(MemoryCollection::new("items"));
        let list = SyncedList::builder()
            .collection(Arc::clone(&collection))
            .build()
            .unwrap();
        assert_eq!(collection.observer_count(), 1);
        drop(list);
        assert_eq!(collection.observer_count(), 0);
    }

    #[test]
    fn debug_names_source() {
        let collection = Arc::new(MemoryCollection::new("items"));
        let list = SyncedList::builder().collection(collection).build().unwrap();
        assert!(format!("{list:?}").contains("items"));
    }
}
