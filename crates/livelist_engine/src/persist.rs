//! Per-document store operations and batch outcomes.

use crate::error::{SyncError, SyncResult};
use crate::store::{DocumentStore, Modifier};
use livelist_core::{DocId, Document};
use serde::Serialize;

/// How `save` updates documents that already have an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModifierKind {
    /// Set every field of the saved document.
    #[default]
    Set,
    /// Remove every field named in the saved document.
    Unset,
}

/// What a store operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreAction {
    /// A new document was created.
    Inserted,
    /// An existing document was modified.
    Updated,
    /// A document was deleted.
    Removed,
}

/// Successful outcome of a single store operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreOutcome {
    /// Id of the affected document.
    #[serde(rename = "_id")]
    pub id: DocId,
    /// What happened to it.
    pub action: StoreAction,
}

impl StoreOutcome {
    fn new(id: DocId, action: StoreAction) -> Self {
        Self { id, action }
    }
}

/// Which documents a `save` or `remove` applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target<T> {
    /// Every document currently in the list.
    All,
    /// A single item.
    One(T),
    /// Several items.
    Many(Vec<T>),
}

impl From<Document> for Target<Document> {
    fn from(doc: Document) -> Self {
        Target::One(doc)
    }
}

impl From<Vec<Document>> for Target<Document> {
    fn from(docs: Vec<Document>) -> Self {
        Target::Many(docs)
    }
}

impl From<DocId> for Target<Option<DocId>> {
    fn from(id: DocId) -> Self {
        Target::One(Some(id))
    }
}

impl From<Vec<DocId>> for Target<Option<DocId>> {
    fn from(ids: Vec<DocId>) -> Self {
        Target::Many(ids.into_iter().map(Some).collect())
    }
}

/// Saves one document.
///
/// A document with an id is updated; if the store does not know the id
/// and `kind` is `Set`, it is inserted under that id instead. A document
/// without an id is inserted and assigned one by the store.
pub fn upsert(
    store: &dyn DocumentStore,
    doc: &Document,
    kind: ModifierKind,
) -> SyncResult<StoreOutcome> {
    let Some(id) = doc.id() else {
        let id = store.insert(doc.clone())?;
        return Ok(StoreOutcome::new(id, StoreAction::Inserted));
    };

    match kind {
        ModifierKind::Set => match store.update(id, Modifier::Set(doc.fields.clone())) {
            Ok(()) => Ok(StoreOutcome::new(id.clone(), StoreAction::Updated)),
            Err(SyncError::NotFound { .. }) => {
                let id = store.insert(doc.clone())?;
                Ok(StoreOutcome::new(id, StoreAction::Inserted))
            }
            Err(err) => Err(err),
        },
        ModifierKind::Unset => {
            let names = doc.fields.keys().cloned().collect();
            store.update(id, Modifier::Unset(names))?;
            Ok(StoreOutcome::new(id.clone(), StoreAction::Updated))
        }
    }
}

/// Removes one document by key.
///
/// A missing key fails with [`SyncError::NullKey`] without contacting the
/// store.
pub fn remove(store: &dyn DocumentStore, key: Option<&DocId>) -> SyncResult<StoreOutcome> {
    let id = key.ok_or(SyncError::NullKey)?;
    store.remove(id)?;
    Ok(StoreOutcome::new(id.clone(), StoreAction::Removed))
}

/// Per-item results of a batch store operation.
///
/// Items are independent: a failure does not roll back items that
/// already succeeded.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    results: Vec<SyncResult<StoreOutcome>>,
}

impl BatchReport {
    /// Collects results in item order.
    pub fn collect(results: impl IntoIterator<Item = SyncResult<StoreOutcome>>) -> Self {
        Self {
            results: results.into_iter().collect(),
        }
    }

    /// Returns the per-item results.
    pub fn results(&self) -> &[SyncResult<StoreOutcome>] {
        &self.results
    }

    /// Returns the number of failed items.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    /// Returns every outcome, or a batch error if any item failed.
    pub fn into_result(self) -> SyncResult<Vec<StoreOutcome>> {
        let total = self.results.len();
        let failed = self.failed();
        if failed == 0 {
            return Ok(self.results.into_iter().flatten().collect());
        }
        let first = self
            .results
            .iter()
            .find_map(|r| r.as_ref().err())
            .map(ToString::to_string)
            .unwrap_or_default();
        let retryable = self
            .results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(SyncError::is_retryable);
        Err(SyncError::BatchFailed {
            failed,
            total,
            first,
            retryable,
        })
    }
}
