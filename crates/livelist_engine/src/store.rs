//! Document store abstraction.
//!
//! The store is the persistence side of the loop: writes issued here
//! eventually come back through the reactive source as change events.

use crate::error::SyncResult;
use livelist_core::{DocId, Document, Fields};
use serde::Serialize;

/// Modifier for a store update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Modifier {
    /// Set the given fields, leaving others untouched.
    #[serde(rename = "$set")]
    Set(Fields),
    /// Remove the named fields.
    #[serde(rename = "$unset")]
    Unset(Vec<String>),
}

impl Modifier {
    /// Returns true if the modifier touches no field.
    pub fn is_empty(&self) -> bool {
        match self {
            Modifier::Set(fields) => fields.is_empty(),
            Modifier::Unset(names) => names.is_empty(),
        }
    }
}

/// Keyed persistent storage for documents.
///
/// This trait abstracts the persistence layer, allowing different
/// implementations (a remote collection, a local cache, an in-memory
/// collection for testing).
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, returning its id. A document without an id is
    /// assigned a fresh one.
    fn insert(&self, doc: Document) -> SyncResult<DocId>;

    /// Updates the document with the given id.
    ///
    /// Returns `SyncError::NotFound` if no such document exists.
    fn update(&self, id: &DocId, modifier: Modifier) -> SyncResult<()>;

    /// Removes the document with the given id.
    fn remove(&self, id: &DocId) -> SyncResult<()>;
}

/// A store call, as recorded by test stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreCall {
    /// `insert(doc)`.
    Insert {
        /// The inserted document.
        doc: Document,
    },
    /// `update(id, modifier)`.
    Update {
        /// Target id.
        id: DocId,
        /// The modifier.
        modifier: Modifier,
    },
    /// `remove(id)`.
    Remove {
        /// Target id.
        id: DocId,
    },
}

impl StoreCall {
    /// Returns the operation name.
    pub fn op(&self) -> &'static str {
        match self {
            StoreCall::Insert { .. } => "insert",
            StoreCall::Update { .. } => "update",
            StoreCall::Remove { .. } => "remove",
        }
    }
}
