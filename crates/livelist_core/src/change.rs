//! Change events emitted by a reactive source.
//!
//! A source describes the evolution of one ordered query result as a
//! stream of positional events. Events are only meaningful relative to
//! the list state produced by every event before them, so they must be
//! applied strictly in arrival order.

use crate::document::{DocId, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field-level changes carried by [`ChangeEvent::Changed`].
///
/// `Some(value)` sets the field, `None` means the field was cleared.
pub type FieldChanges = BTreeMap<String, Option<Value>>;

/// Kind of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Document entered the result set.
    Added,
    /// Document fields changed in place.
    Changed,
    /// Document moved to a new position.
    MovedBefore,
    /// Document left the result set.
    Removed,
}

/// A single ordered change from a reactive source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A document was added immediately before `before`, or at the end.
    Added {
        /// Id of the new document.
        id: DocId,
        /// Its fields.
        #[serde(default)]
        fields: Fields,
        /// Id of the element to insert before; `None` appends.
        #[serde(default)]
        before: Option<DocId>,
    },
    /// Fields of an existing document changed.
    Changed {
        /// Id of the changed document.
        id: DocId,
        /// The changed fields.
        #[serde(default)]
        fields: FieldChanges,
    },
    /// A document moved to immediately before `before`, or to the end.
    MovedBefore {
        /// Id of the moved document.
        id: DocId,
        /// Id of the element to move before; `None` moves to the end.
        #[serde(default)]
        before: Option<DocId>,
    },
    /// A document was removed.
    Removed {
        /// Id of the removed document.
        id: DocId,
    },
}

impl ChangeEvent {
    /// Creates an added event.
    pub fn added(id: impl Into<DocId>, fields: Fields, before: Option<DocId>) -> Self {
        Self::Added {
            id: id.into(),
            fields,
            before,
        }
    }

    /// Creates a changed event.
    pub fn changed(id: impl Into<DocId>, fields: FieldChanges) -> Self {
        Self::Changed {
            id: id.into(),
            fields,
        }
    }

    /// Creates a moved event.
    pub fn moved_before(id: impl Into<DocId>, before: Option<DocId>) -> Self {
        Self::MovedBefore {
            id: id.into(),
            before,
        }
    }

    /// Creates a removed event.
    pub fn removed(id: impl Into<DocId>) -> Self {
        Self::Removed { id: id.into() }
    }

    /// Returns the id of the document this event is about.
    pub fn id(&self) -> &DocId {
        match self {
            ChangeEvent::Added { id, .. }
            | ChangeEvent::Changed { id, .. }
            | ChangeEvent::MovedBefore { id, .. }
            | ChangeEvent::Removed { id } => id,
        }
    }

    /// Returns the event kind.
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Added { .. } => ChangeKind::Added,
            ChangeEvent::Changed { .. } => ChangeKind::Changed,
            ChangeEvent::MovedBefore { .. } => ChangeKind::MovedBefore,
            ChangeEvent::Removed { .. } => ChangeKind::Removed,
        }
    }
}
