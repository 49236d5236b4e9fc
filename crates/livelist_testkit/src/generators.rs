//! Property-based test generators using proptest.
//!
//! Remote event streams are generated as abstract operations and realized
//! against a plain `Vec` model, so every generated event is valid for the
//! list state it will be applied to and the expected result is known.

use livelist_core::{ChangeEvent, DocId, Document, FieldChanges, Fields, KeyedOrderedList};
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::Value;

/// Strategy for generating field values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

/// Strategy for generating field names from a small pool, so edits collide.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    "[a-d]"
}

/// Strategy for generating document fields.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..3)
}

/// Strategy for generating field changes, including cleared fields.
pub fn field_changes_strategy() -> impl Strategy<Value = FieldChanges> {
    prop::collection::btree_map(
        field_name_strategy(),
        prop::option::of(value_strategy()),
        1..3,
    )
}

/// Strategy for generating document ids, plain or wrapped.
pub fn doc_id_strategy() -> impl Strategy<Value = DocId> {
    prop_oneof![
        "[a-z0-9]{1,8}".prop_map(DocId::from),
        "[0-9a-f]{24}".prop_map(|hex| DocId::object(hex)),
    ]
}

/// An abstract remote operation. Targets are resolved against the model
/// when the script is realized.
#[derive(Debug, Clone)]
pub enum RemoteOp {
    /// Add a document before a target, or at the end.
    Add {
        /// Fields of the new document.
        fields: Fields,
        /// Anchor; `None` appends.
        before: Option<Index>,
    },
    /// Change fields of a target.
    Change {
        /// The changed document.
        target: Index,
        /// The changes.
        fields: FieldChanges,
    },
    /// Move a target before another one, or to the end.
    Move {
        /// The moved document.
        target: Index,
        /// Anchor; `None` moves to the end.
        before: Option<Index>,
    },
    /// Remove a target.
    Remove {
        /// The removed document.
        target: Index,
    },
}

/// Strategy for generating remote operations.
pub fn remote_op_strategy() -> impl Strategy<Value = RemoteOp> {
    prop_oneof![
        3 => (fields_strategy(), prop::option::of(any::<Index>()))
            .prop_map(|(fields, before)| RemoteOp::Add { fields, before }),
        2 => (any::<Index>(), field_changes_strategy())
            .prop_map(|(target, fields)| RemoteOp::Change { target, fields }),
        1 => (any::<Index>(), prop::option::of(any::<Index>()))
            .prop_map(|(target, before)| RemoteOp::Move { target, before }),
        1 => any::<Index>().prop_map(|target| RemoteOp::Remove { target }),
    ]
}

/// A realized remote stream with its expected outcome.
#[derive(Debug, Clone)]
pub struct RemoteScript {
    /// Documents present before the first batch.
    pub initial: Vec<Document>,
    /// Event batches in delivery order.
    pub batches: Vec<Vec<ChangeEvent>>,
    /// The list every batch applied in order must produce.
    pub expected: Vec<Document>,
}

impl RemoteScript {
    /// Realizes `ops` against a model seeded with `initial` fields, cutting
    /// the events into batches of `batch_size`.
    pub fn realize(initial: Vec<Fields>, ops: &[RemoteOp], batch_size: usize) -> Self {
        let initial: Vec<Document> = initial
            .into_iter()
            .enumerate()
            .map(|(n, fields)| Document::from_parts(Some(format!("i{n}").into()), fields))
            .collect();
        let mut model = initial.clone();
        let mut events = Vec::new();

        for (n, op) in ops.iter().enumerate() {
            if let Some(event) = realize_op(&mut model, n, op) {
                events.push(event);
            }
        }

        let batches = events
            .chunks(batch_size.max(1))
            .map(<[ChangeEvent]>::to_vec)
            .collect();
        Self {
            initial,
            batches,
            expected: model,
        }
    }

    /// Returns every event in delivery order.
    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.batches.iter().flatten()
    }
}

fn id_at(model: &[Document], index: &Index) -> DocId {
    model[index.index(model.len())]
        .id()
        .cloned()
        .unwrap_or_else(|| DocId::from("missing"))
}

fn position(model: &[Document], id: &DocId) -> usize {
    model.iter().position(|d| d.has_id(id)).unwrap_or(model.len())
}

fn realize_op(model: &mut Vec<Document>, n: usize, op: &RemoteOp) -> Option<ChangeEvent> {
    match op {
        RemoteOp::Add { fields, before } => {
            let id = DocId::from(format!("r{n}"));
            let before = match before {
                Some(index) if !model.is_empty() => Some(id_at(model, index)),
                _ => None,
            };
            let at = before.as_ref().map_or(model.len(), |b| position(model, b));
            model.insert(at, Document::from_parts(Some(id.clone()), fields.clone()));
            Some(ChangeEvent::added(id, fields.clone(), before))
        }
        _ if model.is_empty() => None,
        RemoteOp::Change { target, fields } => {
            let id = id_at(model, target);
            let at = position(model, &id);
            model[at].merge(fields);
            Some(ChangeEvent::changed(id, fields.clone()))
        }
        RemoteOp::Move { target, before } => {
            let id = id_at(model, target);
            let before = before.as_ref().map(|index| id_at(model, index));
            if before.as_ref() != Some(&id) {
                let doc = model.remove(position(model, &id));
                let at = before.as_ref().map_or(model.len(), |b| position(model, b));
                model.insert(at, doc);
            }
            Some(ChangeEvent::moved_before(id, before))
        }
        RemoteOp::Remove { target } => {
            let id = id_at(model, target);
            model.remove(position(model, &id));
            Some(ChangeEvent::removed(id))
        }
    }
}

/// Strategy for generating realized remote scripts.
pub fn remote_script_strategy() -> impl Strategy<Value = RemoteScript> {
    (
        prop::collection::vec(fields_strategy(), 0..5),
        prop::collection::vec(remote_op_strategy(), 0..30),
        1usize..5,
    )
        .prop_map(|(initial, ops, batch_size)| RemoteScript::realize(initial, &ops, batch_size))
}

/// A consumer edit to the list, by position.
#[derive(Debug, Clone)]
pub enum LocalEdit {
    /// Insert a draft.
    Insert {
        /// Insert position.
        at: Index,
        /// Draft fields.
        fields: Fields,
    },
    /// Set one field of a document.
    Set {
        /// The edited document.
        target: Index,
        /// Field name.
        field: String,
        /// New value.
        value: Value,
    },
    /// Remove one field of a document.
    Unset {
        /// The edited document.
        target: Index,
        /// Field name.
        field: String,
    },
    /// Remove a document.
    Remove {
        /// The removed document.
        target: Index,
    },
    /// Move a document to another position.
    Move {
        /// The moved document.
        target: Index,
        /// New position.
        to: Index,
    },
}

impl LocalEdit {
    /// Applies the edit. Edits that target a document do nothing on an
    /// empty list.
    pub fn apply(&self, list: &mut KeyedOrderedList) {
        if let LocalEdit::Insert { at, fields } = self {
            let at = at.index(list.len() + 1);
            let _ = list.insert(at, Document::from_parts(None, fields.clone()));
            return;
        }
        if list.is_empty() {
            return;
        }
        match self {
            LocalEdit::Insert { .. } => {}
            LocalEdit::Set {
                target,
                field,
                value,
            } => {
                if let Some(doc) = list.get_mut(target.index(list.len())) {
                    doc.set(field.clone(), value.clone());
                }
            }
            LocalEdit::Unset { target, field } => {
                if let Some(doc) = list.get_mut(target.index(list.len())) {
                    doc.unset(field);
                }
            }
            LocalEdit::Remove { target } => {
                let _ = list.remove(target.index(list.len()));
            }
            LocalEdit::Move { target, to } => {
                if let Ok(doc) = list.remove(target.index(list.len())) {
                    let to = to.index(list.len() + 1);
                    let _ = list.insert(to, doc);
                }
            }
        }
    }
}

/// Strategy for generating local edits.
pub fn local_edit_strategy() -> impl Strategy<Value = LocalEdit> {
    prop_oneof![
        2 => (any::<Index>(), fields_strategy())
            .prop_map(|(at, fields)| LocalEdit::Insert { at, fields }),
        3 => (any::<Index>(), field_name_strategy(), value_strategy())
            .prop_map(|(target, field, value)| LocalEdit::Set { target, field, value }),
        1 => (any::<Index>(), field_name_strategy())
            .prop_map(|(target, field)| LocalEdit::Unset { target, field }),
        1 => any::<Index>().prop_map(|target| LocalEdit::Remove { target }),
        1 => (any::<Index>(), any::<Index>())
            .prop_map(|(target, to)| LocalEdit::Move { target, to }),
    ]
}

/// Strategy for generating sequences of local edits.
pub fn local_edits_strategy(max: usize) -> impl Strategy<Value = Vec<LocalEdit>> {
    prop::collection::vec(local_edit_strategy(), 0..max)
}
