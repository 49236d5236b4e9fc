//! Documents.
//!
//! A document is a flat map from field name to JSON value plus an optional
//! id. The id lives outside the field map so that `$set` and `$unset`
//! modifiers can never touch it.

mod id;

pub use id::{DocId, ObjectId};

use crate::change::FieldChanges;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the id field in the serialized form.
pub const ID_FIELD: &str = "_id";

/// Field map of a document, ordered by field name.
pub type Fields = BTreeMap<String, Value>;

/// A schemaless document.
///
/// Documents without an id are local drafts that have not been persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document key.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocId>,
    /// All other fields.
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Creates an empty draft document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<DocId>) -> Self {
        Self {
            id: Some(id.into()),
            fields: Fields::new(),
        }
    }

    /// Creates a document from an id and a field map.
    #[must_use]
    pub fn from_parts(id: Option<DocId>, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Builds a document from a JSON value.
    ///
    /// The value must be an object. An `_id` member becomes the id.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        if !value.is_object() {
            return Err(CoreError::invalid_document(format!(
                "expected a JSON object, found {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| CoreError::invalid_document(e.to_string()))
    }

    /// Converts the document into a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(id) = &self.id {
            map.insert(
                ID_FIELD.to_string(),
                serde_json::to_value(id).unwrap_or(Value::Null),
            );
        }
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the id, if assigned.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&DocId> {
        self.id.as_ref()
    }

    /// Returns true if the document carries the given id.
    #[inline]
    #[must_use]
    pub fn has_id(&self, id: &DocId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field, returning the previous value.
    ///
    /// Setting `_id` through the field map is ignored; assign `id` instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        if name == ID_FIELD {
            return None;
        }
        self.fields.insert(name, value.into())
    }

    /// Removes a field, returning its value.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Merges field changes into this document.
    ///
    /// `Some(value)` overwrites the field, `None` removes it. Fields not
    /// mentioned in `changes` keep their values.
    pub fn merge(&mut self, changes: &FieldChanges) {
        for (name, change) in changes {
            match change {
                Some(value) => {
                    self.set(name.clone(), value.clone());
                }
                None => {
                    self.unset(name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_and_accessors() {
        let doc = Document::with_id("a").with("name", "alpha").with("n", 3);
        assert_eq!(doc.id(), Some(&DocId::from("a")));
        assert_eq!(doc.get("name"), Some(&json!("alpha")));
        assert_eq!(doc.get("n"), Some(&json!(3)));
        assert!(doc.has_id(&"a".into()));
    }

    #[test]
    fn id_is_not_a_field() {
        let mut doc = Document::with_id("a");
        assert_eq!(doc.set(ID_FIELD, "b"), None);
        assert!(doc.fields.is_empty());
        assert_eq!(doc.id(), Some(&DocId::from("a")));
    }

    #[test]
    fn merge_sets_and_clears() {
        let mut doc = Document::with_id("a").with("x", 1).with("y", 2);
        let mut changes = FieldChanges::new();
        changes.insert("x".into(), Some(json!(10)));
        changes.insert("y".into(), None);
        changes.insert("z".into(), Some(json!("new")));

        doc.merge(&changes);

        assert_eq!(doc.get("x"), Some(&json!(10)));
        assert_eq!(doc.get("y"), None);
        assert_eq!(doc.get("z"), Some(&json!("new")));
    }

    #[test]
    fn json_round_trip_with_wrapped_id() {
        let value = json!({"_id": {"_str": "ff00"}, "title": "t"});
        let doc = Document::from_value(value.clone()).unwrap();
        assert_eq!(doc.id(), Some(&DocId::object("ff00")));
        assert_eq!(doc.get("title"), Some(&json!("t")));
        assert_eq!(doc.to_value(), value);
    }

    #[test]
    fn draft_has_no_id() {
        let doc = Document::from_value(json!({"title": "draft"})).unwrap();
        assert!(doc.id().is_none());
        assert_eq!(doc.to_value(), json!({"title": "draft"}));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("text")).is_err());
    }
}
