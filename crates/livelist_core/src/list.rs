//! Keyed ordered list.

use crate::change::{ChangeEvent, FieldChanges};
use crate::document::{DocId, Document, Fields};
use crate::error::{CoreError, CoreResult};
use std::collections::HashSet;

/// An ordered sequence of documents addressed by position or by id.
///
/// Lookup by id is a linear scan comparing ids by value; collections
/// held in a live list are expected to be small. Every mutation bumps
/// a version counter so observers can cheaply tell whether anything
/// changed since their last look.
///
/// At quiescent moments every id appears at most once. Drafts (documents
/// without an id) may appear anywhere until change detection picks them up.
#[derive(Debug, Clone, Default)]
pub struct KeyedOrderedList {
    docs: Vec<Document>,
    version: u64,
}

impl KeyedOrderedList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list holding the given documents in order.
    #[must_use]
    pub fn from_documents(docs: Vec<Document>) -> Self {
        Self { docs, version: 0 }
    }

    /// Returns the number of documents.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if the list is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Returns the mutation counter.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the documents as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Document] {
        &self.docs
    }

    /// Iterates over the documents in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.docs.iter()
    }

    /// Iterates over the ids in order, skipping drafts.
    pub fn ids(&self) -> impl Iterator<Item = &DocId> {
        self.docs.iter().filter_map(Document::id)
    }

    /// Returns a structural copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Document> {
        self.docs.clone()
    }

    /// Returns the document at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Document> {
        self.docs.get(index)
    }

    /// Returns the document at `index` for in-place editing.
    ///
    /// The list counts as changed only when a document is returned.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        if index >= self.docs.len() {
            return None;
        }
        self.bump();
        self.docs.get_mut(index)
    }

    /// Returns the position of the first document with the given id.
    #[must_use]
    pub fn position(&self, id: &DocId) -> Option<usize> {
        self.docs.iter().position(|doc| doc.has_id(id))
    }

    /// Returns true if a document with the given id is present.
    #[must_use]
    pub fn contains(&self, id: &DocId) -> bool {
        self.position(id).is_some()
    }

    /// Returns the document with the given id.
    #[must_use]
    pub fn find(&self, id: &DocId) -> Option<&Document> {
        self.docs.iter().find(|doc| doc.has_id(id))
    }

    /// Returns the document with the given id for in-place editing.
    pub fn find_mut(&mut self, id: &DocId) -> Option<&mut Document> {
        let index = self.position(id)?;
        self.get_mut(index)
    }

    /// Inserts a document at `index`, shifting later documents right.
    pub fn insert(&mut self, index: usize, doc: Document) -> CoreResult<()> {
        if index > self.docs.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.docs.len(),
            });
        }
        self.docs.insert(index, doc);
        self.bump();
        Ok(())
    }

    /// Appends a document.
    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
        self.bump();
    }

    /// Removes and returns the document at `index`.
    pub fn remove(&mut self, index: usize) -> CoreResult<Document> {
        if index >= self.docs.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.docs.len(),
            });
        }
        let doc = self.docs.remove(index);
        self.bump();
        Ok(doc)
    }

    /// Removes the first document with the given id.
    pub fn remove_by_id(&mut self, id: &DocId) -> Option<(usize, Document)> {
        let index = self.position(id)?;
        let doc = self.docs.remove(index);
        self.bump();
        Some((index, doc))
    }

    /// Inserts `doc` immediately before the document with id `before`,
    /// or at the end when `before` is `None`. Returns the insert position.
    ///
    /// The anchor is looked up in the current contents.
    pub fn insert_before(&mut self, doc: Document, before: Option<&DocId>) -> CoreResult<usize> {
        let index = match before {
            Some(anchor) => self
                .position(anchor)
                .ok_or_else(|| CoreError::AnchorNotFound { id: anchor.clone() })?,
            None => self.docs.len(),
        };
        self.docs.insert(index, doc);
        self.bump();
        Ok(index)
    }

    /// Merges field changes into the document with the given id, in place.
    pub fn merge_fields(&mut self, id: &DocId, changes: &FieldChanges) -> CoreResult<usize> {
        let index = self
            .position(id)
            .ok_or_else(|| CoreError::DocumentNotFound { id: id.clone() })?;
        self.docs[index].merge(changes);
        self.bump();
        Ok(index)
    }

    /// Moves the document with id `id` to immediately before `before`,
    /// or to the end. Returns the new position.
    pub fn move_before(&mut self, id: &DocId, before: Option<&DocId>) -> CoreResult<usize> {
        let from = self
            .position(id)
            .ok_or_else(|| CoreError::DocumentNotFound { id: id.clone() })?;
        if let Some(anchor) = before {
            if anchor == id {
                return Ok(from);
            }
            if !self.contains(anchor) {
                return Err(CoreError::AnchorNotFound { id: anchor.clone() });
            }
        }
        let doc = self.docs.remove(from);
        let to = before
            .and_then(|anchor| self.position(anchor))
            .unwrap_or(self.docs.len());
        self.docs.insert(to, doc);
        self.bump();
        Ok(to)
    }

    /// Applies one change event to the list.
    ///
    /// Returns the position the event touched (for removals, the position
    /// the document used to occupy).
    pub fn apply(&mut self, event: &ChangeEvent) -> CoreResult<usize> {
        match event {
            ChangeEvent::Added { id, fields, before } => {
                if self.contains(id) {
                    return Err(CoreError::DuplicateDocument { id: id.clone() });
                }
                let doc = Document::from_parts(Some(id.clone()), fields.clone());
                self.insert_before(doc, before.as_ref())
            }
            ChangeEvent::Changed { id, fields } => self.merge_fields(id, fields),
            ChangeEvent::MovedBefore { id, before } => self.move_before(id, before.as_ref()),
            ChangeEvent::Removed { id } => self
                .remove_by_id(id)
                .map(|(index, _)| index)
                .ok_or_else(|| CoreError::DocumentNotFound { id: id.clone() }),
        }
    }

    /// Consumes the list, returning its documents in order.
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    /// Removes every document, returning them in order.
    pub fn clear(&mut self) -> Vec<Document> {
        self.bump();
        std::mem::take(&mut self.docs)
    }

    /// Replaces the fields of the document with the given id.
    pub fn replace_fields(&mut self, id: &DocId, fields: Fields) -> CoreResult<usize> {
        let index = self
            .position(id)
            .ok_or_else(|| CoreError::DocumentNotFound { id: id.clone() })?;
        self.docs[index].fields = fields;
        self.bump();
        Ok(index)
    }

    /// Returns ids that occur more than once.
    #[must_use]
    pub fn duplicate_ids(&self) -> Vec<DocId> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for id in self.ids() {
            if !seen.insert(id) && !duplicates.contains(id) {
                duplicates.push(id.clone());
            }
        }
        duplicates
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

impl PartialEq for KeyedOrderedList {
    /// Lists are equal when their contents are; the version is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.docs == other.docs
    }
}

impl<'a> IntoIterator for &'a KeyedOrderedList {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(list: &KeyedOrderedList) -> Vec<&str> {
        list.ids().map(DocId::as_str).collect()
    }

    fn list_of(keys: &[&str]) -> KeyedOrderedList {
        KeyedOrderedList::from_documents(keys.iter().map(|k| Document::with_id(*k)).collect())
    }

    #[test]
    fn added_before_anchor_and_at_end() {
        let mut list = KeyedOrderedList::new();
        list.apply(&ChangeEvent::added("1", Fields::new(), None)).unwrap();
        list.apply(&ChangeEvent::added("2", Fields::new(), Some("1".into())))
            .unwrap();
        assert_eq!(ids(&list), ["2", "1"]);

        list.apply(&ChangeEvent::added("3", Fields::new(), None)).unwrap();
        assert_eq!(ids(&list), ["2", "1", "3"]);
    }

    #[test]
    fn added_with_missing_anchor_fails() {
        let mut list = list_of(&["1"]);
        let err = list
            .apply(&ChangeEvent::added("2", Fields::new(), Some("9".into())))
            .unwrap_err();
        assert_eq!(err, CoreError::AnchorNotFound { id: "9".into() });
        assert_eq!(ids(&list), ["1"]);
    }

    #[test]
    fn added_duplicate_fails() {
        let mut list = list_of(&["1"]);
        let err = list
            .apply(&ChangeEvent::added("1", Fields::new(), None))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateDocument { .. }));
    }

    #[test]
    fn changed_merges_in_place() {
        let mut list = KeyedOrderedList::from_documents(vec![
            Document::with_id("1").with("a", 1),
            Document::with_id("2").with("a", 2).with("b", true),
        ]);
        let changes = FieldChanges::from([
            ("a".to_string(), Some(json!(20))),
            ("b".to_string(), None),
        ]);
        assert_eq!(list.apply(&ChangeEvent::changed("2", changes)).unwrap(), 1);

        let doc = list.get(1).unwrap();
        assert_eq!(doc.get("a"), Some(&json!(20)));
        assert_eq!(doc.get("b"), None);
        assert_eq!(ids(&list), ["1", "2"]);
    }

    #[test]
    fn moved_before_reorders() {
        let mut list = list_of(&["1", "2", "3"]);
        list.apply(&ChangeEvent::moved_before("3", Some("1".into())))
            .unwrap();
        assert_eq!(ids(&list), ["3", "1", "2"]);

        list.apply(&ChangeEvent::moved_before("3", None)).unwrap();
        assert_eq!(ids(&list), ["1", "2", "3"]);
    }

    #[test]
    fn moved_with_missing_anchor_keeps_order() {
        let mut list = list_of(&["1", "2", "3"]);
        let err = list
            .apply(&ChangeEvent::moved_before("1", Some("7".into())))
            .unwrap_err();
        assert!(matches!(err, CoreError::AnchorNotFound { .. }));
        assert_eq!(ids(&list), ["1", "2", "3"]);
    }

    #[test]
    fn removed_by_wrapped_id() {
        let mut list = KeyedOrderedList::from_documents(vec![
            Document::with_id(DocId::object("abc")),
            Document::with_id("abc"),
        ]);
        let key = DocId::object(String::from("abc"));
        assert_eq!(list.apply(&ChangeEvent::removed(key)).unwrap(), 0);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().id(), Some(&DocId::from("abc")));
    }

    #[test]
    fn removed_unknown_fails() {
        let mut list = list_of(&["1"]);
        assert!(list.apply(&ChangeEvent::removed("2")).is_err());
    }

    #[test]
    fn positional_bounds() {
        let mut list = list_of(&["1"]);
        assert!(list.insert(2, Document::new()).is_err());
        assert!(list.insert(1, Document::new()).is_ok());
        assert!(list.remove(5).is_err());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn version_tracks_mutations() {
        let mut list = list_of(&["1"]);
        let v0 = list.version();
        list.push(Document::with_id("2"));
        assert!(list.version() > v0);

        let v1 = list.version();
        let _ = list.snapshot();
        assert_eq!(list.version(), v1);
    }

    #[test]
    fn failed_lookups_leave_version_alone() {
        let mut list = list_of(&["1"]);
        let v0 = list.version();
        assert!(list.get_mut(3).is_none());
        assert!(list.find_mut(&"9".into()).is_none());
        assert_eq!(list.version(), v0);

        assert!(list.get_mut(0).is_some());
        assert!(list.version() > v0);
    }

    #[test]
    fn snapshot_is_structural_copy() {
        let mut list = list_of(&["1"]);
        let snapshot = list.snapshot();
        list.find_mut(&"1".into()).unwrap().set("x", 1);
        assert_ne!(snapshot.as_slice(), list.as_slice());
        assert_eq!(snapshot[0].get("x"), None);
    }

    #[test]
    fn duplicate_detection() {
        let list = list_of(&["1", "2", "1", "1"]);
        assert_eq!(list.duplicate_ids(), vec![DocId::from("1")]);
        assert!(list_of(&["1", "2"]).duplicate_ids().is_empty());
    }

    #[test]
    fn clear_drains() {
        let mut list = list_of(&["1", "2"]);
        let drained = list.clear();
        assert_eq!(drained.len(), 2);
        assert!(list.is_empty());
    }
}
