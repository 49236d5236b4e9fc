//! Test fixtures and synced list helpers.
//!
//! Provides a ready-made synced list over an in-memory collection and
//! builders for the documents tests feed it.

use livelist_core::{ChangeEvent, DocId, Document};
use livelist_engine::{EchoMode, MemoryCollection, StoreCall, SyncOptions, SyncedList};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A synced list wired to an in-memory collection.
pub struct Harness {
    /// The collection acting as source and store.
    pub collection: Arc<MemoryCollection>,
    /// The synced list.
    pub list: SyncedList,
}

impl Harness {
    /// Creates a settled harness over `docs` with default options.
    pub fn new(docs: Vec<Document>) -> Self {
        Self::with_options(docs, SyncOptions::default(), EchoMode::Immediate)
    }

    /// Creates a settled harness whose store holds echoes until
    /// [`Harness::confirm`] is called.
    pub fn held(docs: Vec<Document>) -> Self {
        Self::with_options(docs, SyncOptions::default(), EchoMode::Held)
    }

    /// Creates a settled harness.
    pub fn with_options(docs: Vec<Document>, options: SyncOptions, echo: EchoMode) -> Self {
        let collection = Arc::new(MemoryCollection::with_documents("test", docs));
        collection.set_echo(echo);
        let list = SyncedList::builder()
            .collection(Arc::clone(&collection))
            .options(options)
            .build()
            .expect("Failed to build synced list");
        let harness = Self { collection, list };
        harness.settle();
        harness
    }

    /// Runs the event loop until idle, returning the number of turns.
    pub fn settle(&self) -> usize {
        self.list.settle().expect("Event loop did not settle")
    }

    /// Publishes a remote batch without settling.
    pub fn publish(&self, batch: Vec<ChangeEvent>) {
        self.collection
            .publish(batch)
            .expect("Remote batch does not fit the collection");
    }

    /// Publishes a remote batch and settles.
    pub fn publish_settled(&self, batch: Vec<ChangeEvent>) {
        self.publish(batch);
        self.settle();
    }

    /// Edits the list as a consumer and settles.
    pub fn edit<R>(&self, f: impl FnOnce(&mut livelist_core::KeyedOrderedList) -> R) -> R {
        let result = self.list.mutate(f);
        self.settle();
        result
    }

    /// Releases held echoes and settles. Returns the number released.
    pub fn confirm(&self) -> usize {
        let released = self.collection.release_held();
        self.settle();
        released
    }

    /// Returns the list ids in order, as strings.
    pub fn ids(&self) -> Vec<String> {
        self.list.read(|list| list.ids().map(ToString::to_string).collect())
    }

    /// Returns every store call so far.
    pub fn store_calls(&self) -> Vec<StoreCall> {
        self.collection.calls()
    }

    /// Asserts that the list and the collection hold the same documents,
    /// ignoring order.
    pub fn assert_converged(&self) {
        let mut listed = self.list.documents();
        let mut stored = self.collection.documents();
        listed.sort_by(|a, b| a.id().cmp(&b.id()));
        stored.sort_by(|a, b| a.id().cmp(&b.id()));
        assert_eq!(listed, stored, "list and collection diverged");
    }
}

/// Creates a document with the given id and the fields of a JSON object.
pub fn doc(id: impl Into<DocId>, fields: Value) -> Document {
    let mut doc = draft(fields);
    doc.id = Some(id.into());
    doc
}

/// Creates a document without an id from a JSON object.
pub fn draft(fields: Value) -> Document {
    Document::from_value(fields).expect("Document fields must be a JSON object")
}

/// Creates empty documents with the given ids, in order.
pub fn docs(ids: &[&str]) -> Vec<Document> {
    ids.iter().map(|id| Document::with_id(*id)).collect()
}

/// A JSON file in a temporary directory, removed on drop.
pub struct TempScript {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempScript {
    /// Writes `value` as pretty JSON to a new temporary file.
    pub fn new(name: &str, value: &Value) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(name);
        let json = serde_json::to_string_pretty(value).expect("Failed to encode script");
        std::fs::write(&path, json).expect("Failed to write script");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn harness_settles_initial_load() {
        let harness = Harness::new(docs(&["a", "b"]));
        assert_eq!(harness.ids(), vec!["a", "b"]);
        assert!(harness.store_calls().is_empty());
        harness.assert_converged();
    }

    #[test]
    fn held_harness_confirms() {
        let harness = Harness::held(Vec::new());
        harness.edit(|list| list.push(draft(json!({"n": 1}))));
        assert!(harness.ids().is_empty());
        assert_eq!(harness.confirm(), 1);
        assert_eq!(harness.list.len(), 1);
        harness.assert_converged();
    }

    #[test]
    fn doc_builder() {
        let d = doc("x", json!({"a": 1}));
        assert_eq!(d.id(), Some(&DocId::from("x")));
        assert_eq!(d.get("a"), Some(&json!(1)));
    }

    #[test]
    fn temp_script_round_trip() {
        let script = TempScript::new("s.json", &json!({"steps": []}));
        let text = std::fs::read_to_string(script.path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"steps": []}));
    }
}
