//! Document identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A wrapped object identifier.
///
/// Serialized as `{"_str": "<hex>"}`. Two object ids are equal when their
/// hex strings are equal, regardless of which allocation holds them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    #[serde(rename = "_str")]
    hex: String,
}

impl ObjectId {
    /// Creates a new random object id (24 lowercase hex characters).
    #[must_use]
    pub fn new() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(24);
        Self { hex }
    }

    /// Wraps an existing hex string.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self { hex: hex.into() }
    }

    /// Returns the wrapped string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.hex
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.hex)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.hex)
    }
}

/// Stable key of a document.
///
/// Keys are either plain strings or wrapped object ids. All comparisons
/// are by value: a `DocId::Object` built from the same hex string as
/// another is the same key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    /// Plain string id.
    Text(String),
    /// Wrapped object id.
    Object(ObjectId),
}

impl DocId {
    /// Creates a new random string id.
    #[must_use]
    pub fn random() -> Self {
        Self::Text(Uuid::new_v4().simple().to_string())
    }

    /// Creates an object id key from a hex string.
    #[must_use]
    pub fn object(hex: impl Into<String>) -> Self {
        Self::Object(ObjectId::from_hex(hex))
    }

    /// Returns the underlying string, unwrapping object ids.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            DocId::Text(s) => s,
            DocId::Object(oid) => oid.as_str(),
        }
    }

    /// Returns true if this is a wrapped object id.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, DocId::Object(_))
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Text(s) => write!(f, "DocId({s:?})"),
            DocId::Object(oid) => write!(f, "DocId({oid:?})"),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Text(s) => f.write_str(s),
            DocId::Object(oid) => write!(f, "{oid}"),
        }
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<ObjectId> for DocId {
    fn from(oid: ObjectId) -> Self {
        Self::Object(oid)
    }
}

impl From<u64> for DocId {
    fn from(n: u64) -> Self {
        Self::Text(n.to_string())
    }
}
