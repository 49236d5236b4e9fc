//! Error types for livelist core.

use crate::document::DocId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while manipulating documents and lists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Positional access past the end of the list.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Current list length.
        len: usize,
    },

    /// The element an insertion was anchored before is not in the list.
    #[error("anchor document {id} not found in list")]
    AnchorNotFound {
        /// The `before` id that was not found.
        id: DocId,
    },

    /// A document addressed by id is not in the list.
    #[error("document {id} not found in list")]
    DocumentNotFound {
        /// The missing id.
        id: DocId,
    },

    /// A document with the same id is already present.
    #[error("document {id} already present in list")]
    DuplicateDocument {
        /// The duplicated id.
        id: DocId,
    },

    /// A value could not be interpreted as a document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl CoreError {
    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }

    /// Returns true if this error means the list and its source disagree.
    ///
    /// Such errors indicate a source that emitted events out of order or
    /// a list that was mutated outside the reconcilers' protocol.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            CoreError::AnchorNotFound { .. }
                | CoreError::DocumentNotFound { .. }
                | CoreError::DuplicateDocument { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_classification() {
        assert!(CoreError::AnchorNotFound { id: "a".into() }.is_divergence());
        assert!(CoreError::DuplicateDocument { id: "a".into() }.is_divergence());
        assert!(!CoreError::IndexOutOfBounds { index: 3, len: 1 }.is_divergence());
        assert!(!CoreError::invalid_document("not an object").is_divergence());
    }

    #[test]
    fn error_display() {
        let err = CoreError::IndexOutOfBounds { index: 5, len: 2 };
        assert_eq!(err.to_string(), "index 5 out of bounds for list of length 2");

        let err = CoreError::AnchorNotFound { id: "abc".into() };
        assert!(err.to_string().contains("abc"));
    }
}
