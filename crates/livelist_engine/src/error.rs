//! Error types for the sync engine.

use livelist_core::{CoreError, DocId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a live list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// List manipulation failed.
    #[error("list error: {0}")]
    Core(#[from] CoreError),

    /// The document store rejected an operation.
    #[error("store {op} failed: {message}")]
    Store {
        /// Operation name (insert, update, remove).
        op: &'static str,
        /// Error message.
        message: String,
    },

    /// The document store has no document with this id.
    #[error("document {id} not found in store")]
    NotFound {
        /// The missing id.
        id: DocId,
    },

    /// A single-item removal was requested without a key.
    #[error("key cannot be null")]
    NullKey,

    /// Setup arguments were missing or of the wrong kind.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    /// The reactive source failed to start an observation.
    #[error("source error: {0}")]
    Source(String),

    /// Some items of a batch store operation failed.
    #[error("{failed} of {total} store operations failed; first error: {first}")]
    BatchFailed {
        /// Number of failed items.
        failed: usize,
        /// Number of items in the batch.
        total: usize,
        /// Message of the first failure.
        first: String,
        /// Whether every failed item may succeed on retry.
        retryable: bool,
    },

    /// Change detection kept finding new changes.
    #[error("flush did not settle after {passes} passes")]
    FlushLimit {
        /// Passes run before giving up.
        passes: usize,
    },

    /// The scheduler still had work after the allowed number of turns.
    #[error("event loop still busy after {turns} turns")]
    TurnLimit {
        /// Turns run before giving up.
        turns: usize,
    },

    /// No subscription manager was configured.
    #[error("no subscription manager configured")]
    NoSubscriptionManager,
}

impl SyncError {
    /// Creates a store error.
    pub fn store(op: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            op,
            message: message.into(),
        }
    }

    /// Creates an invalid setup error.
    pub fn invalid_setup(message: impl Into<String>) -> Self {
        Self::InvalidSetup(message.into())
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store { .. } | SyncError::Source(_) => true,
            SyncError::BatchFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::store("insert", "connection lost").is_retryable());
        assert!(SyncError::Source("subscription dropped".into()).is_retryable());
        assert!(!SyncError::NullKey.is_retryable());
        assert!(!SyncError::invalid_setup("missing source").is_retryable());
        assert!(!SyncError::FlushLimit { passes: 10 }.is_retryable());
    }

    #[test]
    fn batch_retryable_only_if_every_failure_is() {
        let batch = |retryable| SyncError::BatchFailed {
            failed: 2,
            total: 3,
            first: "key cannot be null".into(),
            retryable,
        };
        assert!(!batch(false).is_retryable());
        assert!(batch(true).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NullKey.to_string(), "key cannot be null");

        let err = SyncError::BatchFailed {
            failed: 1,
            total: 3,
            first: "denied".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "1 of 3 store operations failed; first error: denied"
        );

        let err: SyncError = CoreError::AnchorNotFound { id: "7".into() }.into();
        assert!(err.to_string().contains("anchor document 7"));
    }
}
