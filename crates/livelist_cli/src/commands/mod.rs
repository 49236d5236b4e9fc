//! CLI command implementations.

pub mod diff;
pub mod replay;

use livelist_core::Document;
use livelist_engine::SyncError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file did not hold the expected JSON.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The synced list failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Output could not be encoded.
    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reads and decodes a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CommandError> {
    let text = std::fs::read_to_string(path).map_err(|source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Formats a list of documents as their ids.
pub fn id_list(docs: &[Document]) -> String {
    let ids: Vec<String> = docs
        .iter()
        .map(|doc| doc.id().map_or_else(|| "<draft>".to_string(), ToString::to_string))
        .collect();
    format!("[{}]", ids.join(", "))
}
