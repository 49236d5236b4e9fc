//! # livelist core
//!
//! Data model for the livelist synchronization engine.
//!
//! This crate provides:
//! - `DocId` / `ObjectId` document keys compared by value
//! - `Document`, a schemaless record with an optional id
//! - `KeyedOrderedList`, the ordered sequence both reconcilers share
//! - `ChangeEvent`, the ordered change stream a reactive source emits
//! - `Edit` and the ordered diff primitive used for local change detection
//!
//! This is a pure data crate with no I/O and no scheduling.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod diff;
mod document;
mod error;
mod list;

pub use change::{ChangeEvent, ChangeKind, FieldChanges};
pub use diff::{diff_fields, diff_ordered, DiffPrimitive, Edit, OrderedDiff};
pub use document::{DocId, Document, Fields, ObjectId, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use list::KeyedOrderedList;

/// Re-exported so callers can build field values without naming serde_json.
pub use serde_json::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
