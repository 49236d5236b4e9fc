//! # livelist testkit
//!
//! Test utilities for livelist.
//!
//! This crate provides:
//! - A `Harness` wiring a synced list to an in-memory collection
//! - Document builders and temporary script files
//! - Property-based generators for remote event streams and local edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livelist_testkit::prelude::*;
//!
//! #[test]
//! fn remote_add() {
//!     let harness = Harness::new(docs(&["1"]));
//!     harness.publish(vec![ChangeEvent::removed("1")]);
//!     assert!(harness.ids().is_empty());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use livelist_core::{ChangeEvent, DocId, Document, Fields};
}

pub use fixtures::*;
pub use generators::*;
