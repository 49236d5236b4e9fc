//! # livelist engine
//!
//! Bidirectional synchronization between an in-memory ordered document
//! list, a reactive source and a document store.
//!
//! This crate provides:
//! - `UpstreamReconciler`: applies remote change batches to the list
//! - `DownstreamReconciler`: detects local edits by snapshot diffing and
//!   writes them back as insert/update/remove calls
//! - `ReentrancyGuard`: keeps the two directions from feeding each other
//! - `EventLoop`: the cooperative scheduler both run on
//! - `SyncedList`: the controller tying it all together
//! - `MemoryCollection`: an in-memory source and store
//!
//! ## Architecture
//!
//! ```text
//! source ──► UpstreamReconciler ──► list ◄── consumer
//!   ▲                                 │
//!   │                                 ▼
//! store ◄────────────── DownstreamReconciler
//! ```
//!
//! The loop is closed on purpose: a local write comes back from the source
//! as a remote event. The guard makes sure applying that event is never
//! mistaken for another local edit.
//!
//! ## Key Invariants
//!
//! - Events of one batch are applied in arrival order
//! - Local change detection never runs while a remote batch is unsettled
//! - No event reaches the list after `stop` returns
//! - Ids are compared by value

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod downstream;
mod error;
mod guard;
mod memory;
mod persist;
mod scheduler;
mod source;
mod stats;
mod store;
mod subscription;
mod synced_list;
mod upstream;

use livelist_core::KeyedOrderedList;
use parking_lot::Mutex;
use std::sync::Arc;

pub use config::SyncOptions;
pub use downstream::{DetectionReport, DownstreamReconciler};
pub use error::{SyncError, SyncResult};
pub use guard::{GuardState, ReentrancyGuard, SuppressionTicket};
pub use memory::{EchoMode, MemoryCollection};
pub use persist::{BatchReport, ModifierKind, StoreAction, StoreOutcome, Target};
pub use scheduler::{EventLoop, LoopStats, Task, WatchId, Watcher};
pub use source::{EventSink, ObserveHandle, ReactiveSource};
pub use stats::SyncStats;
pub use store::{DocumentStore, Modifier, StoreCall};
pub use subscription::{MemorySubscriptions, SubscriptionHandle, SubscriptionManager};
pub use synced_list::{create_synced_list, QuerySource, SyncedList, SyncedListBuilder};
pub use upstream::UpstreamReconciler;

/// The ordered list shared by a synced list's reconcilers and consumers.
pub type SharedList = Arc<Mutex<KeyedOrderedList>>;
