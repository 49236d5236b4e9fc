//! Subscription passthrough.
//!
//! Network subscriptions are owned by an external manager; a synced list
//! only forwards `subscribe` calls to it.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to an active subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionHandle {
    /// Manager-assigned id.
    pub id: u64,
    /// Publication name.
    pub name: String,
    /// Publication parameters.
    pub params: Vec<Value>,
}

/// Manages network subscriptions.
pub trait SubscriptionManager: Send + Sync {
    /// Subscribes to a publication.
    fn subscribe(&self, name: &str, params: &[Value]) -> SyncResult<SubscriptionHandle>;

    /// Ends a subscription.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> SyncResult<()>;
}

/// An in-memory subscription manager for testing.
#[derive(Debug, Default)]
pub struct MemorySubscriptions {
    active: Mutex<Vec<SubscriptionHandle>>,
    next_id: AtomicU64,
}

impl MemorySubscriptions {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active subscriptions.
    pub fn active(&self) -> Vec<SubscriptionHandle> {
        self.active.lock().clone()
    }
}

impl SubscriptionManager for MemorySubscriptions {
    fn subscribe(&self, name: &str, params: &[Value]) -> SyncResult<SubscriptionHandle> {
        if name.is_empty() {
            return Err(SyncError::Source("publication name is empty".into()));
        }
        let handle = SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            params: params.to_vec(),
        };
        self.active.lock().push(handle.clone());
        Ok(handle)
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> SyncResult<()> {
        self.active.lock().retain(|h| h.id != handle.id);
        Ok(())
    }
}
