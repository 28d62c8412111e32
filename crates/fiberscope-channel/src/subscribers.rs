//! Shared subscriber bookkeeping for channel implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};

use crate::MessageHandler;

/// Ordered list of message handlers with stable registration ids.
#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Mutex<Vec<(u64, MessageHandler)>>,
    next_id: AtomicU64,
}

impl SubscriberList {
    pub(crate) fn add(&self, handler: MessageHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, handler));
        }
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Dispatches a payload to every subscriber in registration order.
    ///
    /// Handlers are cloned out before invocation so a handler may register
    /// or drop subscriptions without deadlocking on the list lock.
    pub(crate) fn dispatch(&self, payload: &str) {
        let handlers: Vec<MessageHandler> = match self.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, handler)| handler.clone()).collect(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Disposer for a registered message handler.
///
/// Dropping the subscription detaches the handler; it is never invoked
/// again after the drop returns.
pub struct Subscription {
    id: u64,
    list: Weak<SubscriberList>,
}

impl Subscription {
    pub(crate) fn new(id: u64, list: Weak<SubscriberList>) -> Self {
        Self { id, list }
    }

    /// Detaches the handler explicitly.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
