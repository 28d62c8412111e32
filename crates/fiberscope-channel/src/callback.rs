//! Embedding seam for cross-window messaging.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::subscribers::{SubscriberList, Subscription};
use crate::{Channel, MessageHandler};

/// Outbound delivery closure supplied by the embedding.
pub type PostFn = Box<dyn Fn(&str) + Send + Sync>;

/// A channel bound to embedder-supplied messaging primitives.
///
/// This is how the devtools iframe pairing attaches to real cross-window
/// `postMessage` plumbing: the embedding passes the outbound `post` closure
/// at construction and forwards every inbound message to
/// [`CallbackChannel::deliver`]. Delivery is synchronous in the caller's
/// context, so arrival order is whatever order the embedding observes.
pub struct CallbackChannel {
    post: PostFn,
    subscribers: Arc<SubscriberList>,
    closed: AtomicBool,
}

impl CallbackChannel {
    /// Creates a channel that sends through the given closure.
    #[must_use]
    pub fn new(post: PostFn) -> Self {
        Self {
            post,
            subscribers: Arc::new(SubscriberList::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Feeds one inbound payload to the subscribers.
    ///
    /// The embedding calls this once per message, in the order the messages
    /// arrived from the other context.
    pub fn deliver(&self, payload: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.subscribers.dispatch(payload);
    }

    /// Stops both delivery and sending.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Channel for CallbackChannel {
    fn send(&self, payload: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        (self.post)(payload);
    }

    fn subscribe(&self, handler: MessageHandler) -> Subscription {
        let id = self.subscribers.add(handler);
        Subscription::new(id, Arc::downgrade(&self.subscribers))
    }
}

impl std::fmt::Debug for CallbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackChannel")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
