//! Message transport between two isolated execution contexts.
//!
//! A [`Channel`] delivers opaque string payloads to the other side and
//! notifies subscribers of inbound payloads, one call per message in arrival
//! order. Delivery is FIFO per sending side; there is no ordering guarantee
//! between the two directions. Once the remote context is gone, `send` is a
//! silent no-op — unresponsiveness is detected by timeouts at the RPC layer,
//! never by channel-level errors.
//!
//! Two implementations are provided:
//!
//! - [`MemoryChannel`] — a linked in-process pair, the same-realm and test
//!   target. Each endpoint drains its inbound queue on a pump thread.
//! - [`CallbackChannel`] — the embedding seam for cross-window messaging.
//!   The embedder supplies the outbound `post` closure and pushes inbound
//!   payloads via [`CallbackChannel::deliver`].
//!
//! The [`handshake`] module implements the load-order-tolerant ready/ack
//! exchange that precedes RPC traffic.

pub mod callback;
pub mod handshake;
pub mod memory;
mod subscribers;

use std::sync::Arc;

pub use self::callback::CallbackChannel;
pub use self::handshake::{ACK_SENTINEL, HandshakeDriver, READY_SENTINEL, acknowledge, is_sentinel};
pub use self::memory::MemoryChannel;
pub use self::subscribers::Subscription;

/// Handler invoked once per inbound payload, in arrival order.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Bidirectional message transport to one remote context.
pub trait Channel: Send + Sync {
    /// Enqueues a payload for the other side without blocking.
    ///
    /// Sends from one side arrive in order. When the remote context is gone
    /// the payload is dropped silently.
    fn send(&self, payload: &str);

    /// Registers a handler for inbound payloads.
    ///
    /// The handler runs once per message, in arrival order. Dropping the
    /// returned [`Subscription`] detaches the handler.
    fn subscribe(&self, handler: MessageHandler) -> Subscription;
}
