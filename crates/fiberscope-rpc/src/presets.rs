//! Ready-made endpoint wirings for the supported embeddings.

use std::sync::Arc;

use fiberscope_channel::callback::PostFn;
use fiberscope_channel::{CallbackChannel, Channel, MemoryChannel};

use crate::endpoint::{HandlerTable, RpcEndpoint, RpcOptions};

/// Endpoints for the two sides of an in-process pairing.
#[derive(Debug)]
pub struct LinkedEndpoints {
    /// The instrumented host page side.
    pub host: RpcEndpoint,
    /// The devtools panel side.
    pub panel: RpcEndpoint,
}

/// Wires two endpoints over an in-process channel pair.
///
/// This is the same-realm target: both sides live in one process and
/// communicate through the [`MemoryChannel`] queues, preserving the
/// asynchronous message-passing semantics of the cross-window embedding.
#[must_use]
pub fn linked_pair(
    host_handlers: HandlerTable,
    panel_handlers: HandlerTable,
    options: RpcOptions,
) -> LinkedEndpoints {
    let (host_channel, panel_channel) = MemoryChannel::pair();
    let host_channel: Arc<dyn Channel> = Arc::new(host_channel);
    let panel_channel: Arc<dyn Channel> = Arc::new(panel_channel);
    LinkedEndpoints {
        host: RpcEndpoint::new(host_channel, host_handlers, options),
        panel: RpcEndpoint::new(panel_channel, panel_handlers, options),
    }
}

/// An endpoint bound to embedder-supplied cross-window messaging.
pub struct IframeBinding {
    /// The endpoint for this side of the window pair.
    pub endpoint: RpcEndpoint,
    /// The channel the embedding feeds inbound messages into.
    pub channel: Arc<CallbackChannel>,
}

impl std::fmt::Debug for IframeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IframeBinding").finish_non_exhaustive()
    }
}

/// Binds an endpoint to one side of an iframe/window pair.
///
/// The embedding supplies `post` (delivery into the other window, scoped to
/// the correct window pair by the caller) and must forward every message
/// arriving from that window to [`CallbackChannel::deliver`] on the returned
/// binding's channel.
#[must_use]
pub fn iframe(post: PostFn, handlers: HandlerTable, options: RpcOptions) -> IframeBinding {
    let channel = Arc::new(CallbackChannel::new(post));
    let endpoint = RpcEndpoint::new(
        Arc::clone(&channel) as Arc<dyn Channel>,
        handlers,
        options,
    );
    IframeBinding { endpoint, channel }
}
