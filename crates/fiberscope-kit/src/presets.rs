//! Ready-made wirings of host and panel for the supported embeddings.

use std::sync::Arc;
use std::time::Duration;

use fiberscope_channel::callback::PostFn;
use fiberscope_channel::handshake::{HandshakeDriver, acknowledge};
use fiberscope_channel::{CallbackChannel, Channel, MemoryChannel, Subscription};
use fiberscope_inspector::{DevtoolsHook, EditorOpener, FiberProvider, InspectorOverlay};
use fiberscope_rpc::{HandlerTable, RpcEndpoint, RpcError, RpcOptions};

use crate::client::ClientSession;
use crate::host::{HostOptions, HostSession};

/// Host and panel wired over an in-process channel pair.
#[derive(Debug)]
pub struct DevtoolsPair {
    /// The instrumented-page side.
    pub host: HostSession,
    /// The panel side.
    pub client: ClientSession,
}

/// Wires a host and client in one process, for same-realm embeddings and
/// tests.
///
/// # Errors
///
/// Any error the client's tree subscription can produce.
pub fn linked(
    provider: Arc<dyn FiberProvider>,
    overlay: Box<dyn InspectorOverlay>,
    opener: EditorOpener,
    hook: &DevtoolsHook,
    options: HostOptions,
) -> Result<DevtoolsPair, RpcError> {
    let (host_channel, panel_channel) = MemoryChannel::pair();
    let host = HostSession::new(
        Arc::new(host_channel),
        provider,
        overlay,
        opener,
        hook,
        options,
    );
    let panel_endpoint = Arc::new(RpcEndpoint::new(
        Arc::new(panel_channel),
        HandlerTable::new(),
        options.rpc,
    ));
    let client = ClientSession::attach(panel_endpoint)?;
    Ok(DevtoolsPair { host, client })
}

/// A host session bound to embedder-supplied cross-window messaging.
pub struct IframeHost {
    /// The running host session.
    pub session: HostSession,
    /// Channel the embedding feeds inbound messages into.
    pub channel: Arc<CallbackChannel>,
    handshake: HandshakeDriver,
}

impl std::fmt::Debug for IframeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IframeHost").finish_non_exhaustive()
    }
}

impl IframeHost {
    /// Whether the panel has acknowledged the readiness announcement.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.handshake.is_acknowledged()
    }
}

/// Binds a host session to one side of an iframe/window pair and starts
/// announcing readiness until the panel acknowledges.
#[must_use]
pub fn iframe_host(
    post: PostFn,
    provider: Arc<dyn FiberProvider>,
    overlay: Box<dyn InspectorOverlay>,
    opener: EditorOpener,
    hook: &DevtoolsHook,
    options: HostOptions,
    announce_interval: Duration,
) -> IframeHost {
    let channel = Arc::new(CallbackChannel::new(post));
    let session = HostSession::new(
        Arc::clone(&channel) as Arc<dyn Channel>,
        provider,
        overlay,
        opener,
        hook,
        options,
    );
    let handshake = HandshakeDriver::announce(
        Arc::clone(&channel) as Arc<dyn Channel>,
        announce_interval,
    );
    IframeHost {
        session,
        channel,
        handshake,
    }
}

/// A panel endpoint bound to embedder-supplied cross-window messaging.
pub struct IframePanel {
    /// The panel's endpoint; attach a [`ClientSession`] once the host is
    /// ready.
    pub endpoint: Arc<RpcEndpoint>,
    /// Channel the embedding feeds inbound messages into.
    pub channel: Arc<CallbackChannel>,
    _ready: Subscription,
}

impl std::fmt::Debug for IframePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IframePanel").finish_non_exhaustive()
    }
}

/// Binds the panel side of an iframe/window pair.
///
/// `on_ready` fires exactly once, when the host's readiness announcement
/// arrives; call [`ClientSession::attach`] on the endpoint from there.
#[must_use]
pub fn iframe_panel(
    post: PostFn,
    options: RpcOptions,
    on_ready: impl FnOnce() + Send + 'static,
) -> IframePanel {
    let channel = Arc::new(CallbackChannel::new(post));
    let as_channel: Arc<dyn Channel> = Arc::clone(&channel) as Arc<dyn Channel>;
    let ready = acknowledge(&as_channel, on_ready);
    let endpoint = Arc::new(RpcEndpoint::new(as_channel, HandlerTable::new(), options));
    IframePanel {
        endpoint,
        channel,
        _ready: ready,
    }
}
