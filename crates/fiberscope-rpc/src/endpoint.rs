//! The RPC endpoint: correlation, handler dispatch, and events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak, mpsc};
use std::time::Duration;

use fiberscope_channel::{Channel, Subscription, is_sentinel};
use fiberscope_codec::WireValue;
use tracing::{debug, warn};

use crate::error::{HandlerError, RpcError};
use crate::protocol::{Envelope, SUBSCRIBE_METHOD, UNSUBSCRIBE_METHOD, WireError, WireErrorKind};

/// Tracing target for endpoint operations.
const RPC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");

/// A locally implemented method the remote side can invoke.
pub type HandlerFn = Arc<dyn Fn(&[WireValue]) -> Result<WireValue, HandlerError> + Send + Sync>;

/// Callback invoked with the payload of a subscribed event topic.
pub type EventCallback = Arc<dyn Fn(&WireValue) + Send + Sync>;

/// Tuning options for an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct RpcOptions {
    /// Deadline for a call to receive its response.
    pub timeout: Duration,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// The table of methods one side implements for the other to call.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use fiberscope_codec::WireValue;
/// use fiberscope_rpc::HandlerTable;
///
/// let mut handlers = HandlerTable::new();
/// handlers.register("ping", Arc::new(|_args| Ok(WireValue::Str("pong".into()))));
/// ```
#[derive(Default)]
pub struct HandlerTable {
    methods: HashMap<String, HandlerFn>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under the given method name, replacing any
    /// previous handler with that name.
    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.methods.insert(method.into(), handler);
    }

    /// Builder-style [`HandlerTable::register`].
    #[must_use]
    pub fn with(mut self, method: impl Into<String>, handler: HandlerFn) -> Self {
        self.register(method, handler);
        self
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

enum CallOutcome {
    Ok(WireValue),
    Err(WireError),
    Closed,
}

struct EndpointInner {
    channel: Arc<dyn Channel>,
    handlers: Mutex<HashMap<String, HandlerFn>>,
    pending: Mutex<HashMap<u64, mpsc::Sender<CallOutcome>>>,
    /// Local listeners per topic, invoked when an event envelope arrives.
    local_listeners: Mutex<HashMap<String, Vec<(u64, EventCallback)>>>,
    /// Topics the remote side asked us to forward.
    forward_topics: Mutex<HashSet<String>>,
    next_call_id: AtomicU64,
    next_listener_id: AtomicU64,
    closed: AtomicBool,
    options: RpcOptions,
}

/// One side of an RPC connection.
///
/// Construction registers the local handler table on the channel; dropping
/// (or calling [`RpcEndpoint::close`]) rejects all outstanding calls with
/// [`RpcError::ChannelClosed`] and refuses new ones.
pub struct RpcEndpoint {
    inner: Arc<EndpointInner>,
    _subscription: Subscription,
}

impl RpcEndpoint {
    /// Creates an endpoint over the given channel.
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>, handlers: HandlerTable, options: RpcOptions) -> Self {
        let inner = Arc::new(EndpointInner {
            channel: Arc::clone(&channel),
            handlers: Mutex::new(handlers.methods),
            pending: Mutex::new(HashMap::new()),
            local_listeners: Mutex::new(HashMap::new()),
            forward_topics: Mutex::new(HashSet::new()),
            next_call_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            options,
        });

        let dispatch = Arc::clone(&inner);
        let subscription = channel.subscribe(Arc::new(move |payload: &str| {
            dispatch.handle_payload(payload);
        }));

        Self {
            inner,
            _subscription: subscription,
        }
    }

    /// Invokes a remote method and blocks until its response, the timeout,
    /// or endpoint teardown.
    ///
    /// Calls issued concurrently from different threads are independent:
    /// each resolves with its own response regardless of completion order.
    ///
    /// # Errors
    ///
    /// [`RpcError::ChannelClosed`] if the endpoint is (or becomes) closed,
    /// [`RpcError::Timeout`] when no response arrives in time,
    /// [`RpcError::MethodNotFound`] or [`RpcError::Remote`] for failures
    /// reported by the other side. Timed-out calls are not retried; a late
    /// response for one is discarded.
    pub fn call(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue, RpcError> {
        self.inner.call(method, args)
    }

    /// Sends a call without waiting for its response.
    ///
    /// Any eventual response is discarded as stale. Used for calls whose
    /// outcome the caller cannot act on, such as disposer-driven
    /// unsubscription.
    pub fn notify(&self, method: &str, args: Vec<WireValue>) {
        self.inner.notify(method, args);
    }

    /// Publishes an event to the remote side if it subscribed to the topic.
    pub fn publish(&self, topic: &str, payload: &WireValue) {
        self.inner.publish(topic, payload);
    }

    /// Subscribes to an event topic forwarded by the remote side.
    ///
    /// Implemented as a degenerate RPC call: the remote side records the
    /// topic and begins forwarding matching events. Dropping the returned
    /// subscription unsubscribes (fire-and-forget).
    ///
    /// # Errors
    ///
    /// Any error the underlying subscription call can produce.
    pub fn subscribe(
        &self,
        topic: &str,
        callback: EventCallback,
    ) -> Result<EventSubscription, RpcError> {
        let listener_id = self.inner.add_listener(topic, callback);
        match self.call(SUBSCRIBE_METHOD, vec![WireValue::Str(topic.to_owned())]) {
            Ok(_) => Ok(EventSubscription {
                inner: Arc::downgrade(&self.inner),
                topic: topic.to_owned(),
                listener_id,
            }),
            Err(error) => {
                self.inner.remove_listener(topic, listener_id);
                Err(error)
            }
        }
    }

    /// Registers (or replaces) a local handler after construction.
    ///
    /// Used by the plugin layer to expose namespaced methods at
    /// registration time.
    pub fn register_handler(&self, method: impl Into<String>, handler: HandlerFn) {
        if let Ok(mut handlers) = self.inner.handlers.lock() {
            handlers.insert(method.into(), handler);
        }
    }

    /// Removes a local handler; later calls to it fail with method-not-found.
    pub fn unregister_handler(&self, method: &str) {
        if let Ok(mut handlers) = self.inner.handlers.lock() {
            handlers.remove(method);
        }
    }

    /// Tears the endpoint down, rejecting all outstanding calls.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns whether the endpoint has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for RpcEndpoint {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for RpcEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcEndpoint")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EndpointInner {
    fn call(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::ChannelClosed);
        }

        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, sender);
        }

        // close() may drain the pending table between the flag check above
        // and the insert; re-check so the call fails fast instead of waiting
        // out the timeout.
        if self.closed.load(Ordering::Acquire) {
            self.forget_pending(id);
            return Err(RpcError::ChannelClosed);
        }

        if let Err(error) = self.send_envelope(&Envelope::Call {
            id,
            method: method.to_owned(),
            args,
        }) {
            self.forget_pending(id);
            return Err(error);
        }

        match receiver.recv_timeout(self.options.timeout) {
            Ok(CallOutcome::Ok(result)) => Ok(result),
            Ok(CallOutcome::Err(wire_error)) => Err(Self::map_wire_error(method, wire_error)),
            Ok(CallOutcome::Closed) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(RpcError::ChannelClosed)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.forget_pending(id);
                Err(RpcError::Timeout {
                    method: method.to_owned(),
                    timeout: self.options.timeout,
                })
            }
        }
    }

    fn notify(&self, method: &str, args: Vec<WireValue>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::Call {
            id,
            method: method.to_owned(),
            args,
        };
        if let Err(error) = self.send_envelope(&envelope) {
            debug!(target: RPC_TARGET, method, %error, "dropping notification");
        }
    }

    fn publish(&self, topic: &str, payload: &WireValue) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let subscribed = self
            .forward_topics
            .lock()
            .map(|topics| topics.contains(topic))
            .unwrap_or(false);
        if !subscribed {
            return;
        }
        let envelope = Envelope::Event {
            topic: topic.to_owned(),
            payload: payload.clone(),
        };
        if let Err(error) = self.send_envelope(&envelope) {
            debug!(target: RPC_TARGET, topic, %error, "dropping event");
        }
    }

    fn send_envelope(&self, envelope: &Envelope) -> Result<(), RpcError> {
        let payload =
            serde_json::to_string(envelope).map_err(|error| RpcError::SerializeEnvelope {
                message: error.to_string(),
            })?;
        self.channel.send(&payload);
        Ok(())
    }

    fn forget_pending(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }

    fn map_wire_error(method: &str, wire_error: WireError) -> RpcError {
        match wire_error.kind {
            WireErrorKind::MethodNotFound => RpcError::MethodNotFound {
                method: method.to_owned(),
            },
            WireErrorKind::Handler | WireErrorKind::Decode => RpcError::Remote {
                method: method.to_owned(),
                message: wire_error.message,
            },
        }
    }

    fn handle_payload(&self, payload: &str) {
        if self.closed.load(Ordering::Acquire) || is_sentinel(payload) {
            return;
        }
        let envelope: Envelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                // Malformed message: drop it, keep the channel alive.
                warn!(target: RPC_TARGET, %error, "dropping malformed rpc payload");
                return;
            }
        };
        match envelope {
            Envelope::Call { id, method, args } => self.handle_call(id, &method, &args),
            Envelope::Response { id, result, error } => self.handle_response(id, result, error),
            Envelope::Event { topic, payload: event_payload } => {
                self.handle_event(&topic, &event_payload);
            }
        }
    }

    fn handle_call(&self, id: u64, method: &str, args: &[WireValue]) {
        let outcome = match method {
            SUBSCRIBE_METHOD => self.handle_subscribe(args, true),
            UNSUBSCRIBE_METHOD => self.handle_subscribe(args, false),
            _ => self.run_handler(method, args),
        };

        let response = match outcome {
            Ok(result) => Envelope::Response {
                id,
                result: Some(result),
                error: None,
            },
            Err(handler_error) => Envelope::Response {
                id,
                result: None,
                error: Some(WireError {
                    kind: handler_error.kind(),
                    message: handler_error.message().to_owned(),
                }),
            },
        };
        if let Err(error) = self.send_envelope(&response) {
            debug!(target: RPC_TARGET, method, %error, "dropping response");
        }
    }

    fn run_handler(&self, method: &str, args: &[WireValue]) -> Result<WireValue, HandlerError> {
        let handler = self
            .handlers
            .lock()
            .ok()
            .and_then(|handlers| handlers.get(method).cloned());
        match handler {
            Some(handler) => handler(args),
            None => Err(HandlerError::method_not_found(format!(
                "no handler registered for '{method}'"
            ))),
        }
    }

    fn handle_subscribe(
        &self,
        args: &[WireValue],
        subscribe: bool,
    ) -> Result<WireValue, HandlerError> {
        let topic = args
            .first()
            .and_then(WireValue::as_str)
            .ok_or_else(|| HandlerError::invalid_args("expected a topic string"))?;
        if let Ok(mut topics) = self.forward_topics.lock() {
            if subscribe {
                topics.insert(topic.to_owned());
            } else {
                topics.remove(topic);
            }
        }
        Ok(WireValue::Null)
    }

    fn handle_response(&self, id: u64, result: Option<WireValue>, error: Option<WireError>) {
        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&id));
        let Some(sender) = sender else {
            // Stale id: the call already timed out or was never ours.
            debug!(target: RPC_TARGET, id, "ignoring unmatched response");
            return;
        };
        let outcome = match (result, error) {
            (_, Some(wire_error)) => CallOutcome::Err(wire_error),
            (Some(value), None) => CallOutcome::Ok(value),
            (None, None) => CallOutcome::Ok(WireValue::Null),
        };
        // The caller may have given up between removal and send; ignore.
        drop(sender.send(outcome));
    }

    fn handle_event(&self, topic: &str, payload: &WireValue) {
        let callbacks: Vec<EventCallback> = self
            .local_listeners
            .lock()
            .map(|listeners| {
                listeners
                    .get(topic)
                    .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        if callbacks.is_empty() {
            debug!(target: RPC_TARGET, topic, "event with no local listeners");
        }
        for callback in callbacks {
            callback(payload);
        }
    }

    fn add_listener(&self, topic: &str, callback: EventCallback) -> u64 {
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.local_listeners.lock() {
            listeners
                .entry(topic.to_owned())
                .or_default()
                .push((listener_id, callback));
        }
        listener_id
    }

    /// Removes a listener; returns whether the topic still has listeners.
    fn remove_listener(&self, topic: &str, listener_id: u64) -> bool {
        let Ok(mut listeners) = self.local_listeners.lock() else {
            return false;
        };
        let Some(entries) = listeners.get_mut(topic) else {
            return false;
        };
        entries.retain(|(id, _)| *id != listener_id);
        if entries.is_empty() {
            listeners.remove(topic);
            return false;
        }
        true
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<mpsc::Sender<CallOutcome>> = self
            .pending
            .lock()
            .map(|mut pending| pending.drain().map(|(_, sender)| sender).collect())
            .unwrap_or_default();
        for sender in drained {
            drop(sender.send(CallOutcome::Closed));
        }
    }
}

/// Disposer for an event subscription.
///
/// Dropping it detaches the local callback and, when no other local
/// listeners remain on the topic, notifies the remote side to stop
/// forwarding (fire-and-forget).
pub struct EventSubscription {
    inner: Weak<EndpointInner>,
    topic: String,
    listener_id: u64,
}

impl EventSubscription {
    /// Unsubscribes explicitly.
    pub fn dispose(self) {
        drop(self);
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let still_listening = inner.remove_listener(&self.topic, self.listener_id);
        if !still_listening {
            inner.notify(
                UNSUBSCRIBE_METHOD,
                vec![WireValue::Str(self.topic.clone())],
            );
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("topic", &self.topic)
            .finish()
    }
}
