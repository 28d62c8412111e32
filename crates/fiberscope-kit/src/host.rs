//! The host-page side of the devtools: commit pipeline, RPC surface,
//! inspection, and plugins, wired together over one channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use fiberscope_channel::Channel;
use fiberscope_codec::{WireValue, decode_json, encode_json};
use fiberscope_inspector::{
    CommitObserver, DevtoolsHook, EditorOpener, FiberIdRegistry, FiberProvider, FiberRef,
    InspectorMode, InspectorOverlay, InspectorSession, ObserverHandle, Point, SourceLocation,
    TreeOptions, build_display_tree, structural_path,
};
use fiberscope_plugins::{Plugin, PluginError, PluginManager};
use fiberscope_rpc::{HandlerError, HandlerTable, RpcEndpoint, RpcOptions};

use crate::api::{
    GET_PLUGINS_METHOD, GET_TREE_METHOD, INSPECT_SELECTED_TOPIC, OPEN_IN_EDITOR_METHOD,
    TOGGLE_INSPECTOR_METHOD, TREE_UPDATED_TOPIC,
};

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Tunables for a host session.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOptions {
    /// Display-tree projection controls.
    pub tree: TreeOptions,
    /// RPC engine controls.
    pub rpc: RpcOptions,
}

/// Everything the devtools run inside the instrumented page.
///
/// A session owns the RPC endpoint serving the panel, observes commits
/// through the instrumentation hook, republishes coalesced tree snapshots,
/// drives point-and-click inspection, and hosts the plugin registry. All of
/// it tears down together when the session drops.
pub struct HostSession {
    endpoint: Arc<RpcEndpoint>,
    inspector: Arc<Mutex<InspectorSession>>,
    plugins: Arc<PluginManager>,
    pipeline: Arc<CommitPipeline>,
    publisher: TreePublisher,
    closed: AtomicBool,
    _observer: ObserverHandle,
}

impl std::fmt::Debug for HostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession").finish_non_exhaustive()
    }
}

impl HostSession {
    /// Builds a session over a transport channel.
    ///
    /// `hook` is the page-global instrumentation hook renderers report
    /// into; the session observes it until dropped. `overlay` and `opener`
    /// are the embedder's highlight surface and editor integration.
    pub fn new(
        channel: Arc<dyn Channel>,
        provider: Arc<dyn FiberProvider>,
        overlay: Box<dyn InspectorOverlay>,
        opener: EditorOpener,
        hook: &DevtoolsHook,
        options: HostOptions,
    ) -> Self {
        let ids = Arc::new(Mutex::new(FiberIdRegistry::new()));
        let opener = Arc::new(opener);
        let inspector = Arc::new(Mutex::new(InspectorSession::new(
            Arc::clone(&provider),
            Arc::clone(&ids),
            overlay,
        )));

        let handlers = HandlerTable::new()
            .with(
                GET_TREE_METHOD,
                tree_handler(Arc::clone(&provider), Arc::clone(&ids), options.tree),
            )
            .with(
                TOGGLE_INSPECTOR_METHOD,
                toggle_handler(Arc::clone(&inspector)),
            )
            .with(OPEN_IN_EDITOR_METHOD, open_handler(Arc::clone(&opener)));
        let endpoint = Arc::new(RpcEndpoint::new(channel, handlers, options.rpc));

        let plugins = Arc::new(PluginManager::new(Arc::clone(&endpoint)));
        endpoint.register_handler(GET_PLUGINS_METHOD, plugins_handler(Arc::clone(&plugins)));

        let publisher = TreePublisher::spawn(Arc::clone(&endpoint));
        let pipeline = Arc::new(CommitPipeline {
            provider,
            ids,
            tree: options.tree,
            publisher: publisher.handle(),
        });
        let observer =
            hook.observe_commits(Arc::clone(&pipeline) as Arc<dyn CommitObserver>);

        {
            let mut session = lock(&inspector);
            let selected_sink = Arc::clone(&endpoint);
            session.on_select(move |id| {
                selected_sink.publish(INSPECT_SELECTED_TOPIC, &WireValue::Str(id.to_owned()));
            });
            let picker_opener = Arc::clone(&opener);
            session.on_open_in_editor(move |location| {
                picker_opener.open(location);
            });
        }

        Self {
            endpoint,
            inspector,
            plugins,
            pipeline,
            publisher,
            closed: AtomicBool::new(false),
            _observer: observer,
        }
    }

    /// The endpoint serving the panel.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<RpcEndpoint> {
        &self.endpoint
    }

    /// Registers a plugin on this session's endpoint.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::register`].
    pub fn register_plugin(&self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        self.plugins.register(plugin)
    }

    /// The plugin registry.
    #[must_use]
    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// Arms or disarms inspection from the host side.
    pub fn toggle_inspector(&self, enabled: bool, mode: Option<InspectorMode>) {
        lock(&self.inspector).toggle(enabled, mode);
    }

    /// Routes a pointer movement from the page into the inspector.
    pub fn pointer_move(&self, point: Point) {
        lock(&self.inspector).pointer_move(point);
    }

    /// Routes a click from the page into the inspector.
    pub fn click(&self, point: Point) {
        lock(&self.inspector).click(point);
    }

    /// Rebuilds and publishes a snapshot outside the commit cycle, e.g.
    /// right after the panel connects.
    pub fn publish_tree_now(&self) {
        self.pipeline.publish_snapshot();
    }

    /// Tears the session down: plugins, publisher, endpoint.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(target: TARGET, "host session closing");
        self.plugins.teardown_all();
        self.publisher.stop();
        self.endpoint.close();
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(inspector: &Arc<Mutex<InspectorSession>>) -> MutexGuard<'_, InspectorSession> {
    inspector.lock().unwrap_or_else(PoisonError::into_inner)
}

fn tree_handler(
    provider: Arc<dyn FiberProvider>,
    ids: Arc<Mutex<FiberIdRegistry>>,
    options: TreeOptions,
) -> fiberscope_rpc::HandlerFn {
    Arc::new(move |_args: &[WireValue]| {
        let mut registry = ids.lock().unwrap_or_else(PoisonError::into_inner);
        match build_display_tree(provider.as_ref(), &mut registry, options) {
            Some(root) => {
                let json = serde_json::to_value(&root)
                    .map_err(|error| HandlerError::failed(error.to_string()))?;
                Ok(encode_json(&json))
            }
            None => Ok(WireValue::Null),
        }
    })
}

fn toggle_handler(inspector: Arc<Mutex<InspectorSession>>) -> fiberscope_rpc::HandlerFn {
    Arc::new(move |args: &[WireValue]| {
        let enabled = args
            .first()
            .and_then(WireValue::as_bool)
            .ok_or_else(|| HandlerError::invalid_args("expected an enabled flag"))?;
        let mode = match args.get(1) {
            None | Some(WireValue::Null) => None,
            Some(WireValue::Str(raw)) => Some(parse_mode(raw)?),
            Some(other) => {
                return Err(HandlerError::invalid_args(format!(
                    "unexpected mode argument {other:?}"
                )));
            }
        };
        lock(&inspector).toggle(enabled, mode);
        Ok(WireValue::Null)
    })
}

fn parse_mode(raw: &str) -> Result<InspectorMode, HandlerError> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|_| HandlerError::invalid_args(format!("unknown inspector mode {raw:?}")))
}

fn open_handler(opener: Arc<EditorOpener>) -> fiberscope_rpc::HandlerFn {
    Arc::new(move |args: &[WireValue]| {
        let wire = args
            .first()
            .ok_or_else(|| HandlerError::invalid_args("expected a source location"))?;
        let json =
            decode_json(wire).map_err(|error| HandlerError::invalid_args(error.to_string()))?;
        let location: SourceLocation = serde_json::from_value(json)
            .map_err(|error| HandlerError::invalid_args(error.to_string()))?;
        Ok(WireValue::Bool(opener.open(&location)))
    })
}

fn plugins_handler(manager: Arc<PluginManager>) -> fiberscope_rpc::HandlerFn {
    Arc::new(move |_args: &[WireValue]| {
        let mut list = Vec::new();
        for (id, manifest) in manager.manifests() {
            let mut json = serde_json::to_value(&manifest)
                .map_err(|error| HandlerError::failed(error.to_string()))?;
            if let serde_json::Value::Object(fields) = &mut json {
                fields.insert("id".to_owned(), serde_json::Value::String(id));
            }
            list.push(json);
        }
        Ok(encode_json(&serde_json::Value::Array(list)))
    })
}

/// Observes commits, rebuilds the projection, and submits snapshots.
struct CommitPipeline {
    provider: Arc<dyn FiberProvider>,
    ids: Arc<Mutex<FiberIdRegistry>>,
    tree: TreeOptions,
    publisher: PublisherHandle,
}

impl CommitPipeline {
    fn publish_snapshot(&self) {
        let wire = {
            let mut registry = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
            match build_display_tree(self.provider.as_ref(), &mut registry, self.tree) {
                Some(root) => match serde_json::to_value(&root) {
                    Ok(json) => encode_json(&json),
                    Err(error) => {
                        tracing::warn!(target: TARGET, %error, "snapshot serialisation failed");
                        return;
                    }
                },
                None => WireValue::Null,
            }
        };
        self.publisher.submit(wire);
    }
}

impl CommitObserver for CommitPipeline {
    fn on_commit(&self, _renderer_id: u64, _root: Option<FiberRef>) {
        self.publish_snapshot();
    }

    fn on_unmount(&self, _renderer_id: u64, fiber: FiberRef) {
        // The path must be resolved while the renderer still has the node
        // linked into the tree; afterwards only the retired ids remain.
        match structural_path(self.provider.as_ref(), fiber) {
            Ok(path) => {
                self.ids
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .notify_unmount(&path);
            }
            Err(error) => {
                tracing::debug!(target: TARGET, %error, "unmount path unresolvable");
            }
        }
    }
}

#[derive(Default)]
struct PublisherState {
    latest: Option<WireValue>,
    shutdown: bool,
}

struct PublisherShared {
    state: Mutex<PublisherState>,
    signal: Condvar,
}

/// Shared submission side of the tree publisher.
#[derive(Clone)]
struct PublisherHandle(Arc<PublisherShared>);

impl PublisherHandle {
    fn submit(&self, wire: WireValue) {
        let mut state = self.0.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            return;
        }
        // Only the newest snapshot matters; an unconsumed one is replaced.
        state.latest = Some(wire);
        self.0.signal.notify_one();
    }
}

/// Publishes tree snapshots from a dedicated thread, coalescing bursts.
///
/// Commits can arrive far faster than the channel should carry full
/// snapshots. The worker always publishes the latest submitted snapshot
/// and silently drops any that were superseded while it was busy.
struct TreePublisher {
    shared: Arc<PublisherShared>,
    worker: Option<JoinHandle<()>>,
}

impl TreePublisher {
    fn spawn(endpoint: Arc<RpcEndpoint>) -> Self {
        let shared = Arc::new(PublisherShared {
            state: Mutex::new(PublisherState::default()),
            signal: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            loop {
                let wire = {
                    let mut state = worker_shared
                        .state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    loop {
                        if let Some(wire) = state.latest.take() {
                            break wire;
                        }
                        if state.shutdown {
                            return;
                        }
                        state = worker_shared
                            .signal
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                };
                endpoint.publish(TREE_UPDATED_TOPIC, &wire);
            }
        });
        Self {
            shared,
            worker: Some(worker),
        }
    }

    fn handle(&self) -> PublisherHandle {
        PublisherHandle(Arc::clone(&self.shared))
    }

    fn stop(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.shutdown = true;
        state.latest = None;
        self.shared.signal.notify_one();
    }
}

impl Drop for TreePublisher {
    fn drop(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!(target: TARGET, "tree publisher worker panicked");
        }
    }
}
