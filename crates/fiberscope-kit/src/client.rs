//! The panel side: a read model of the host tree plus command calls.

use std::sync::{Arc, Mutex, PoisonError};

use fiberscope_codec::{WireValue, decode_json, encode_json};
use fiberscope_inspector::{DisplayTreeNode, InspectorMode, SourceLocation};
use fiberscope_plugins::PluginView;
use fiberscope_rpc::{EventSubscription, RpcEndpoint, RpcError};
use serde::Deserialize;

use crate::api::{
    GET_PLUGINS_METHOD, GET_TREE_METHOD, INSPECT_SELECTED_TOPIC, OPEN_IN_EDITOR_METHOD,
    TOGGLE_INSPECTOR_METHOD, TREE_UPDATED_TOPIC,
};
use crate::error::ClientError;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// A plugin as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin identifier, the method and topic namespace.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Panel view, when the plugin contributes one.
    #[serde(default)]
    pub view: Option<PluginView>,
}

#[derive(Default)]
struct StoreState {
    tree: Option<DisplayTreeNode>,
    revision: u64,
}

/// Last-write-wins holder of the most recent display tree.
///
/// Snapshots are whole trees, so applying one never needs the previous
/// state; whichever snapshot arrives last simply replaces the store. The
/// revision counter lets views cheaply detect staleness.
#[derive(Default)]
pub struct TreeStore {
    state: Mutex<StoreState>,
}

impl TreeStore {
    fn apply(&self, tree: Option<DisplayTreeNode>) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tree = tree;
        state.revision += 1;
        state.revision
    }

    /// The current tree, or `None` while nothing is mounted.
    #[must_use]
    pub fn tree(&self) -> Option<DisplayTreeNode> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tree
            .clone()
    }

    /// Number of snapshots applied so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("revision", &self.revision())
            .finish()
    }
}

/// Panel-side façade over the host's RPC surface.
pub struct ClientSession {
    endpoint: Arc<RpcEndpoint>,
    store: Arc<TreeStore>,
    _tree_events: EventSubscription,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession").finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Attaches to a host over an established endpoint, subscribing to tree
    /// updates.
    ///
    /// # Errors
    ///
    /// Any error the subscription call can produce.
    pub fn attach(endpoint: Arc<RpcEndpoint>) -> Result<Self, RpcError> {
        let store = Arc::new(TreeStore::default());
        let sink = Arc::clone(&store);
        let subscription = endpoint.subscribe(
            TREE_UPDATED_TOPIC,
            Arc::new(move |payload: &WireValue| match parse_tree(payload) {
                Ok(tree) => {
                    sink.apply(tree);
                }
                Err(error) => {
                    tracing::warn!(target: TARGET, %error, "dropping malformed tree snapshot");
                }
            }),
        )?;
        Ok(Self {
            endpoint,
            store,
            _tree_events: subscription,
        })
    }

    /// The shared read model fed by tree-update events.
    #[must_use]
    pub fn store(&self) -> Arc<TreeStore> {
        Arc::clone(&self.store)
    }

    /// The underlying endpoint, for calling plugin-contributed methods.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<RpcEndpoint> {
        &self.endpoint
    }

    /// Pulls the current tree from the host and applies it to the store.
    ///
    /// # Errors
    ///
    /// RPC failure or a malformed response.
    pub fn fetch_tree(&self) -> Result<Option<DisplayTreeNode>, ClientError> {
        let wire = self.endpoint.call(GET_TREE_METHOD, vec![])?;
        let tree = parse_tree(&wire)?;
        self.store.apply(tree.clone());
        Ok(tree)
    }

    /// Arms or disarms point-and-click inspection in the host page.
    ///
    /// # Errors
    ///
    /// RPC failure.
    pub fn toggle_inspector(
        &self,
        enabled: bool,
        mode: Option<InspectorMode>,
    ) -> Result<(), ClientError> {
        let mut args = vec![WireValue::Bool(enabled)];
        if let Some(mode) = mode {
            args.push(WireValue::Str(mode_name(mode).to_owned()));
        }
        self.endpoint.call(TOGGLE_INSPECTOR_METHOD, args)?;
        Ok(())
    }

    /// Asks the host to open a source location in the editor.
    ///
    /// # Errors
    ///
    /// RPC failure or a malformed response.
    pub fn open_in_editor(&self, location: &SourceLocation) -> Result<bool, ClientError> {
        let json = serde_json::to_value(location)
            .map_err(|error| ClientError::payload(error.to_string()))?;
        let wire = self
            .endpoint
            .call(OPEN_IN_EDITOR_METHOD, vec![encode_json(&json)])?;
        wire.as_bool()
            .ok_or_else(|| ClientError::payload("expected a boolean result"))
    }

    /// Lists the plugins registered on the host.
    ///
    /// # Errors
    ///
    /// RPC failure or a malformed response.
    pub fn plugins(&self) -> Result<Vec<PluginDescriptor>, ClientError> {
        let wire = self.endpoint.call(GET_PLUGINS_METHOD, vec![])?;
        let json = decode_json(&wire)?;
        serde_json::from_value(json).map_err(|error| ClientError::payload(error.to_string()))
    }

    /// Subscribes to component picks completed by select-component
    /// inspection.
    ///
    /// # Errors
    ///
    /// Any error the subscription call can produce.
    pub fn on_component_selected(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<EventSubscription, RpcError> {
        self.endpoint.subscribe(
            INSPECT_SELECTED_TOPIC,
            Arc::new(move |payload: &WireValue| {
                if let WireValue::Str(id) = payload {
                    callback(id);
                } else {
                    tracing::warn!(target: TARGET, "dropping non-string selection payload");
                }
            }),
        )
    }
}

fn parse_tree(payload: &WireValue) -> Result<Option<DisplayTreeNode>, ClientError> {
    if matches!(payload, WireValue::Null) {
        return Ok(None);
    }
    let json = decode_json(payload)?;
    serde_json::from_value(json)
        .map(Some)
        .map_err(|error| ClientError::payload(error.to_string()))
}

const fn mode_name(mode: InspectorMode) -> &'static str {
    match mode {
        InspectorMode::SelectComponent => "select-component",
        InspectorMode::OpenInEditor => "open-in-editor",
    }
}
