//! The plugin contract and the setup-time context.

use fiberscope_codec::WireValue;
use fiberscope_rpc::{HandlerFn, RpcEndpoint};
use thiserror::Error;

use crate::manifest::PluginManifest;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::plugin");

/// Failure in the plugin lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// Another plugin already claimed this identifier.
    #[error("plugin {id:?} is already registered")]
    AlreadyRegistered {
        /// The contested identifier.
        id: String,
    },

    /// No plugin is registered under the identifier.
    #[error("no plugin registered as {id:?}")]
    UnknownPlugin {
        /// The unknown identifier.
        id: String,
    },

    /// The plugin's own setup or teardown logic failed.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

impl PluginError {
    /// Wraps a plugin-reported failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// A devtools plugin.
///
/// Plugins are set up exactly once per registration. Everything a plugin
/// contributes at setup goes through the [`PluginContext`], which scopes it
/// to the plugin's identifier so it can be withdrawn wholesale at
/// unregistration.
pub trait Plugin: Send {
    /// Stable identifier, used as the method and topic namespace.
    fn id(&self) -> &str;

    /// What this plugin contributes, as shown to the panel shell.
    fn manifest(&self) -> PluginManifest;

    /// Called once when the plugin is registered.
    ///
    /// # Errors
    ///
    /// A failed setup aborts the registration; anything already contributed
    /// through the context is withdrawn.
    fn setup(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError>;

    /// Called once when the plugin is unregistered.
    ///
    /// # Errors
    ///
    /// Teardown failures are logged by the manager and never block
    /// unregistration.
    fn teardown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Setup-time handle a plugin contributes through.
///
/// Method names and event topics are namespaced as `<plugin id>:<name>`;
/// collisions between plugins are impossible by construction.
pub struct PluginContext<'a> {
    plugin_id: &'a str,
    endpoint: &'a RpcEndpoint,
    registered: Vec<String>,
}

impl std::fmt::Debug for PluginContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(plugin_id: &'a str, endpoint: &'a RpcEndpoint) -> Self {
        Self {
            plugin_id,
            endpoint,
            registered: Vec::new(),
        }
    }

    /// The identifier of the plugin being set up.
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        self.plugin_id
    }

    /// Exposes a method as `<plugin id>:<method>` on the endpoint.
    pub fn register_method(&mut self, method: &str, handler: HandlerFn) {
        let qualified = format!("{}:{method}", self.plugin_id);
        tracing::debug!(target: TARGET, method = %qualified, "plugin method registered");
        self.endpoint.register_handler(qualified.clone(), handler);
        self.registered.push(qualified);
    }

    /// Publishes an event on the namespaced topic `<plugin id>:<event>`.
    pub fn emit(&self, event: &str, payload: &WireValue) {
        self.endpoint
            .publish(&format!("{}:{event}", self.plugin_id), payload);
    }

    pub(crate) fn into_registered_methods(self) -> Vec<String> {
        self.registered
    }
}
