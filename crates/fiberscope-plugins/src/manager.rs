//! Plugin registration and lifecycle.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fiberscope_rpc::RpcEndpoint;

use crate::manifest::PluginManifest;
use crate::plugin::{Plugin, PluginContext, PluginError};

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::manager");

struct RegisteredPlugin {
    id: String,
    manifest: PluginManifest,
    plugin: Box<dyn Plugin>,
    methods: Vec<String>,
}

/// Owns the registered plugins and their contributed endpoint methods.
///
/// Registration order is preserved and reported to the panel shell.
/// Unregistration always withdraws the plugin's methods, whether or not the
/// plugin's teardown cooperates; a teardown error or panic is logged and
/// contained.
pub struct PluginManager {
    endpoint: Arc<RpcEndpoint>,
    plugins: Mutex<Vec<RegisteredPlugin>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    /// Creates a manager contributing methods to an endpoint.
    #[must_use]
    pub fn new(endpoint: Arc<RpcEndpoint>) -> Self {
        Self {
            endpoint,
            plugins: Mutex::new(Vec::new()),
        }
    }

    /// Registers and sets up a plugin.
    ///
    /// # Errors
    ///
    /// [`PluginError::AlreadyRegistered`] when the identifier is taken, or
    /// the plugin's own setup error. A failed setup leaves no trace: every
    /// method the plugin registered before failing is withdrawn.
    pub fn register(&self, mut plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let id = plugin.id().to_owned();
        let mut plugins = self.lock();
        if plugins.iter().any(|entry| entry.id == id) {
            return Err(PluginError::AlreadyRegistered { id });
        }

        let mut context = PluginContext::new(&id, &self.endpoint);
        if let Err(error) = plugin.setup(&mut context) {
            for method in context.into_registered_methods() {
                self.endpoint.unregister_handler(&method);
            }
            tracing::warn!(target: TARGET, plugin = %id, %error, "plugin setup failed");
            return Err(error);
        }

        let manifest = plugin.manifest();
        let methods = context.into_registered_methods();
        tracing::info!(
            target: TARGET,
            plugin = %id,
            methods = methods.len(),
            "plugin registered"
        );
        plugins.push(RegisteredPlugin {
            id,
            manifest,
            plugin,
            methods,
        });
        Ok(())
    }

    /// Unregisters a plugin, tearing it down and withdrawing its methods.
    ///
    /// # Errors
    ///
    /// [`PluginError::UnknownPlugin`] when nothing is registered under the
    /// identifier. Teardown failures are logged, never returned.
    pub fn unregister(&self, id: &str) -> Result<(), PluginError> {
        let mut plugins = self.lock();
        let position = plugins
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| PluginError::UnknownPlugin { id: id.to_owned() })?;
        let entry = plugins.remove(position);
        drop(plugins);
        self.retire(entry);
        Ok(())
    }

    /// Tears down every plugin in reverse registration order.
    pub fn teardown_all(&self) {
        let entries: Vec<_> = {
            let mut plugins = self.lock();
            plugins.drain(..).rev().collect()
        };
        for entry in entries {
            self.retire(entry);
        }
    }

    /// Registered plugins as `(id, manifest)` in registration order.
    #[must_use]
    pub fn manifests(&self) -> Vec<(String, PluginManifest)> {
        self.lock()
            .iter()
            .map(|entry| (entry.id.clone(), entry.manifest.clone()))
            .collect()
    }

    /// Returns whether a plugin is registered under the identifier.
    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().iter().any(|entry| entry.id == id)
    }

    fn retire(&self, mut entry: RegisteredPlugin) {
        // Methods go first so a misbehaving teardown cannot leave callable
        // handlers behind.
        for method in &entry.methods {
            self.endpoint.unregister_handler(method);
        }
        match catch_unwind(AssertUnwindSafe(|| entry.plugin.teardown())) {
            Ok(Ok(())) => {
                tracing::info!(target: TARGET, plugin = %entry.id, "plugin unregistered");
            }
            Ok(Err(error)) => {
                tracing::warn!(target: TARGET, plugin = %entry.id, %error, "plugin teardown failed");
            }
            Err(_) => {
                tracing::error!(target: TARGET, plugin = %entry.id, "plugin teardown panicked");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RegisteredPlugin>> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
