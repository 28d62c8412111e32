//! Third-party panel plugins hosted inside the devtools.
//!
//! A plugin contributes a panel view and a set of remotely callable
//! methods. The [`PluginManager`] owns the plugin lifecycle: registration
//! runs the plugin's setup with a [`PluginContext`] that namespaces every
//! contributed method under `<plugin id>:`, and unregistration tears the
//! plugin down while guaranteeing its methods are withdrawn even when
//! teardown itself misbehaves.

pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod scan;

pub use self::manager::PluginManager;
pub use self::manifest::{PluginManifest, PluginView};
pub use self::plugin::{Plugin, PluginContext, PluginError};
pub use self::scan::{ScanOptions, ScanPlugin, ScanSession};

#[cfg(test)]
mod tests;
