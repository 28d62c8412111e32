//! The bundled render-scanning plugin.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fiberscope_codec::{WireValue, decode_json, encode_json};
use fiberscope_rpc::HandlerError;
use serde::{Deserialize, Serialize};

use crate::manifest::{PluginManifest, PluginView};
use crate::plugin::{Plugin, PluginContext, PluginError};

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scan");

/// Identifier the scan plugin registers under.
pub const SCAN_PLUGIN_ID: &str = "react-scan";

const fn default_true() -> bool {
    true
}

/// Tunables for the render scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanOptions {
    /// Whether scanning starts as soon as the plugin is set up.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Show the floating toolbar in the host page.
    #[serde(default = "default_true")]
    pub show_toolbar: bool,
    /// Flag renders whose props and state were unchanged.
    pub track_unnecessary_renders: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            show_toolbar: true,
            track_unnecessary_renders: false,
        }
    }
}

/// Shared state of one scanning session.
#[derive(Debug, Default)]
pub struct ScanSession {
    active: AtomicBool,
    options: Mutex<ScanOptions>,
}

impl ScanSession {
    /// Creates an idle session with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether scanning is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Starts scanning.
    pub fn start(&self) {
        if !self.active.swap(true, Ordering::Relaxed) {
            tracing::info!(target: TARGET, "scan started");
        }
    }

    /// Stops scanning.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::Relaxed) {
            tracing::info!(target: TARGET, "scan stopped");
        }
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> ScanOptions {
        *self.lock_options()
    }

    /// Replaces the options.
    pub fn set_options(&self, options: ScanOptions) {
        *self.lock_options() = options;
    }

    fn lock_options(&self) -> MutexGuard<'_, ScanOptions> {
        self.options.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render scanner exposed to the panel as `react-scan:*` methods.
///
/// Contributes `getScanOptions`, `setScanOptions`, `startScan`, `stopScan`
/// and `isScanActive`. Scanning auto-starts at setup when the options say
/// so, and always stops at teardown.
#[derive(Debug, Default)]
pub struct ScanPlugin {
    session: Arc<ScanSession>,
}

impl ScanPlugin {
    /// Creates the plugin with a fresh session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the plugin over an externally held session, letting the host
    /// integration observe scan state directly.
    #[must_use]
    pub fn with_session(session: Arc<ScanSession>) -> Self {
        Self { session }
    }

    /// The shared session.
    #[must_use]
    pub fn session(&self) -> Arc<ScanSession> {
        Arc::clone(&self.session)
    }
}

impl Plugin for ScanPlugin {
    fn id(&self) -> &str {
        SCAN_PLUGIN_ID
    }

    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("React Scan")
            .with_view(PluginView::new("Scan", "plugins/react-scan/panel.html"))
    }

    fn setup(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let session = Arc::clone(&self.session);
        context.register_method(
            "getScanOptions",
            Arc::new(move |_args: &[WireValue]| {
                let options = serde_json::to_value(session.options())
                    .map_err(|error| HandlerError::failed(error.to_string()))?;
                Ok(encode_json(&options))
            }),
        );

        let session = Arc::clone(&self.session);
        context.register_method(
            "setScanOptions",
            Arc::new(move |args: &[WireValue]| {
                let wire = args
                    .first()
                    .ok_or_else(|| HandlerError::invalid_args("expected an options object"))?;
                let json = decode_json(wire)
                    .map_err(|error| HandlerError::invalid_args(error.to_string()))?;
                let options: ScanOptions = serde_json::from_value(json)
                    .map_err(|error| HandlerError::invalid_args(error.to_string()))?;
                session.set_options(options);
                Ok(WireValue::Null)
            }),
        );

        let session = Arc::clone(&self.session);
        context.register_method(
            "startScan",
            Arc::new(move |_args: &[WireValue]| {
                session.start();
                Ok(WireValue::Null)
            }),
        );

        let session = Arc::clone(&self.session);
        context.register_method(
            "stopScan",
            Arc::new(move |_args: &[WireValue]| {
                session.stop();
                Ok(WireValue::Null)
            }),
        );

        let session = Arc::clone(&self.session);
        context.register_method(
            "isScanActive",
            Arc::new(move |_args: &[WireValue]| Ok(WireValue::Bool(session.is_active()))),
        );

        if self.session.options().enabled {
            self.session.start();
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), PluginError> {
        self.session.stop();
        Ok(())
    }
}
