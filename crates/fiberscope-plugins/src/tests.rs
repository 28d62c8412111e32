//! Lifecycle tests against a live endpoint pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fiberscope_codec::WireValue;
use fiberscope_rpc::presets::{LinkedEndpoints, linked_pair};
use fiberscope_rpc::{HandlerTable, RpcEndpoint, RpcError, RpcOptions};
use rstest::rstest;

use crate::manager::PluginManager;
use crate::manifest::PluginManifest;
use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::scan::{SCAN_PLUGIN_ID, ScanPlugin};

/// Host endpoint with a manager, panel endpoint for calling in.
fn manager_fixture() -> (PluginManager, RpcEndpoint) {
    let LinkedEndpoints { host, panel } = linked_pair(
        HandlerTable::new(),
        HandlerTable::new(),
        RpcOptions::default(),
    );
    (PluginManager::new(Arc::new(host)), panel)
}

struct TogglePlugin {
    torn_down: Arc<AtomicBool>,
    fail_setup: bool,
    fail_teardown: bool,
    panic_teardown: bool,
}

impl TogglePlugin {
    fn well_behaved(torn_down: Arc<AtomicBool>) -> Self {
        Self {
            torn_down,
            fail_setup: false,
            fail_teardown: false,
            panic_teardown: false,
        }
    }
}

impl Plugin for TogglePlugin {
    fn id(&self) -> &str {
        "toggle"
    }

    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("Toggle")
    }

    fn setup(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError> {
        context.register_method(
            "ping",
            Arc::new(|_args: &[WireValue]| Ok(WireValue::Str("pong".to_owned()))),
        );
        if self.fail_setup {
            return Err(PluginError::failed("setup rejected"));
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), PluginError> {
        self.torn_down.store(true, Ordering::Relaxed);
        if self.panic_teardown {
            panic!("teardown panicked");
        }
        if self.fail_teardown {
            return Err(PluginError::failed("teardown rejected"));
        }
        Ok(())
    }
}

#[rstest]
fn registered_methods_are_callable_under_the_plugin_namespace() {
    let (manager, panel) = manager_fixture();
    manager
        .register(Box::new(ScanPlugin::new()))
        .expect("registration failed");

    let active = panel
        .call("react-scan:isScanActive", vec![])
        .expect("call failed");

    // Default options auto-start the scan at setup.
    assert_eq!(active, WireValue::Bool(true));
    assert!(manager.is_registered(SCAN_PLUGIN_ID));
}

#[rstest]
fn scan_options_round_trip_over_the_wire() {
    let (manager, panel) = manager_fixture();
    let plugin = ScanPlugin::new();
    let session = plugin.session();
    manager
        .register(Box::new(plugin))
        .expect("registration failed");

    let options = panel
        .call("react-scan:getScanOptions", vec![])
        .expect("call failed");
    let json = fiberscope_codec::decode_json(&options).expect("decode failed");
    assert_eq!(json["showToolbar"], serde_json::json!(true));

    let updated = fiberscope_codec::encode_json(&serde_json::json!({
        "enabled": false,
        "trackUnnecessaryRenders": true,
    }));
    panel
        .call("react-scan:setScanOptions", vec![updated])
        .expect("call failed");
    assert!(session.options().track_unnecessary_renders);
    assert!(!session.options().enabled);

    panel
        .call("react-scan:stopScan", vec![])
        .expect("call failed");
    assert!(!session.is_active());
}

#[rstest]
fn duplicate_identifier_is_rejected() {
    let (manager, _panel) = manager_fixture();
    manager
        .register(Box::new(ScanPlugin::new()))
        .expect("registration failed");

    let duplicate = manager.register(Box::new(ScanPlugin::new()));

    assert_eq!(
        duplicate,
        Err(PluginError::AlreadyRegistered {
            id: SCAN_PLUGIN_ID.to_owned(),
        })
    );
    // The original registration is untouched.
    assert!(manager.is_registered(SCAN_PLUGIN_ID));
}

#[rstest]
fn failed_setup_withdraws_everything_it_registered() {
    let (manager, panel) = manager_fixture();
    let torn_down = Arc::new(AtomicBool::new(false));
    let plugin = TogglePlugin {
        fail_setup: true,
        ..TogglePlugin::well_behaved(Arc::clone(&torn_down))
    };

    let outcome = manager.register(Box::new(plugin));

    assert_eq!(outcome, Err(PluginError::failed("setup rejected")));
    assert!(!manager.is_registered("toggle"));
    // The method registered before the failure must be gone.
    assert!(matches!(
        panel.call("toggle:ping", vec![]),
        Err(RpcError::MethodNotFound { .. })
    ));
}

#[rstest]
fn unregister_tears_down_and_withdraws_methods() {
    let (manager, panel) = manager_fixture();
    let torn_down = Arc::new(AtomicBool::new(false));
    manager
        .register(Box::new(TogglePlugin::well_behaved(Arc::clone(&torn_down))))
        .expect("registration failed");
    assert_eq!(
        panel.call("toggle:ping", vec![]).expect("call failed"),
        WireValue::Str("pong".to_owned())
    );

    manager.unregister("toggle").expect("unregister failed");

    assert!(torn_down.load(Ordering::Relaxed));
    assert!(matches!(
        panel.call("toggle:ping", vec![]),
        Err(RpcError::MethodNotFound { .. })
    ));
    assert_eq!(
        manager.unregister("toggle"),
        Err(PluginError::UnknownPlugin {
            id: "toggle".to_owned(),
        })
    );
}

#[rstest]
fn teardown_failure_is_contained() {
    let (manager, panel) = manager_fixture();
    let torn_down = Arc::new(AtomicBool::new(false));
    let plugin = TogglePlugin {
        fail_teardown: true,
        ..TogglePlugin::well_behaved(Arc::clone(&torn_down))
    };
    manager.register(Box::new(plugin)).expect("registration failed");

    manager.unregister("toggle").expect("unregister failed");

    assert!(torn_down.load(Ordering::Relaxed));
    assert!(matches!(
        panel.call("toggle:ping", vec![]),
        Err(RpcError::MethodNotFound { .. })
    ));
}

#[rstest]
fn teardown_panic_is_contained() {
    let (manager, panel) = manager_fixture();
    let torn_down = Arc::new(AtomicBool::new(false));
    let plugin = TogglePlugin {
        panic_teardown: true,
        ..TogglePlugin::well_behaved(Arc::clone(&torn_down))
    };
    manager.register(Box::new(plugin)).expect("registration failed");

    manager.teardown_all();

    assert!(torn_down.load(Ordering::Relaxed));
    assert!(!manager.is_registered("toggle"));
    assert!(matches!(
        panel.call("toggle:ping", vec![]),
        Err(RpcError::MethodNotFound { .. })
    ));
}

#[rstest]
fn manifests_report_in_registration_order() {
    let (manager, _panel) = manager_fixture();
    let torn_down = Arc::new(AtomicBool::new(false));
    manager
        .register(Box::new(TogglePlugin::well_behaved(torn_down)))
        .expect("registration failed");
    manager
        .register(Box::new(ScanPlugin::new()))
        .expect("registration failed");

    let ids: Vec<_> = manager
        .manifests()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["toggle".to_owned(), SCAN_PLUGIN_ID.to_owned()]);
}
