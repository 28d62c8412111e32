//! End-to-end tests over an in-process host/panel pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use fiberscope_codec::WireValue;
use fiberscope_inspector::testing::{Rect, RecordingOverlay, SimulatedTree};
use fiberscope_inspector::{
    DevtoolsHook, DisplayTreeNode, EditorOpener, FiberRef, FiberTag, InspectorMode, OpenError,
    OpenStrategy, Point, RendererInfo, SourceLocation,
};
use fiberscope_plugins::ScanPlugin;
use rstest::rstest;

use crate::client::ClientSession;
use crate::host::HostOptions;
use crate::presets::{DevtoolsPair, iframe_host, iframe_panel, linked};

fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// Records every location it is asked to open, always succeeding.
struct RecordingStrategy {
    opened: Arc<Mutex<Vec<SourceLocation>>>,
}

impl OpenStrategy for RecordingStrategy {
    fn name(&self) -> &str {
        "recording"
    }

    fn attempt(&self, location: &SourceLocation) -> Result<(), OpenError> {
        self.opened.lock().expect("poisoned").push(location.clone());
        Ok(())
    }
}

struct Harness {
    pair: DevtoolsPair,
    tree: Arc<SimulatedTree>,
    hook: Arc<DevtoolsHook>,
    renderer: u64,
    app: FiberRef,
    button: FiberRef,
    opened: Arc<Mutex<Vec<SourceLocation>>>,
}

/// Root -> App -> Button, with Button's host element under the pointer at
/// (15, 15).
fn harness() -> Harness {
    harness_with(HostOptions::default())
}

fn harness_with(options: HostOptions) -> Harness {
    let tree = Arc::new(SimulatedTree::new());
    let root = tree.add_node(None, FiberTag::HostRoot, None);
    let app = tree.add_node(Some(root), FiberTag::FunctionComponent, Some("App"));
    let button = tree.add_node(Some(app), FiberTag::FunctionComponent, Some("Button"));
    let button_host = tree.add_node(Some(button), FiberTag::HostComponent, Some("button"));
    tree.set_hit_region(button_host, Rect::new(0, 0, 50, 50));

    let opened = Arc::new(Mutex::new(Vec::new()));
    let opener = EditorOpener::new(vec![Box::new(RecordingStrategy {
        opened: Arc::clone(&opened),
    })]);

    let hook = Arc::new(DevtoolsHook::new());
    let renderer = hook.inject(RendererInfo::new("react-dom", "18.2.0"));
    let pair = linked(
        Arc::clone(&tree) as Arc<dyn fiberscope_inspector::FiberProvider>,
        Box::new(RecordingOverlay::new()),
        opener,
        &hook,
        options,
    )
    .expect("pairing failed");

    Harness {
        pair,
        tree,
        hook,
        renderer,
        app,
        button,
        opened,
    }
}

fn find_node<'a>(root: &'a DisplayTreeNode, name: &str) -> Option<&'a DisplayTreeNode> {
    if root.name == name {
        return Some(root);
    }
    root.children
        .iter()
        .find_map(|child| find_node(child, name))
}

#[rstest]
fn commit_pushes_snapshot_to_the_panel_store() {
    let harness = harness();
    let store = harness.pair.client.store();
    assert_eq!(store.revision(), 0);

    harness.hook.on_commit_fiber_root(harness.renderer, None);

    assert!(wait_until(Duration::from_secs(2), || store.revision() >= 1));
    let snapshot = store.tree().expect("empty store");
    assert!(find_node(&snapshot, "App").is_some());
    assert!(find_node(&snapshot, "Button").is_some());
}

#[rstest]
fn commit_bursts_coalesce_to_the_latest_snapshot() {
    let harness = harness();
    let store = harness.pair.client.store();

    for _ in 0..100 {
        harness.hook.on_commit_fiber_root(harness.renderer, None);
    }
    harness
        .tree
        .add_node(Some(harness.app), FiberTag::FunctionComponent, Some("Footer"));
    harness.hook.on_commit_fiber_root(harness.renderer, None);

    // The store must converge on the newest tree; intermediate snapshots
    // may be dropped entirely.
    assert!(wait_until(Duration::from_secs(2), || {
        store
            .tree()
            .is_some_and(|tree| find_node(&tree, "Footer").is_some())
    }));
}

#[rstest]
fn fetch_tree_pulls_on_demand() {
    let harness = harness();

    let tree = harness
        .pair
        .client
        .fetch_tree()
        .expect("fetch failed")
        .expect("no tree mounted");

    assert_eq!(tree.tag, FiberTag::HostRoot);
    assert!(find_node(&tree, "Button").is_some());
    assert_eq!(harness.pair.client.store().revision(), 1);
}

#[rstest]
fn panel_driven_selection_round_trips() {
    let harness = harness();
    let picked = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&picked);
    let _selection = harness
        .pair
        .client
        .on_component_selected(move |id| sink.lock().expect("poisoned").push(id.to_owned()))
        .expect("subscribe failed");

    harness
        .pair
        .client
        .toggle_inspector(true, Some(InspectorMode::SelectComponent))
        .expect("toggle failed");
    harness.pair.host.click(Point::new(15, 15));

    assert!(wait_until(Duration::from_secs(2), || {
        !picked.lock().expect("poisoned").is_empty()
    }));

    // The emitted identifier matches the Button node in the projection.
    let tree = harness
        .pair
        .client
        .fetch_tree()
        .expect("fetch failed")
        .expect("no tree mounted");
    let button = find_node(&tree, "Button").expect("missing node");
    assert_eq!(picked.lock().expect("poisoned").clone(), vec![button.id.clone()]);
}

#[rstest]
fn host_side_open_in_editor_pick_uses_the_opener() {
    let harness = harness();
    let source = SourceLocation::new("src/App.tsx", 30, 9);
    harness.tree.set_source(harness.app, source.clone());

    harness
        .pair
        .host
        .toggle_inspector(true, Some(InspectorMode::OpenInEditor));
    harness.pair.host.click(Point::new(10, 10));

    assert_eq!(harness.opened.lock().expect("poisoned").clone(), vec![source]);
}

#[rstest]
fn panel_requested_open_in_editor_reports_success() {
    let harness = harness();
    let location = SourceLocation::new("src/Button.tsx", 5, 1);

    let opened = harness
        .pair
        .client
        .open_in_editor(&location)
        .expect("call failed");

    assert!(opened);
    assert_eq!(
        harness.opened.lock().expect("poisoned").clone(),
        vec![location]
    );
}

#[rstest]
fn plugins_are_listed_and_callable_from_the_panel() {
    let harness = harness();
    harness
        .pair
        .host
        .register_plugin(Box::new(ScanPlugin::new()))
        .expect("registration failed");

    let descriptors = harness.pair.client.plugins().expect("listing failed");
    assert_eq!(descriptors.len(), 1);
    let scan = &descriptors[0];
    assert_eq!(scan.id, "react-scan");
    assert_eq!(scan.name, "React Scan");
    assert!(scan.view.is_some());

    let active = harness
        .pair
        .client
        .endpoint()
        .call("react-scan:isScanActive", vec![])
        .expect("call failed");
    assert_eq!(active, WireValue::Bool(true));
}

#[rstest]
fn unmounted_position_gets_a_fresh_identifier() {
    let harness = harness();
    let store = harness.pair.client.store();
    harness.hook.on_commit_fiber_root(harness.renderer, None);
    assert!(wait_until(Duration::from_secs(2), || store.revision() >= 1));
    let old_id = find_node(&store.tree().expect("empty store"), "Button")
        .expect("missing node")
        .id
        .clone();

    // Unmount is reported while the node is still linked, then the renderer
    // mounts a replacement at the same position.
    harness
        .hook
        .on_commit_fiber_unmount(harness.renderer, harness.button);
    harness.tree.remove_subtree(harness.button);
    harness
        .tree
        .add_node(Some(harness.app), FiberTag::FunctionComponent, Some("Button"));
    harness.hook.on_commit_fiber_root(harness.renderer, None);

    assert!(wait_until(Duration::from_secs(2), || {
        store
            .tree()
            .and_then(|tree| find_node(&tree, "Button").map(|node| node.id.clone()))
            .is_some_and(|id| id != old_id)
    }));
}

#[rstest]
fn close_tears_down_plugins_and_endpoint() {
    let harness = harness_with(HostOptions {
        rpc: fiberscope_rpc::RpcOptions {
            timeout: Duration::from_millis(200),
        },
        ..HostOptions::default()
    });
    harness
        .pair
        .host
        .register_plugin(Box::new(ScanPlugin::new()))
        .expect("registration failed");

    harness.pair.host.close();

    assert!(!harness.pair.host.plugins().is_registered("react-scan"));
    assert!(harness.pair.client.fetch_tree().is_err());
}

#[rstest]
fn iframe_presets_complete_handshake_and_carry_rpc() {
    let tree = Arc::new(SimulatedTree::new());
    let root = tree.add_node(None, FiberTag::HostRoot, None);
    tree.add_node(Some(root), FiberTag::FunctionComponent, Some("App"));
    let hook = Arc::new(DevtoolsHook::new());

    // Each side posts into a queue the embedding would bridge across the
    // window boundary; pump threads feed the opposite channel's deliver.
    let (host_out_tx, host_out_rx) = mpsc::channel::<String>();
    let (panel_out_tx, panel_out_rx) = mpsc::channel::<String>();

    let host = iframe_host(
        Box::new(move |payload: &str| {
            drop(host_out_tx.send(payload.to_owned()));
        }),
        Arc::clone(&tree) as Arc<dyn fiberscope_inspector::FiberProvider>,
        Box::new(RecordingOverlay::new()),
        EditorOpener::new(vec![]),
        &hook,
        HostOptions::default(),
        Duration::from_millis(5),
    );

    let ready = Arc::new(AtomicBool::new(false));
    let ready_flag = Arc::clone(&ready);
    let panel = iframe_panel(
        Box::new(move |payload: &str| {
            drop(panel_out_tx.send(payload.to_owned()));
        }),
        fiberscope_rpc::RpcOptions::default(),
        move || ready_flag.store(true, Ordering::Release),
    );

    let to_panel = Arc::clone(&panel.channel);
    thread::spawn(move || {
        while let Ok(payload) = host_out_rx.recv() {
            to_panel.deliver(&payload);
        }
    });
    let to_host = Arc::clone(&host.channel);
    thread::spawn(move || {
        while let Ok(payload) = panel_out_rx.recv() {
            to_host.deliver(&payload);
        }
    });

    assert!(wait_until(Duration::from_secs(2), || host.is_acknowledged()));
    assert!(wait_until(Duration::from_secs(2), || {
        ready.load(Ordering::Acquire)
    }));

    let client = ClientSession::attach(Arc::clone(&panel.endpoint)).expect("attach failed");
    let snapshot = client
        .fetch_tree()
        .expect("fetch failed")
        .expect("no tree mounted");
    assert!(find_node(&snapshot, "App").is_some());
}
