//! Method names and event topics of the host surface.

/// Returns the current display tree.
pub const GET_TREE_METHOD: &str = "getTree";

/// Arms or disarms the point-and-click inspector.
pub const TOGGLE_INSPECTOR_METHOD: &str = "toggleInspector";

/// Opens a source location in the developer's editor.
pub const OPEN_IN_EDITOR_METHOD: &str = "openInEditor";

/// Lists the registered plugins.
pub const GET_PLUGINS_METHOD: &str = "getPlugins";

/// Event carrying a fresh display-tree snapshot after a commit.
pub const TREE_UPDATED_TOPIC: &str = "devtools:tree-updated";

/// Event carrying the identifier picked by select-component inspection.
pub const INSPECT_SELECTED_TOPIC: &str = "devtools:inspect-selected";
