//! Live component-tree inspection for the instrumented host page.
//!
//! The inspector observes the host runtime's fiber tree through the
//! read-only [`FiberProvider`] seam, projects it into a serialisable
//! [`DisplayTreeNode`] tree with durable identifiers, and drives the
//! point-and-click selection machinery (hover highlight, click-to-select,
//! open-in-editor).
//!
//! The source tree is a live external structure: it can mutate or free
//! nodes between observations. Every provider access therefore returns a
//! `Result`, and the tree walk treats per-node failures as "skip this
//! node", never as a reason to abort a rebuild. Identity is tracked in a
//! side table keyed by structural path rather than by host object identity,
//! so a stale node reference can never corrupt the registry.

pub mod editor;
pub mod fiber;
pub mod hook;
pub mod identity;
pub mod session;
pub mod tree;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use self::editor::{
    EditorConfig, EditorOpener, EndpointStrategy, LauncherFn, OpenError, OpenStrategy,
    UrlSchemeStrategy,
};
pub use self::fiber::{
    FiberAccessError, FiberProvider, FiberRef, FiberTag, Point, SourceLocation, structural_path,
};
pub use self::hook::{CommitObserver, DevtoolsHook, ObserverHandle, RendererInfo};
pub use self::identity::FiberIdRegistry;
pub use self::session::{
    InspectorMode, InspectorOverlay, InspectorSession, InspectorState, ListenerId,
};
pub use self::tree::{DisplayTreeNode, TreeOptions, build_display_tree};
