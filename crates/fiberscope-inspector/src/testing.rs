//! Simulated fiber trees and a recording overlay for tests.
//!
//! Enabled for this crate's own tests and, behind the `test-support`
//! feature, for downstream crates exercising the inspection pipeline
//! without a real host runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fiber::{
    FiberAccessError, FiberProvider, FiberRef, FiberTag, Point, SourceLocation,
};
use crate::session::InspectorOverlay;

/// Axis-aligned hit region for pointer resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x.saturating_add(self.width)
            && point.y >= self.y
            && point.y < self.y.saturating_add(self.height)
    }
}

struct NodeState {
    tag: FiberTag,
    name: Option<String>,
    key: Option<String>,
    source: Option<SourceLocation>,
    parent: Option<FiberRef>,
    children: Vec<FiberRef>,
    rect: Option<Rect>,
    alive: bool,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<u64, NodeState>,
    root: Option<FiberRef>,
    next: u64,
    /// Deliberate corruption for cycle-guard tests.
    forced_siblings: HashMap<u64, FiberRef>,
    forced_parents: HashMap<u64, FiberRef>,
}

/// An in-memory fiber tree the tests mutate directly.
///
/// Nodes removed with [`SimulatedTree::remove_subtree`] stay in the arena
/// but answer every observation with [`FiberAccessError::Gone`], matching a
/// host runtime that freed the node while a stale handle survives.
#[derive(Default)]
pub struct SimulatedTree {
    state: Mutex<TreeState>,
}

impl SimulatedTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under `parent`, or as the root when `parent` is `None`.
    pub fn add_node(
        &self,
        parent: Option<FiberRef>,
        tag: FiberTag,
        name: Option<&str>,
    ) -> FiberRef {
        let mut state = self.lock();
        state.next += 1;
        let fiber = FiberRef(state.next);
        state.nodes.insert(
            fiber.0,
            NodeState {
                tag,
                name: name.map(str::to_owned),
                key: None,
                source: None,
                parent,
                children: Vec::new(),
                rect: None,
                alive: true,
            },
        );
        match parent {
            Some(parent) => {
                if let Some(node) = state.nodes.get_mut(&parent.0) {
                    node.children.push(fiber);
                }
            }
            None => state.root = Some(fiber),
        }
        fiber
    }

    /// Attaches a debug source location to a node.
    pub fn set_source(&self, fiber: FiberRef, source: SourceLocation) {
        if let Some(node) = self.lock().nodes.get_mut(&fiber.0) {
            node.source = Some(source);
        }
    }

    /// Sets a node's reconciliation key.
    pub fn set_key(&self, fiber: FiberRef, key: &str) {
        if let Some(node) = self.lock().nodes.get_mut(&fiber.0) {
            node.key = Some(key.to_owned());
        }
    }

    /// Gives a node a viewport hit region.
    pub fn set_hit_region(&self, fiber: FiberRef, rect: Rect) {
        if let Some(node) = self.lock().nodes.get_mut(&fiber.0) {
            node.rect = Some(rect);
        }
    }

    /// Unmounts a node and its whole subtree.
    ///
    /// Stale handles into the removed subtree keep failing with `Gone`.
    pub fn remove_subtree(&self, fiber: FiberRef) {
        let mut state = self.lock();
        let mut pending = vec![fiber];
        while let Some(current) = pending.pop() {
            if let Some(node) = state.nodes.get_mut(&current.0) {
                node.alive = false;
                pending.extend(node.children.iter().copied());
            }
        }
        if let Some(parent) = state.nodes.get(&fiber.0).and_then(|node| node.parent)
            && let Some(parent_node) = state.nodes.get_mut(&parent.0)
        {
            parent_node.children.retain(|child| *child != fiber);
        }
        if state.root == Some(fiber) {
            state.root = None;
        }
    }

    /// Corrupts a node's sibling link, for cycle-guard tests.
    pub fn force_sibling(&self, fiber: FiberRef, sibling: FiberRef) {
        self.lock().forced_siblings.insert(fiber.0, sibling);
    }

    /// Corrupts a node's parent link, for cycle-guard tests.
    pub fn force_parent(&self, fiber: FiberRef, parent: FiberRef) {
        self.lock().forced_parents.insert(fiber.0, parent);
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_live_node<T>(
        &self,
        fiber: FiberRef,
        read: impl FnOnce(&TreeState, &NodeState) -> T,
    ) -> Result<T, FiberAccessError> {
        let state = self.lock();
        let node = state
            .nodes
            .get(&fiber.0)
            .filter(|node| node.alive)
            .ok_or(FiberAccessError::Gone(fiber))?;
        Ok(read(&state, node))
    }
}

impl FiberProvider for SimulatedTree {
    fn root(&self) -> Result<Option<FiberRef>, FiberAccessError> {
        Ok(self.lock().root)
    }

    fn child(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError> {
        self.with_live_node(fiber, |state, node| {
            node.children
                .iter()
                .copied()
                .find(|child| state.nodes.get(&child.0).is_some_and(|node| node.alive))
        })
    }

    fn sibling(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError> {
        self.with_live_node(fiber, |state, node| {
            if let Some(forced) = state.forced_siblings.get(&fiber.0) {
                return Some(*forced);
            }
            let parent = node.parent?;
            let siblings = &state.nodes.get(&parent.0)?.children;
            let position = siblings.iter().position(|child| *child == fiber)?;
            siblings
                .iter()
                .skip(position + 1)
                .copied()
                .find(|child| state.nodes.get(&child.0).is_some_and(|node| node.alive))
        })
    }

    fn parent(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError> {
        self.with_live_node(fiber, |state, node| {
            state
                .forced_parents
                .get(&fiber.0)
                .copied()
                .or(node.parent)
        })
    }

    fn tag(&self, fiber: FiberRef) -> Result<FiberTag, FiberAccessError> {
        self.with_live_node(fiber, |_, node| node.tag)
    }

    fn display_name(&self, fiber: FiberRef) -> Result<Option<String>, FiberAccessError> {
        self.with_live_node(fiber, |_, node| node.name.clone())
    }

    fn key(&self, fiber: FiberRef) -> Result<Option<String>, FiberAccessError> {
        self.with_live_node(fiber, |_, node| node.key.clone())
    }

    fn debug_source(&self, fiber: FiberRef) -> Result<Option<SourceLocation>, FiberAccessError> {
        self.with_live_node(fiber, |_, node| node.source.clone())
    }

    fn fiber_at(&self, point: Point) -> Result<Option<FiberRef>, FiberAccessError> {
        let state = self.lock();
        // Later-added nodes are deeper in the tree; prefer the innermost hit.
        Ok(state
            .nodes
            .iter()
            .filter(|(_, node)| node.alive && node.rect.is_some_and(|rect| rect.contains(point)))
            .map(|(id, _)| *id)
            .max()
            .map(FiberRef))
    }
}

/// What the overlay was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// Pointer listeners were attached.
    Attached,
    /// Pointer listeners were detached.
    Detached,
    /// A fiber was highlighted, with an optional source annotation.
    Highlight(FiberRef, Option<SourceLocation>),
    /// The highlight was cleared.
    Cleared,
}

/// Shared view of a recording overlay's event log.
#[derive(Debug, Clone, Default)]
pub struct OverlayLog(Arc<Mutex<Vec<OverlayEvent>>>);

impl OverlayLog {
    /// All events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<OverlayEvent> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent event, if any.
    #[must_use]
    pub fn last(&self) -> Option<OverlayEvent> {
        self.events().pop()
    }

    fn push(&self, event: OverlayEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Overlay stand-in that records every call.
#[derive(Debug, Default)]
pub struct RecordingOverlay {
    log: OverlayLog,
}

impl RecordingOverlay {
    /// Creates a recording overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the event log, valid after the overlay moves into
    /// a session.
    #[must_use]
    pub fn log(&self) -> OverlayLog {
        self.log.clone()
    }
}

impl InspectorOverlay for RecordingOverlay {
    fn attach_listeners(&mut self) {
        self.log.push(OverlayEvent::Attached);
    }

    fn detach_listeners(&mut self) {
        self.log.push(OverlayEvent::Detached);
    }

    fn highlight(&mut self, fiber: FiberRef, source: Option<&SourceLocation>) {
        self.log
            .push(OverlayEvent::Highlight(fiber, source.cloned()));
    }

    fn clear_highlight(&mut self) {
        self.log.push(OverlayEvent::Cleared);
    }
}
