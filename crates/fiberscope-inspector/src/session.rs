//! Point-and-click inspection state machine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::fiber::{FiberProvider, FiberRef, Point, SourceLocation, structural_path};
use crate::identity::FiberIdRegistry;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// What a successful pick does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InspectorMode {
    /// Clicking selects the nearest component in the panel.
    SelectComponent,
    /// Clicking opens the nearest recorded source location in the editor.
    OpenInEditor,
}

/// Current state of the inspection machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorState {
    /// No inspection in progress; pointer events are ignored.
    Off,
    /// Pointer events drive highlighting and a click completes the pick.
    Inspecting(InspectorMode),
}

/// Visual feedback surface for inspection.
///
/// The real implementation paints a highlight box over the hovered element
/// and wires the page's pointer events into the session; tests substitute a
/// recording stand-in.
pub trait InspectorOverlay: Send {
    /// Start routing pointer events to the session.
    fn attach_listeners(&mut self);

    /// Stop routing pointer events.
    fn detach_listeners(&mut self);

    /// Show the highlight over a fiber's host element, optionally annotated
    /// with a source location.
    fn highlight(&mut self, fiber: FiberRef, source: Option<&SourceLocation>);

    /// Remove the highlight.
    fn clear_highlight(&mut self);
}

/// Handle for removing a registered pick listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type SelectListener = Box<dyn Fn(&str) + Send>;
type OpenListener = Box<dyn Fn(&SourceLocation) + Send>;

/// Drives hover highlighting and click-to-pick over the live tree.
///
/// The session is a small state machine: toggling on attaches the overlay's
/// pointer listeners, pointer moves highlight the current candidate, and a
/// qualifying click emits exactly one pick event and turns inspection back
/// off. A click with no qualifying target clears the highlight and leaves
/// inspection active.
pub struct InspectorSession {
    provider: Arc<dyn FiberProvider>,
    ids: Arc<Mutex<FiberIdRegistry>>,
    overlay: Box<dyn InspectorOverlay>,
    state: InspectorState,
    select_listeners: Vec<(u64, SelectListener)>,
    open_listeners: Vec<(u64, OpenListener)>,
    next_listener: u64,
}

impl std::fmt::Debug for InspectorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl InspectorSession {
    /// Creates a session over a provider, identity registry, and overlay.
    pub fn new(
        provider: Arc<dyn FiberProvider>,
        ids: Arc<Mutex<FiberIdRegistry>>,
        overlay: Box<dyn InspectorOverlay>,
    ) -> Self {
        Self {
            provider,
            ids,
            overlay,
            state: InspectorState::Off,
            select_listeners: Vec::new(),
            open_listeners: Vec::new(),
            next_listener: 1,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> InspectorState {
        self.state
    }

    /// Turns inspection on or off.
    ///
    /// Enabling while already inspecting only switches the mode; disabling
    /// while off is a no-op. `mode` defaults to
    /// [`InspectorMode::SelectComponent`] when omitted.
    pub fn toggle(&mut self, enabled: bool, mode: Option<InspectorMode>) {
        if enabled {
            let mode = mode.unwrap_or(InspectorMode::SelectComponent);
            if self.state == InspectorState::Off {
                self.overlay.attach_listeners();
            }
            self.state = InspectorState::Inspecting(mode);
            tracing::debug!(target: TARGET, ?mode, "inspection enabled");
        } else if let InspectorState::Inspecting(_) = self.state {
            self.overlay.detach_listeners();
            self.overlay.clear_highlight();
            self.state = InspectorState::Off;
            tracing::debug!(target: TARGET, "inspection disabled");
        }
    }

    /// Feeds a pointer movement into the session.
    ///
    /// Highlights the current candidate under the pointer, or clears the
    /// highlight when nothing qualifies. Ignored while off.
    pub fn pointer_move(&mut self, point: Point) {
        let InspectorState::Inspecting(mode) = self.state else {
            return;
        };
        match self.candidate_at(point, mode) {
            Some(Candidate::Component { fiber }) => self.overlay.highlight(fiber, None),
            Some(Candidate::Source { hit, location, .. }) => {
                self.overlay.highlight(hit, Some(&location));
            }
            None => self.overlay.clear_highlight(),
        }
    }

    /// Feeds a click into the session.
    ///
    /// A qualifying click emits one pick event and disables inspection; a
    /// click with no qualifying target clears the highlight and keeps
    /// inspecting.
    pub fn click(&mut self, point: Point) {
        let InspectorState::Inspecting(mode) = self.state else {
            return;
        };
        match self.candidate_at(point, mode) {
            Some(Candidate::Component { fiber }) => {
                let Some(id) = self.resolve_id(fiber) else {
                    self.overlay.clear_highlight();
                    return;
                };
                for (_, listener) in &self.select_listeners {
                    listener(&id);
                }
                self.toggle(false, None);
            }
            Some(Candidate::Source { location, .. }) => {
                for (_, listener) in &self.open_listeners {
                    listener(&location);
                }
                self.toggle(false, None);
            }
            None => self.overlay.clear_highlight(),
        }
    }

    /// Registers a listener for completed component selections. The
    /// listener receives the selected node's durable identifier.
    pub fn on_select(&mut self, listener: impl Fn(&str) + Send + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.select_listeners.push((id, Box::new(listener)));
        ListenerId(id)
    }

    /// Registers a listener for completed open-in-editor picks.
    pub fn on_open_in_editor(
        &mut self,
        listener: impl Fn(&SourceLocation) + Send + 'static,
    ) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.open_listeners.push((id, Box::new(listener)));
        ListenerId(id)
    }

    /// Removes a previously registered listener of either kind.
    pub fn remove_listener(&mut self, listener: ListenerId) {
        self.select_listeners.retain(|(id, _)| *id != listener.0);
        self.open_listeners.retain(|(id, _)| *id != listener.0);
    }

    fn candidate_at(&self, point: Point, mode: InspectorMode) -> Option<Candidate> {
        let hit = match self.provider.fiber_at(point) {
            Ok(hit) => hit?,
            Err(error) => {
                tracing::warn!(target: TARGET, %error, "hit test failed");
                return None;
            }
        };
        match mode {
            InspectorMode::SelectComponent => self
                .nearest_component(hit)
                .map(|fiber| Candidate::Component { fiber }),
            InspectorMode::OpenInEditor => self
                .nearest_source(hit)
                .map(|(_, location)| Candidate::Source { hit, location }),
        }
    }

    /// Climbs from `fiber` to the nearest actual component, inclusive.
    fn nearest_component(&self, fiber: FiberRef) -> Option<FiberRef> {
        self.climb(fiber, |provider, candidate| {
            provider
                .tag(candidate)
                .map(|tag| tag.is_component().then_some(candidate))
        })
    }

    /// Climbs from `fiber` to the nearest node with a recorded source
    /// location, inclusive.
    fn nearest_source(&self, fiber: FiberRef) -> Option<(FiberRef, SourceLocation)> {
        self.climb(fiber, |provider, candidate| {
            provider
                .debug_source(candidate)
                .map(|source| source.map(|location| (candidate, location)))
        })
    }

    fn climb<T>(
        &self,
        start: FiberRef,
        probe: impl Fn(
            &dyn FiberProvider,
            FiberRef,
        ) -> Result<Option<T>, crate::fiber::FiberAccessError>,
    ) -> Option<T> {
        let mut cursor = Some(start);
        let mut visited = HashSet::new();
        while let Some(fiber) = cursor {
            if !visited.insert(fiber) {
                tracing::warn!(target: TARGET, ?fiber, "cyclic parent chain during climb");
                return None;
            }
            match probe(self.provider.as_ref(), fiber) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(target: TARGET, %error, "node unobservable during climb");
                    return None;
                }
            }
            cursor = match self.provider.parent(fiber) {
                Ok(parent) => parent,
                Err(error) => {
                    tracing::warn!(target: TARGET, %error, "parent unobservable during climb");
                    return None;
                }
            };
        }
        None
    }

    fn resolve_id(&self, fiber: FiberRef) -> Option<String> {
        let path = match structural_path(self.provider.as_ref(), fiber) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!(target: TARGET, %error, "cannot derive identity for pick");
                return None;
            }
        };
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Some(ids.id_for(&path))
    }
}

enum Candidate {
    Component {
        fiber: FiberRef,
    },
    Source {
        /// The fiber actually under the pointer, kept highlighted.
        hit: FiberRef,
        location: SourceLocation,
    },
}
