//! The global instrumentation hook renderers report into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::fiber::FiberRef;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hook");

/// Identity of a renderer registered with the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererInfo {
    /// Renderer package name, e.g. `react-dom`.
    pub renderer_name: String,
    /// Renderer version string.
    pub version: String,
}

impl RendererInfo {
    /// Describes a renderer.
    pub fn new(renderer_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            renderer_name: renderer_name.into(),
            version: version.into(),
        }
    }
}

/// Receiver of commit and unmount notifications.
pub trait CommitObserver: Send + Sync {
    /// A renderer committed work; `root` is the tree root after the commit,
    /// absent when the renderer could not surface one.
    fn on_commit(&self, renderer_id: u64, root: Option<FiberRef>);

    /// A fiber was unmounted during a commit.
    fn on_unmount(&self, renderer_id: u64, fiber: FiberRef);
}

struct HookInner {
    renderers: Mutex<Vec<(u64, RendererInfo)>>,
    observers: Mutex<Vec<(u64, Arc<dyn CommitObserver>)>>,
    /// Observer installed before this hook took over; always notified first
    /// so pre-existing tooling keeps working.
    previous: Option<Arc<dyn CommitObserver>>,
    next_renderer_id: AtomicU64,
    next_observer_id: AtomicU64,
}

/// The instrumentation hook.
///
/// Installed once per page before any renderer loads; renderers call
/// [`DevtoolsHook::inject`] on startup and then report every commit and
/// unmount. If another tool already installed a hook, its observer is
/// wrapped rather than replaced, so both tools receive notifications.
pub struct DevtoolsHook {
    inner: Arc<HookInner>,
}

impl std::fmt::Debug for DevtoolsHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevtoolsHook").finish_non_exhaustive()
    }
}

impl DevtoolsHook {
    /// Creates a fresh hook with no prior instrumentation to preserve.
    #[must_use]
    pub fn new() -> Self {
        Self::wrapping(None)
    }

    /// Creates a hook that forwards every notification to a previously
    /// installed observer before its own observers.
    #[must_use]
    pub fn wrapping(previous: Option<Arc<dyn CommitObserver>>) -> Self {
        Self {
            inner: Arc::new(HookInner {
                renderers: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                previous,
                next_renderer_id: AtomicU64::new(1),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a renderer and returns its identifier.
    pub fn inject(&self, info: RendererInfo) -> u64 {
        let id = self.inner.next_renderer_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: TARGET,
            renderer = %info.renderer_name,
            version = %info.version,
            id,
            "renderer attached"
        );
        self.lock_renderers().push((id, info));
        id
    }

    /// Returns the registered renderers.
    #[must_use]
    pub fn renderers(&self) -> Vec<(u64, RendererInfo)> {
        self.lock_renderers().clone()
    }

    /// Subscribes an observer to commit and unmount notifications.
    ///
    /// The observer stays attached until the returned handle is dropped or
    /// [`ObserverHandle::dispose`] is called.
    pub fn observe_commits(&self, observer: Arc<dyn CommitObserver>) -> ObserverHandle {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.lock_observers().push((id, observer));
        ObserverHandle {
            id,
            hook: Arc::downgrade(&self.inner),
        }
    }

    /// Entry point renderers call after committing work.
    pub fn on_commit_fiber_root(&self, renderer_id: u64, root: Option<FiberRef>) {
        if let Some(previous) = &self.inner.previous {
            previous.on_commit(renderer_id, root);
        }
        for observer in self.snapshot_observers() {
            observer.on_commit(renderer_id, root);
        }
    }

    /// Entry point renderers call for each fiber unmounted in a commit.
    pub fn on_commit_fiber_unmount(&self, renderer_id: u64, fiber: FiberRef) {
        if let Some(previous) = &self.inner.previous {
            previous.on_unmount(renderer_id, fiber);
        }
        for observer in self.snapshot_observers() {
            observer.on_unmount(renderer_id, fiber);
        }
    }

    fn lock_renderers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, RendererInfo)>> {
        self.inner
            .renderers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<dyn CommitObserver>)>> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // Observers are cloned out before notification so an observer that
    // registers or disposes handles reentrantly does not deadlock.
    fn snapshot_observers(&self) -> Vec<Arc<dyn CommitObserver>> {
        self.lock_observers()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

impl Default for DevtoolsHook {
    fn default() -> Self {
        Self::new()
    }
}

/// Detaches its observer when dropped.
#[derive(Debug)]
pub struct ObserverHandle {
    id: u64,
    hook: Weak<HookInner>,
}

impl ObserverHandle {
    /// Detaches the observer now.
    pub fn dispose(self) {
        drop(self);
    }

    fn detach(&self) {
        if let Some(inner) = self.hook.upgrade() {
            inner
                .observers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
