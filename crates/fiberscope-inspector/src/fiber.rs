//! Read-only view of the host runtime's fiber tree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle to one fiber node.
///
/// Handles are only meaningful to the [`FiberProvider`] that issued them and
/// only for as long as the underlying node stays mounted. They are never
/// used as long-lived map keys; durable identity comes from
/// [`FiberIdRegistry`](crate::identity::FiberIdRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberRef(pub u64);

/// Classification of a fiber node, mirroring the host runtime's work tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiberTag {
    /// A function component.
    FunctionComponent,
    /// A class component.
    ClassComponent,
    /// A component not yet classified by the runtime.
    IndeterminateComponent,
    /// The root of a fiber tree.
    HostRoot,
    /// A host (DOM) element wrapper.
    HostComponent,
    /// A host text node.
    HostText,
    /// A fragment.
    Fragment,
    /// A mode boundary (strict mode etc.).
    Mode,
    /// A context consumer.
    ContextConsumer,
    /// A context provider.
    ContextProvider,
    /// A forward-ref wrapper.
    ForwardRef,
    /// A suspense boundary.
    SuspenseComponent,
    /// A memoised component.
    MemoComponent,
    /// A memoised component without a comparator.
    SimpleMemoComponent,
}

impl FiberTag {
    /// Maps the host runtime's numeric work tag onto a classification.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::FunctionComponent),
            1 => Some(Self::ClassComponent),
            2 => Some(Self::IndeterminateComponent),
            3 => Some(Self::HostRoot),
            5 => Some(Self::HostComponent),
            6 => Some(Self::HostText),
            7 => Some(Self::Fragment),
            8 => Some(Self::Mode),
            9 => Some(Self::ContextConsumer),
            10 => Some(Self::ContextProvider),
            11 => Some(Self::ForwardRef),
            13 => Some(Self::SuspenseComponent),
            14 => Some(Self::MemoComponent),
            15 => Some(Self::SimpleMemoComponent),
            _ => None,
        }
    }

    /// Returns the host runtime's numeric work tag.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::FunctionComponent => 0,
            Self::ClassComponent => 1,
            Self::IndeterminateComponent => 2,
            Self::HostRoot => 3,
            Self::HostComponent => 5,
            Self::HostText => 6,
            Self::Fragment => 7,
            Self::Mode => 8,
            Self::ContextConsumer => 9,
            Self::ContextProvider => 10,
            Self::ForwardRef => 11,
            Self::SuspenseComponent => 13,
            Self::MemoComponent => 14,
            Self::SimpleMemoComponent => 15,
        }
    }

    /// Returns whether this tag is a host-owned node (element, text, root).
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::HostRoot | Self::HostComponent | Self::HostText)
    }

    /// Returns whether this tag is an actual component, the qualification
    /// used by select-component inspection.
    #[must_use]
    pub const fn is_component(self) -> bool {
        matches!(
            self,
            Self::FunctionComponent
                | Self::ClassComponent
                | Self::IndeterminateComponent
                | Self::ForwardRef
                | Self::MemoComponent
                | Self::SimpleMemoComponent
        )
    }

    /// Fallback display name for fibers without one of their own.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::HostRoot => "Root",
            Self::Fragment => "Fragment",
            Self::Mode => "Mode",
            Self::ContextConsumer => "Context.Consumer",
            Self::ContextProvider => "Context.Provider",
            Self::SuspenseComponent => "Suspense",
            Self::HostText => "#text",
            _ => "Anonymous",
        }
    }
}

/// A source position attached to a fiber by the build tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path of the source file.
    pub file_name: String,
    /// 1-based line number.
    pub line_number: u32,
    /// 1-based column number.
    pub column_number: u32,
}

impl SourceLocation {
    /// Creates a source location.
    pub fn new(file_name: impl Into<String>, line_number: u32, column_number: u32) -> Self {
        Self {
            file_name: file_name.into(),
            line_number,
            column_number,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_name, self.line_number, self.column_number
        )
    }
}

/// A viewport coordinate used for pointer inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Horizontal pixel offset.
    pub x: i32,
    /// Vertical pixel offset.
    pub y: i32,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Failure to observe a fiber node.
///
/// The tree is owned by the host runtime and can mutate or free nodes
/// between observations, so every access can fail; callers skip the node
/// and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiberAccessError {
    /// The node was unmounted or freed since the handle was issued.
    #[error("fiber {0:?} is gone")]
    Gone(FiberRef),

    /// The provider cannot currently serve observations.
    #[error("fiber tree unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Read-only access to the live fiber tree.
///
/// Implementations bridge to the actual host runtime (or to the simulated
/// tree in tests). All methods are cheap, synchronous observations; none may
/// block on messaging.
pub trait FiberProvider: Send + Sync {
    /// Returns the current root fiber, if a tree is mounted.
    fn root(&self) -> Result<Option<FiberRef>, FiberAccessError>;

    /// Returns the first child of a fiber.
    fn child(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError>;

    /// Returns the next sibling of a fiber.
    fn sibling(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError>;

    /// Returns the parent of a fiber.
    fn parent(&self, fiber: FiberRef) -> Result<Option<FiberRef>, FiberAccessError>;

    /// Returns the classification of a fiber.
    fn tag(&self, fiber: FiberRef) -> Result<FiberTag, FiberAccessError>;

    /// Returns the component or element display name, when known.
    fn display_name(&self, fiber: FiberRef) -> Result<Option<String>, FiberAccessError>;

    /// Returns the reconciliation key, when set.
    fn key(&self, fiber: FiberRef) -> Result<Option<String>, FiberAccessError>;

    /// Returns the debug source location, when the build recorded one.
    fn debug_source(&self, fiber: FiberRef) -> Result<Option<SourceLocation>, FiberAccessError>;

    /// Resolves a viewport coordinate to the fiber owning the host element
    /// under it, via the host's element-to-fiber association.
    fn fiber_at(&self, point: Point) -> Result<Option<FiberRef>, FiberAccessError>;
}

/// Computes the root-to-node structural path of a fiber.
///
/// The path is the sequence of child indices from the root; it keys the
/// durable-identity side table. Climbing is bounded by a visited set so a
/// corrupted parent chain cannot loop forever.
///
/// # Errors
///
/// Propagates the first provider failure, or reports the tree as
/// [`FiberAccessError::Unavailable`] when the parent chain is cyclic.
pub fn structural_path(
    provider: &dyn FiberProvider,
    fiber: FiberRef,
) -> Result<Vec<u32>, FiberAccessError> {
    let mut path = Vec::new();
    let mut cursor = fiber;
    let mut visited = std::collections::HashSet::new();

    while let Some(parent) = provider.parent(cursor)? {
        if !visited.insert(cursor) {
            return Err(FiberAccessError::Unavailable {
                message: "cyclic parent chain".to_owned(),
            });
        }
        path.push(index_among_siblings(provider, parent, cursor)?);
        cursor = parent;
    }

    path.reverse();
    Ok(path)
}

fn index_among_siblings(
    provider: &dyn FiberProvider,
    parent: FiberRef,
    target: FiberRef,
) -> Result<u32, FiberAccessError> {
    let mut index = 0_u32;
    let mut cursor = provider.child(parent)?;
    let mut visited = std::collections::HashSet::new();
    while let Some(candidate) = cursor {
        if candidate == target {
            return Ok(index);
        }
        if !visited.insert(candidate) {
            break;
        }
        index = index.saturating_add(1);
        cursor = provider.sibling(candidate)?;
    }
    Err(FiberAccessError::Gone(target))
}
