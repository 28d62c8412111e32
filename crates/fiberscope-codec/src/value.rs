//! In-process value graphs consumed and produced by the codec.
//!
//! Sequences and maps are reference-counted shared cells so a graph can
//! alias the same cell from several positions, including cyclically. The
//! codec keys its visited table on cell identity, so aliasing is preserved
//! across a round trip. `Value` is deliberately `!Send`: value graphs belong
//! to one execution context, and only the encoded [`WireValue`](crate::wire::WireValue)
//! form crosses between contexts.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared, mutable sequence cell.
pub type SharedSeq = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable ordered-map cell. Entries preserve insertion order.
pub type SharedMap = Rc<RefCell<Vec<(String, Value)>>>;

/// An in-process value that may reference shared cells.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered sequence, shared by identity.
    Seq(SharedSeq),
    /// Ordered key-value mapping, shared by identity.
    Map(SharedMap),
    /// Placeholder for a value with no meaningful serialization.
    Opaque(OpaqueValue),
}

impl Value {
    /// Creates a string value.
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    /// Creates a sequence cell from the given items.
    #[must_use]
    pub fn seq(items: Vec<Self>) -> Self {
        Self::Seq(Rc::new(RefCell::new(items)))
    }

    /// Creates a map cell from the given entries.
    #[must_use]
    pub fn map(entries: Vec<(String, Self)>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    /// Creates an opaque placeholder with a human-readable description.
    pub fn opaque(kind: OpaqueKind, description: impl Into<String>) -> Self {
        Self::Opaque(OpaqueValue::new(kind, description))
    }

    /// Converts a plain JSON value into an acyclic value graph.
    ///
    /// Numbers that fit in `i64` become [`Value::Int`]; everything else
    /// numeric becomes [`Value::Float`].
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map_or_else(|| Self::Float(number.as_f64().unwrap_or(0.0)), Self::Int),
            serde_json::Value::String(text) => Self::Str(text.clone()),
            serde_json::Value::Array(items) => {
                Self::seq(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::map(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), Self::from_json(item)))
                    .collect(),
            ),
        }
    }
}

/// Classification of a value the codec cannot serialise meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueKind {
    /// A callable.
    Function,
    /// A host (DOM) element reference.
    HostElement,
    /// A symbol or other identity-only value.
    Symbol,
    /// Anything else without a structural representation.
    Other,
}

impl OpaqueKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::HostElement => "host_element",
            Self::Symbol => "symbol",
            Self::Other => "other",
        }
    }
}

/// Typed placeholder carried in place of an unserialisable value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpaqueValue {
    kind: OpaqueKind,
    description: String,
}

impl OpaqueValue {
    /// Creates a placeholder with the given kind and description.
    pub fn new(kind: OpaqueKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Returns the placeholder kind.
    #[must_use]
    pub const fn kind(&self) -> OpaqueKind {
        self.kind
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}
