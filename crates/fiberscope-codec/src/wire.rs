//! Transport-safe encoding of value graphs.

use serde::{Deserialize, Serialize};

use crate::value::OpaqueKind;

/// The wire representation of a value graph.
///
/// Shared cells carry a `slot` number assigned in order of first visit
/// during encoding; repeat visits of the same cell appear as [`WireValue::Ref`]
/// back-references to that slot. A wire value is a plain tree, so it is
/// `Send` and serialisable even when the source graph was cyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
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
    /// Ordered sequence with its back-reference slot.
    Seq {
        /// Slot number for back-references to this cell.
        slot: u32,
        /// The sequence items.
        items: Vec<WireValue>,
    },
    /// Ordered key-value mapping with its back-reference slot.
    Map {
        /// Slot number for back-references to this cell.
        slot: u32,
        /// The entries in insertion order.
        entries: Vec<(String, WireValue)>,
    },
    /// Back-reference to a previously visited cell.
    Ref(u32),
    /// Placeholder for a value with no meaningful serialization.
    Opaque {
        /// Classification of the replaced value.
        kind: OpaqueKind,
        /// Human-readable description.
        description: String,
    },
}

impl WireValue {
    /// Returns the string content when this is a [`WireValue::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer content when this is a [`WireValue::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            _ => None,
        }
    }

    /// Returns the boolean content when this is a [`WireValue::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}
