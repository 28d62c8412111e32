//! Codec error types.

use thiserror::Error;

/// Errors raised while decoding a wire value.
///
/// A malformed wire value fails with one of these variants; the containing
/// message is dropped by callers and the channel stays alive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A back-reference names a slot that was never defined.
    #[error("back-reference to undefined slot {slot}")]
    DanglingRef {
        /// The referenced slot number.
        slot: u32,
    },

    /// The same slot number was defined by two different cells.
    #[error("slot {slot} defined more than once")]
    DuplicateSlot {
        /// The duplicated slot number.
        slot: u32,
    },

    /// The decoded graph cannot be rendered as plain JSON.
    #[error("value graph is not representable as JSON: {reason}")]
    Unrepresentable {
        /// Why the conversion failed.
        reason: String,
    },
}
