//! Wire serialization codec for devtools payloads.
//!
//! The codec converts in-process value graphs — which may contain shared
//! cells, cycles, and values with no meaningful serialization (functions,
//! host elements) — into a transport-safe [`WireValue`] tree and back.
//!
//! Cycles are broken with a visited table keyed by cell identity: the first
//! visit to a shared cell assigns it a slot number, and every repeat visit
//! is replaced by a [`WireValue::Ref`] back-reference to that slot. Decoding
//! reconstructs the same sharing topology. Both directions are pure
//! transforms with no side effects.
//!
//! # Example
//!
//! ```
//! use fiberscope_codec::{decode, encode, Value};
//!
//! let value = Value::seq(vec![Value::Int(1), Value::str("two")]);
//! let wire = encode(&value);
//! let back = decode(&wire).expect("well-formed wire value");
//! assert_eq!(encode(&back), wire);
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;
pub mod wire;

pub use self::decode::{decode, decode_json};
pub use self::encode::{encode, encode_json};
pub use self::error::DecodeError;
pub use self::value::{OpaqueKind, OpaqueValue, SharedMap, SharedSeq, Value};
pub use self::wire::WireValue;
