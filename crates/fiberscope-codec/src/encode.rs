//! Encoding of value graphs into wire values.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;
use crate::wire::WireValue;

/// Encodes a value graph into its wire representation.
///
/// Shared cells are tracked in a visited table keyed by cell identity. The
/// first visit assigns the next slot number; repeat visits (aliases or
/// cycles) emit a [`WireValue::Ref`] back-reference instead of recursing, so
/// encoding terminates on arbitrary cyclic input.
#[must_use]
pub fn encode(value: &Value) -> WireValue {
    let mut encoder = Encoder::default();
    encoder.encode_value(value)
}

/// Encodes a plain JSON value, a convenience for acyclic payloads.
#[must_use]
pub fn encode_json(json: &serde_json::Value) -> WireValue {
    encode(&Value::from_json(json))
}

#[derive(Default)]
struct Encoder {
    /// Cell address -> assigned slot number.
    visited: HashMap<usize, u32>,
    next_slot: u32,
}

impl Encoder {
    fn encode_value(&mut self, value: &Value) -> WireValue {
        match value {
            Value::Null => WireValue::Null,
            Value::Bool(flag) => WireValue::Bool(*flag),
            Value::Int(number) => WireValue::Int(*number),
            Value::Float(number) => WireValue::Float(*number),
            Value::Str(text) => WireValue::Str(text.clone()),
            Value::Seq(cell) => match self.visit(Rc::as_ptr(cell) as usize) {
                Visit::Again(slot) => WireValue::Ref(slot),
                Visit::First(slot) => {
                    let items = cell
                        .borrow()
                        .iter()
                        .map(|item| self.encode_value(item))
                        .collect();
                    WireValue::Seq { slot, items }
                }
            },
            Value::Map(cell) => match self.visit(Rc::as_ptr(cell) as usize) {
                Visit::Again(slot) => WireValue::Ref(slot),
                Visit::First(slot) => {
                    let entries = cell
                        .borrow()
                        .iter()
                        .map(|(key, item)| (key.clone(), self.encode_value(item)))
                        .collect();
                    WireValue::Map { slot, entries }
                }
            },
            Value::Opaque(opaque) => WireValue::Opaque {
                kind: opaque.kind(),
                description: opaque.description().to_owned(),
            },
        }
    }

    fn visit(&mut self, address: usize) -> Visit {
        if let Some(slot) = self.visited.get(&address) {
            return Visit::Again(*slot);
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.visited.insert(address, slot);
        Visit::First(slot)
    }
}

enum Visit {
    /// First encounter; the cell owns this slot.
    First(u32),
    /// Already encoded; emit a back-reference.
    Again(u32),
}
