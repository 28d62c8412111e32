//! Decoding of wire values back into value graphs.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::DecodeError;
use crate::value::{OpaqueValue, Value};
use crate::wire::WireValue;

/// Decodes a wire value into a value graph.
///
/// Back-references resolve to the already-reconstructed cell for that slot,
/// so the decoded graph has the same sharing topology the encoder observed.
///
/// # Errors
///
/// Returns [`DecodeError::DanglingRef`] for a back-reference to a slot that
/// is not yet defined (including forward references, which the encoder never
/// produces) and [`DecodeError::DuplicateSlot`] when two cells claim the
/// same slot.
pub fn decode(wire: &WireValue) -> Result<Value, DecodeError> {
    let mut decoder = Decoder::default();
    decoder.decode_value(wire)
}

/// Decodes a wire value all the way to plain JSON.
///
/// # Errors
///
/// Returns any [`decode`] error, plus [`DecodeError::Unrepresentable`] when
/// the reconstructed graph contains a cycle or a non-finite float, neither
/// of which plain JSON can carry.
pub fn decode_json(wire: &WireValue) -> Result<serde_json::Value, DecodeError> {
    let value = decode(wire)?;
    let mut in_progress = HashSet::new();
    value_to_json(&value, &mut in_progress)
}

#[derive(Default)]
struct Decoder {
    slots: HashMap<u32, Value>,
}

impl Decoder {
    fn decode_value(&mut self, wire: &WireValue) -> Result<Value, DecodeError> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Bool(flag) => Ok(Value::Bool(*flag)),
            WireValue::Int(number) => Ok(Value::Int(*number)),
            WireValue::Float(number) => Ok(Value::Float(*number)),
            WireValue::Str(text) => Ok(Value::Str(text.clone())),
            WireValue::Seq { slot, items } => {
                let cell = Rc::new(std::cell::RefCell::new(Vec::with_capacity(items.len())));
                self.claim_slot(*slot, Value::Seq(Rc::clone(&cell)))?;
                for item in items {
                    let decoded = self.decode_value(item)?;
                    cell.borrow_mut().push(decoded);
                }
                Ok(Value::Seq(cell))
            }
            WireValue::Map { slot, entries } => {
                let cell = Rc::new(std::cell::RefCell::new(Vec::with_capacity(entries.len())));
                self.claim_slot(*slot, Value::Map(Rc::clone(&cell)))?;
                for (key, item) in entries {
                    let decoded = self.decode_value(item)?;
                    cell.borrow_mut().push((key.clone(), decoded));
                }
                Ok(Value::Map(cell))
            }
            WireValue::Ref(slot) => self
                .slots
                .get(slot)
                .cloned()
                .ok_or(DecodeError::DanglingRef { slot: *slot }),
            WireValue::Opaque { kind, description } => {
                Ok(Value::Opaque(OpaqueValue::new(*kind, description.clone())))
            }
        }
    }

    fn claim_slot(&mut self, slot: u32, value: Value) -> Result<(), DecodeError> {
        if self.slots.contains_key(&slot) {
            return Err(DecodeError::DuplicateSlot { slot });
        }
        self.slots.insert(slot, value);
        Ok(())
    }
}

fn value_to_json(
    value: &Value,
    in_progress: &mut HashSet<usize>,
) -> Result<serde_json::Value, DecodeError> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(flag) => Ok(serde_json::Value::Bool(*flag)),
        Value::Int(number) => Ok(serde_json::Value::from(*number)),
        Value::Float(number) => {
            serde_json::Number::from_f64(*number).map(serde_json::Value::Number).ok_or_else(|| {
                DecodeError::Unrepresentable {
                    reason: "non-finite float".to_owned(),
                }
            })
        }
        Value::Str(text) => Ok(serde_json::Value::String(text.clone())),
        Value::Seq(cell) => {
            let address = Rc::as_ptr(cell) as usize;
            guard_cycle(address, in_progress)?;
            let items = cell
                .borrow()
                .iter()
                .map(|item| value_to_json(item, in_progress))
                .collect::<Result<Vec<_>, _>>();
            in_progress.remove(&address);
            Ok(serde_json::Value::Array(items?))
        }
        Value::Map(cell) => {
            let address = Rc::as_ptr(cell) as usize;
            guard_cycle(address, in_progress)?;
            let mut object = serde_json::Map::new();
            let mut failure = None;
            for (key, item) in cell.borrow().iter() {
                match value_to_json(item, in_progress) {
                    Ok(json) => {
                        object.insert(key.clone(), json);
                    }
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            in_progress.remove(&address);
            match failure {
                Some(error) => Err(error),
                None => Ok(serde_json::Value::Object(object)),
            }
        }
        Value::Opaque(opaque) => {
            let mut object = serde_json::Map::new();
            object.insert(
                "$opaque".to_owned(),
                serde_json::Value::String(opaque.kind().as_str().to_owned()),
            );
            object.insert(
                "description".to_owned(),
                serde_json::Value::String(opaque.description().to_owned()),
            );
            Ok(serde_json::Value::Object(object))
        }
    }
}

fn guard_cycle(address: usize, in_progress: &mut HashSet<usize>) -> Result<(), DecodeError> {
    if !in_progress.insert(address) {
        return Err(DecodeError::Unrepresentable {
            reason: "cyclic value graph".to_owned(),
        });
    }
    Ok(())
}
