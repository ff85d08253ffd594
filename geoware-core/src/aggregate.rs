//! Windowed in-network aggregation over the reading store.

use crate::protocol::{Aggregation, Sid, Value, ValueKind};
use crate::store::{ReadingStore, Selector};

/// Produce the value to publish for `sid`.
///
/// `Aggregation::None` pops the oldest reading. `Max` and `Average` drain up to
/// `window` readings (at least one) and stop early when the store runs dry.
/// Returns `None` when no reading was available. Readings whose kind differs
/// from `kind` are consumed and ignored.
pub fn reduce(
    store: &mut ReadingStore,
    sid: Sid,
    kind: ValueKind,
    aggregation: Aggregation,
    window: u8,
) -> Option<Value> {
    let selector = Selector::Subscription(sid);
    if aggregation == Aggregation::None {
        return store.take_oldest(selector).map(|r| r.value);
    }
    let values: Vec<Value> = (0..window.max(1))
        .map_while(|_| store.take_oldest(selector))
        .map(|r| r.value)
        .filter(|v| v.kind() == kind)
        .collect();
    match aggregation {
        Aggregation::Max => max(kind, &values),
        Aggregation::Average => average(kind, &values),
        Aggregation::None => None,
    }
}

/// Largest value. Comparison starts from 0 for integers and `-f32::MAX` for floats.
pub fn max(kind: ValueKind, values: &[Value]) -> Option<Value> {
    if values.is_empty() {
        return None;
    }
    let out = match kind {
        ValueKind::U8 => Value::U8(values.iter().filter_map(as_u8).fold(0, u8::max)),
        ValueKind::U16 => Value::U16(values.iter().filter_map(as_u16).fold(0, u16::max)),
        ValueKind::F32 => Value::F32(values.iter().filter_map(as_f32).fold(-f32::MAX, f32::max)),
    };
    Some(out)
}

/// Arithmetic mean. Integers sum in `u32` and truncate.
pub fn average(kind: ValueKind, values: &[Value]) -> Option<Value> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let out = match kind {
        ValueKind::U8 => {
            let sum: u32 = values.iter().filter_map(as_u8).map(u32::from).sum();
            Value::U8((sum / n as u32) as u8)
        }
        ValueKind::U16 => {
            let sum: u32 = values.iter().filter_map(as_u16).map(u32::from).sum();
            Value::U16((sum / n as u32) as u16)
        }
        ValueKind::F32 => {
            let sum: f32 = values.iter().filter_map(as_f32).sum();
            Value::F32(sum / n as f32)
        }
    };
    Some(out)
}

fn as_u8(v: &Value) -> Option<u8> {
    match *v {
        Value::U8(x) => Some(x),
        _ => None,
    }
}

fn as_u16(v: &Value) -> Option<u16> {
    match *v {
        Value::U16(x) => Some(x),
        _ => None,
    }
}

fn as_f32(v: &Value) -> Option<f32> {
    match *v {
        Value::F32(x) => Some(x),
        _ => None,
    }
}
