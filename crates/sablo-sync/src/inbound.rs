//! Payload inspection shared by the array and object reconcilers.

use serde_json::Value;

use crate::constants::{CONTENT_VERSION, CONVERSIONS, INITIALIZE, NO_OP, PUSH_TO_SERVER, VALUE};
use crate::conversion::ConversionInfo;
use crate::error::Result;
use crate::policy::PushPolicy;

/// What a server payload asks the reconciler to do.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape<'a> {
    /// Replace the contents with this full value.
    Full(&'a Value),
    /// Apply incremental updates (granular ops or keyed updates).
    Incremental(&'a Value),
    /// Only (re)initialize version tracking.
    Touch,
    /// Keep the current value.
    NoOp,
    /// Unsupported shape, including `null`: the value becomes null.
    Discard,
}

pub(crate) fn classify<'a>(payload: &'a Value, incremental_tag: &str) -> Shape<'a> {
    let Value::Object(map) = payload else {
        return Shape::Discard;
    };
    if let Some(value) = map.get(VALUE).filter(|v| !v.is_null()) {
        return Shape::Full(value);
    }
    if let Some(updates) = map.get(incremental_tag).filter(|v| !v.is_null()) {
        return Shape::Incremental(updates);
    }
    if truthy(map.get(INITIALIZE)) {
        return Shape::Touch;
    }
    if truthy(map.get(NO_OP)) {
        return Shape::NoOp;
    }
    Shape::Discard
}

/// Flag semantics of the wire format: absent, `null`, `false`, `0` and `""`
/// are all unset.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

pub(crate) fn version(payload: &Value) -> Option<u64> {
    payload.get(CONTENT_VERSION).and_then(Value::as_u64)
}

/// `None` when the payload does not carry the tag at all.
pub(crate) fn push_policy(payload: &Value) -> Option<PushPolicy> {
    payload.get(PUSH_TO_SERVER).map(PushPolicy::from_json)
}

pub(crate) fn conversions(payload: &Value) -> Result<Option<ConversionInfo>> {
    payload.get(CONVERSIONS).map_or(Ok(None), ConversionInfo::from_json)
}
