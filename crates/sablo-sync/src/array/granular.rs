//! Granular array ops (`g` entries).
//!
//! Wire form of one op:
//!
//! ```json
//! {"op": [start, end, kind], "d": [...], "conversions": {...}}
//! ```
//!
//! `d` holds the new elements of a CHANGED or INSERT op and is absent for
//! DELETE. `conversions` is keyed by position within `d`.

use serde_json::{Map, Value};

use crate::constants::{OpKind, CONVERSIONS, GRANULAR_UPDATE_DATA, OP_ARRAY_START_END_TYPE};
use crate::conversion::ConversionInfo;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct GranularOp {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub kind: OpKind,
    pub data: Vec<Value>,
    pub conversions: Option<ConversionInfo>,
}

impl GranularOp {
    fn with_data(kind: OpKind, start: usize, data: Vec<Value>) -> Self {
        Self {
            start,
            end: start + data.len().max(1) - 1,
            kind,
            data,
            conversions: None,
        }
    }

    /// Replaces `data.len()` elements starting at `start`.
    pub fn changed(start: usize, data: Vec<Value>) -> Self {
        Self::with_data(OpKind::Changed, start, data)
    }

    /// Inserts `data` before position `start`.
    pub fn insert(start: usize, data: Vec<Value>) -> Self {
        Self::with_data(OpKind::Insert, start, data)
    }

    /// Removes `start..=end`.
    pub fn delete(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            kind: OpKind::Delete,
            data: Vec::new(),
            conversions: None,
        }
    }

    pub fn with_conversions(mut self, conversions: ConversionInfo) -> Self {
        self.conversions = Some(conversions);
        self
    }

    /// Number of indexes covered by `start..=end`.
    pub fn span(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(SyncError::MalformedOp(format!("expected an object, got {value}")));
        };
        let triple = map
            .get(OP_ARRAY_START_END_TYPE)
            .and_then(Value::as_array)
            .filter(|t| t.len() == 3)
            .ok_or_else(|| SyncError::MalformedOp(format!("missing [start, end, type] in {value}")))?;
        let number = |pos: usize| {
            triple[pos]
                .as_u64()
                .ok_or_else(|| SyncError::MalformedOp(format!("non-integer op field {}", triple[pos])))
        };
        let (start, end, code) = (number(0)? as usize, number(1)? as usize, number(2)?);
        let kind = OpKind::from_code(code).ok_or_else(|| SyncError::MalformedOp(format!("unknown op type {code}")))?;
        if end < start {
            return Err(SyncError::MalformedOp(format!("end {end} before start {start}")));
        }
        let data = match map.get(GRANULAR_UPDATE_DATA) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => return Err(SyncError::MalformedOp(format!("op data is not an array: {other}"))),
        };
        let conversions = match map.get(CONVERSIONS) {
            Some(info) => ConversionInfo::from_json(info)?,
            None => None,
        };
        Ok(Self {
            start,
            end,
            kind,
            data,
            conversions,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            OP_ARRAY_START_END_TYPE.to_string(),
            Value::Array(vec![
                Value::from(self.start),
                Value::from(self.end),
                Value::from(self.kind.code()),
            ]),
        );
        if self.kind != OpKind::Delete {
            map.insert(GRANULAR_UPDATE_DATA.to_string(), Value::Array(self.data.clone()));
        }
        if let Some(info) = &self.conversions {
            map.insert(CONVERSIONS.to_string(), info.to_json());
        }
        Value::Object(map)
    }
}

pub fn decode_batch(value: &Value) -> Result<Vec<GranularOp>> {
    let items = value
        .as_array()
        .ok_or_else(|| SyncError::MalformedOp(format!("granular updates must be an array, got {value}")))?;
    items.iter().map(GranularOp::from_json).collect()
}

/// Checks every op against the length the previous ops leave behind.
///
/// Nothing is applied unless the whole batch fits.
pub fn validate_batch(ops: &[GranularOp], initial_len: usize) -> Result<()> {
    let mut len = initial_len;
    for op in ops {
        if op.end < op.start {
            return Err(SyncError::MalformedOp(format!("end {} before start {}", op.end, op.start)));
        }
        let out_of_range = || SyncError::OpOutOfRange {
            start: op.start,
            end: op.end,
            len,
        };
        match op.kind {
            OpKind::Changed => {
                if op.end >= len {
                    return Err(out_of_range());
                }
                if op.data.len() != op.span() {
                    return Err(SyncError::MalformedOp(format!(
                        "CHANGED [{}, {}] carries {} elements",
                        op.start,
                        op.end,
                        op.data.len()
                    )));
                }
            }
            OpKind::Insert => {
                if op.start > len {
                    return Err(out_of_range());
                }
                if op.data.is_empty() {
                    return Err(SyncError::MalformedOp(format!("INSERT at {} carries no elements", op.start)));
                }
                len += op.data.len();
            }
            OpKind::Delete => {
                if op.end >= len {
                    return Err(out_of_range());
                }
                len -= op.span();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_op() {
        let op = GranularOp::from_json(&json!({"op": [1, 2, 0], "d": ["x", "y"], "conversions": {"0": "JSON_obj"}}))
            .unwrap();
        assert_eq!(op.start, 1);
        assert_eq!(op.end, 2);
        assert_eq!(op.kind, OpKind::Changed);
        assert_eq!(op.data, vec![json!("x"), json!("y")]);
        assert_eq!(op.conversions.as_ref().and_then(|c| c.at(0)).and_then(|c| c.type_name()), Some("JSON_obj"));
    }

    #[test]
    fn delete_needs_no_data() {
        let op = GranularOp::from_json(&json!({"op": [0, 3, 2]})).unwrap();
        assert_eq!(op, GranularOp::delete(0, 3));
        assert_eq!(op.to_json(), json!({"op": [0, 3, 2]}));
    }

    #[test]
    fn rejects_malformed_ops() {
        for bad in [
            json!({"op": [0, 1]}),
            json!({"op": [0, 1, 7], "d": [1, 2]}),
            json!({"op": [2, 1, 0], "d": [1]}),
            json!({"op": [0, 0, 0], "d": 5}),
            json!({"op": ["0", 0, 0], "d": [1]}),
            json!([0, 0, 0]),
        ] {
            assert!(matches!(GranularOp::from_json(&bad), Err(SyncError::MalformedOp(_))), "{bad}");
        }
    }

    #[test]
    fn validation_tracks_length_across_ops() {
        let ops = vec![GranularOp::insert(3, vec![json!(1), json!(2)]), GranularOp::delete(3, 4)];
        validate_batch(&ops, 3).unwrap();

        let ops = vec![GranularOp::delete(0, 1), GranularOp::changed(1, vec![json!(0)])];
        assert!(matches!(
            validate_batch(&ops, 3),
            Err(SyncError::OpOutOfRange { start: 1, end: 1, len: 1 })
        ));
    }

    #[test]
    fn changed_data_must_cover_the_range() {
        let op = GranularOp {
            end: 2,
            ..GranularOp::changed(0, vec![json!(1)])
        };
        assert!(matches!(validate_batch(&[op], 5), Err(SyncError::MalformedOp(_))));
    }

    #[test]
    fn reversed_range_is_rejected_before_use() {
        let ops = vec![GranularOp::delete(2, 1)];
        assert!(matches!(validate_batch(&ops, 5), Err(SyncError::MalformedOp(_))));
    }
}
