//! Structural equality over client values.
//!
//! Synchronization state (versions, dirty marks, watches) never takes part
//! in a comparison; two containers are equal when their contents are.

use serde_json::Value;

use crate::conversion::ConversionInfo;
use crate::value::ClientValue;

/// Deep structural equality. Object key order is irrelevant.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sablo_sync::{equal::deep_equal, ClientValue, SyncArray};
///
/// let a = ClientValue::from(SyncArray::from_values([json!(1), json!({"x": [2]})]));
/// let b = ClientValue::from(json!([1, {"x": [2]}]));
/// assert!(deep_equal(&a, &b));
/// ```
pub fn deep_equal(a: &ClientValue, b: &ClientValue) -> bool {
    if a.same_ref(b) {
        return true;
    }
    match (a, b) {
        (ClientValue::Plain(x), ClientValue::Plain(y)) => x == y,
        (ClientValue::Array(x), ClientValue::Array(y)) => {
            let (xs, ys) = (x.values(), y.values());
            xs.len() == ys.len() && xs.iter().zip(&ys).all(|(p, q)| deep_equal(p, q))
        }
        (ClientValue::Object(x), ClientValue::Object(y)) => {
            let (xs, ys) = (x.entries(), y.entries());
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, p)| ys.get(key).map_or(false, |q| deep_equal(p, q)))
        }
        _ => a.to_json() == b.to_json(),
    }
}

/// Whether `new` differs from `old` for a value that may carry conversion
/// metadata. Converted smart values are asked directly.
pub fn is_changed(new: &ClientValue, old: &ClientValue, conversion: Option<&ConversionInfo>) -> bool {
    if conversion.is_some() {
        if let Some(smart) = new.as_smart() {
            if new.same_ref(old) {
                return smart.is_changed();
            }
        }
    }
    !deep_equal(new, old)
}

/// Confirms a change recorded by a value watch.
///
/// Object-typed values (arrays, objects, null, smart containers) are
/// compared structurally; primitives use strict equality only.
pub(crate) fn watched_value_changed(
    old: Option<&ClientValue>,
    new: &ClientValue,
    conversion: Option<&ConversionInfo>,
) -> bool {
    let Some(old) = old else {
        return true;
    };
    match (new, old) {
        (ClientValue::Plain(n), ClientValue::Plain(o)) if is_primitive(n) => n != o,
        (ClientValue::Plain(n), _) if is_primitive(n) => true,
        _ => is_changed(new, old, conversion),
    }
}

fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::SyncArray;
    use serde_json::json;

    fn plain(v: Value) -> ClientValue {
        ClientValue::Plain(v)
    }

    #[test]
    fn plain_values_compare_structurally() {
        assert!(deep_equal(&plain(json!({"a": [1, 2]})), &plain(json!({"a": [1, 2]}))));
        assert!(!deep_equal(&plain(json!({"a": [1, 2]})), &plain(json!({"a": [2, 1]}))));
        assert!(!deep_equal(&plain(json!(0)), &plain(json!(false))));
    }

    #[test]
    fn object_key_order_is_irrelevant() {
        assert!(deep_equal(&plain(json!({"a": 1, "b": 2})), &plain(json!({"b": 2, "a": 1}))));
    }

    #[test]
    fn containers_compare_by_contents() {
        let a = SyncArray::from_values([json!("x"), json!("y")]);
        let b = SyncArray::from_values([json!("x"), json!("y")]);
        assert!(deep_equal(&a.clone().into(), &b.clone().into()));
        b.push(json!("z"));
        assert!(!deep_equal(&a.into(), &b.into()));
    }

    #[test]
    fn primitives_use_strict_equality() {
        let old = plain(json!("a"));
        assert!(!watched_value_changed(Some(&old), &plain(json!("a")), None));
        assert!(watched_value_changed(Some(&old), &plain(json!("b")), None));
        assert!(watched_value_changed(Some(&plain(json!({}))), &plain(json!(1)), None));
    }

    #[test]
    fn object_values_use_structural_comparison() {
        let old = plain(json!({"k": [1]}));
        assert!(!watched_value_changed(Some(&old), &plain(json!({"k": [1]})), None));
        assert!(watched_value_changed(Some(&old), &plain(json!({"k": [2]})), None));
    }

    #[test]
    fn missing_old_value_is_a_change() {
        assert!(watched_value_changed(None, &plain(json!(null)), None));
    }
}
