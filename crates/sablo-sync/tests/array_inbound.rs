mod common;

use sablo_sync::{ConversionInfo, PushPolicy, Scope, SmartValue};
use serde_json::json;

use common::assertions::{assert_clean, assert_no_op, assert_payload};
use common::{array_of, array_property};

#[test]
fn changed_op_replaces_single_element() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 5, "w": false, "v": ["a", "b", "c"]}));
    let array = array_of(&property);

    property
        .apply_server(&json!({"vEr": 5, "g": [{"op": [1, 1, 0], "d": ["B"]}]}))
        .unwrap();

    assert_eq!(array.to_json(), json!(["a", "B", "c"]));
    assert_clean(&array, 5);
    scope.digest().unwrap();
    assert_no_op(&property.send().unwrap());
}

#[test]
fn insert_shifts_elements_and_metadata() {
    let scope = Scope::new();
    let mut property = array_property(
        &scope,
        json!({
            "vEr": 1,
            "v": ["A", {"vEr": 1, "v": []}, "C"],
            "conversions": {"1": "JSON_arr"}
        }),
    );
    let array = array_of(&property);
    let nested = array.get(1).and_then(|v| v.as_array().cloned()).unwrap();

    property
        .apply_server(&json!({"vEr": 1, "g": [{"op": [1, 2, 1], "d": ["X", "Y"]}]}))
        .unwrap();

    assert_eq!(array.to_json(), json!(["A", "X", "Y", [], "C"]));
    assert_eq!(array.conversion_info(1), None);
    assert_eq!(array.conversion_info(2), None);
    assert_eq!(array.conversion_info(3), Some(ConversionInfo::of_type("JSON_arr")));
    assert!(array.get(3).unwrap().same_ref(&nested.into()));
}

#[test]
fn delete_removes_inclusive_range() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 2, "v": ["A", "B", "C", "D"]}));
    let array = array_of(&property);

    property.apply_server(&json!({"vEr": 2, "g": [{"op": [1, 2, 2]}]})).unwrap();

    assert_eq!(array.to_json(), json!(["A", "D"]));
    assert_clean(&array, 2);
}

#[test]
fn ops_apply_in_order_against_shifted_indexes() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 7, "v": [0, 1, 2, 3]}));
    let array = array_of(&property);

    property
        .apply_server(&json!({"vEr": 7, "g": [
            {"op": [0, 1, 2]},
            {"op": [0, 0, 0], "d": [20]},
            {"op": [2, 3, 1], "d": [4, 5]}
        ]}))
        .unwrap();

    assert_eq!(array.to_json(), json!([20, 3, 4, 5]));
}

#[test]
fn stale_batch_is_discarded_entirely() {
    let scope = Scope::new();
    let mut property = array_property(
        &scope,
        json!({"vEr": 3, "v": [1, {"k": 1}], "conversions": {"1": {"missing": "JSON_obj"}}}),
    );
    let array = array_of(&property);
    let conversions_before = array.conversion_info(1);

    property
        .apply_server(&json!({"vEr": 2, "g": [
            {"op": [0, 0, 0], "d": [9]},
            {"op": [0, 0, 2]}
        ]}))
        .unwrap();

    assert_eq!(array.to_json(), json!([1, {"k": 1}]));
    assert_eq!(array.conversion_info(1), conversions_before);
    assert_eq!(array.content_version(), Some(3));
}

#[test]
fn touch_initializes_version_on_client_assigned_array() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 1, "v": []}));
    property.set_value(sablo_sync::SyncArray::from_values([json!(1), json!(2)]));
    assert_eq!(property.send().unwrap(), json!([1, 2]));

    property.apply_server(&json!({"vEr": 0, "in": true, "w": false})).unwrap();
    let array = array_of(&property);
    assert_clean(&array, 0);
    assert_eq!(array.push_policy(), PushPolicy::Shallow);
    assert_eq!(array.observer_count(), 3);
}

#[test]
fn no_op_keeps_value_and_null_discards_it() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 1, "w": true, "v": ["x"]}));
    let array = array_of(&property);

    property.apply_server(&json!({"n": true})).unwrap();
    assert!(property.value().same_ref(&array.clone().into()));

    property.apply_server(&json!(null)).unwrap();
    assert!(property.value().is_null());
    assert!(!array.has_state());
    assert_eq!(array.observer_count(), 0);
}

#[test]
fn server_writes_are_not_reported_as_local_changes() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 4, "w": true, "v": [{"a": 1}, 2]}));
    let array = array_of(&property);

    property
        .apply_server(&json!({"vEr": 4, "g": [
            {"op": [0, 0, 0], "d": [{"a": 2}]},
            {"op": [2, 2, 1], "d": [3]}
        ]}))
        .unwrap();
    assert_eq!(scope.digest().unwrap(), 0);
    assert!(!array.is_changed());
    assert!(!property.is_dirty());
}

#[test]
fn pending_local_edit_survives_server_batch() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 1, "w": false, "v": [1, 2, 3]}));
    let array = array_of(&property);

    array.set(0, json!(10)).unwrap();
    scope.digest().unwrap();
    property
        .apply_server(&json!({"vEr": 1, "g": [{"op": [2, 2, 0], "d": [30]}]}))
        .unwrap();

    assert_eq!(array.changed_indexes(), vec![0]);
    assert_eq!(array.to_json(), json!([10, 2, 30]));
    assert_payload(
        &property.send().unwrap(),
        &json!({"vEr": 1, "u": [{"i": 0, "v": 10}]}),
        "local edit after server batch",
    );
}

#[test]
fn pending_marks_move_with_inserted_and_deleted_elements() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 2, "w": false, "v": ["a", "b", "c"]}));
    let array = array_of(&property);

    array.set(2, json!("C")).unwrap();
    array.set(0, json!("A")).unwrap();
    scope.digest().unwrap();
    property
        .apply_server(&json!({"vEr": 2, "g": [
            {"op": [1, 2, 1], "d": ["x", "y"]},
            {"op": [0, 0, 2]}
        ]}))
        .unwrap();

    assert_eq!(array.to_json(), json!(["x", "y", "b", "C"]));
    assert_eq!(array.changed_indexes(), vec![3]);
    assert_payload(
        &property.send().unwrap(),
        &json!({"vEr": 2, "u": [{"i": 3, "v": "C"}]}),
        "shifted local edit",
    );
}

#[test]
fn server_overwrite_drops_local_mark_at_that_index() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 1, "w": false, "v": ["a", "b"]}));
    let array = array_of(&property);

    array.set(1, json!("mine")).unwrap();
    scope.digest().unwrap();
    property
        .apply_server(&json!({"vEr": 1, "g": [{"op": [1, 1, 0], "d": ["theirs"]}]}))
        .unwrap();

    assert!(array.changed_indexes().is_empty());
    assert_no_op(&property.send().unwrap());
}

#[test]
fn touch_keeps_pending_structural_change() {
    let scope = Scope::new();
    let mut property = array_property(&scope, json!({"vEr": 1, "w": false, "v": [1]}));
    let array = array_of(&property);

    array.push(json!(2));
    scope.digest().unwrap();
    property.apply_server(&json!({"vEr": 1, "in": true})).unwrap();

    assert!(array.is_structure_changed());
    assert_payload(&property.send().unwrap(), &json!({"vEr": 1, "v": [1, 2]}), "full send after touch");
    assert_clean(&array, 2);
}
