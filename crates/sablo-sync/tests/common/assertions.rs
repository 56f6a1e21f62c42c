use sablo_sync::SyncArray;
use serde_json::Value;

/// Compares payloads structurally, printing both sides on mismatch.
pub fn assert_payload(actual: &Value, expected: &Value, context: &str) {
    if actual != expected {
        panic!(
            "{context}: payload mismatch\n  actual:   {}\n  expected: {}",
            serde_json::to_string(actual).unwrap_or_default(),
            serde_json::to_string(expected).unwrap_or_default()
        );
    }
}

pub fn assert_no_op(actual: &Value) {
    assert_payload(actual, &serde_json::json!({"n": true}), "expected a no-op payload");
}

/// Version and dirty bookkeeping of a tracked array.
pub fn assert_clean(array: &SyncArray, version: u64) {
    assert_eq!(array.content_version(), Some(version), "content version");
    assert!(array.changed_indexes().is_empty(), "dirty indexes: {:?}", array.changed_indexes());
    assert!(!array.is_structure_changed(), "structure still marked changed");
}
