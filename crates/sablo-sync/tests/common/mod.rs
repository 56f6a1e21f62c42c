#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

use std::rc::Rc;

use sablo_sync::{ClientValue, ConversionInfo, ConverterRegistry, PropertySync, Scope, SyncArray, SyncObject};
use serde_json::Value;

pub fn registry() -> Rc<ConverterRegistry> {
    Rc::new(ConverterRegistry::with_defaults())
}

/// An array property in `scope`, initialized from a full server payload.
pub fn array_property(scope: &Scope, payload: Value) -> PropertySync {
    let mut property = PropertySync::new(registry(), Some(ConversionInfo::of_type("JSON_arr"))).with_scope(scope.clone());
    property.apply_server(&payload).expect("full array payload");
    property
}

pub fn object_property(scope: &Scope, payload: Value) -> PropertySync {
    let mut property = PropertySync::new(registry(), Some(ConversionInfo::of_type("JSON_obj"))).with_scope(scope.clone());
    property.apply_server(&payload).expect("full object payload");
    property
}

pub fn array_of(property: &PropertySync) -> SyncArray {
    property.value().as_array().cloned().expect("property holds an array")
}

pub fn object_of(property: &PropertySync) -> SyncObject {
    property.value().as_object().cloned().expect("property holds an object")
}

pub fn element_array(value: Option<ClientValue>) -> SyncArray {
    value.and_then(|v| v.as_array().cloned()).expect("element is an array")
}
