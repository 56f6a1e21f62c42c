//! Property converters and the registry that dispatches to them.
//!
//! A converter turns server JSON into a client value and back. Which
//! converter applies to a value is decided by the conversion metadata the
//! server sends alongside it.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::array::ArrayConverter;
use crate::constants::type_tag;
use crate::conversion::ConversionInfo;
use crate::error::{Result, SyncError};
use crate::object::ObjectConverter;
use crate::scope::Scope;
use crate::value::ClientValue;

pub trait PropertyConverter {
    /// Converts a server payload. `current` is the value the property holds
    /// now; converters that keep state update it in place when they can.
    fn from_server_to_client(
        &self,
        registry: &ConverterRegistry,
        server: &Value,
        current: Option<&ClientValue>,
        scope: Option<&Scope>,
    ) -> Result<ClientValue>;

    /// Produces the payload for `new`. `old` is the value last exchanged
    /// with the server, if any.
    fn from_client_to_server(
        &self,
        registry: &ConverterRegistry,
        new: &ClientValue,
        old: Option<&ClientValue>,
    ) -> Result<Value>;

    /// Moves the value (and its nested values) to another observation scope.
    fn update_scope(&self, _registry: &ConverterRegistry, _value: &ClientValue, _scope: Option<&Scope>) {}
}

/// Converters by type tag.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: IndexMap<String, Rc<dyn PropertyConverter>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.converters.keys()).finish()
    }
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the array (`JSON_arr`) and object (`JSON_obj`)
    /// converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(type_tag::ARRAY, ArrayConverter);
        registry.register(type_tag::OBJECT, ObjectConverter);
        registry
    }

    pub fn register(&mut self, type_name: impl Into<String>, converter: impl PropertyConverter + 'static) {
        let type_name = type_name.into();
        if self.converters.contains_key(&type_name) {
            warn!(type_name = %type_name, "replacing registered converter");
        }
        self.converters.insert(type_name, Rc::new(converter));
    }

    pub fn get(&self, type_name: &str) -> Option<Rc<dyn PropertyConverter>> {
        self.converters.get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.converters.contains_key(type_name)
    }

    fn converter(&self, type_name: &str) -> Result<Rc<dyn PropertyConverter>> {
        self.get(type_name)
            .ok_or_else(|| SyncError::UnknownConverter(type_name.to_string()))
    }

    pub fn from_server_to_client(
        &self,
        server: &Value,
        info: &ConversionInfo,
        current: Option<&ClientValue>,
        scope: Option<&Scope>,
    ) -> Result<ClientValue> {
        match info {
            ConversionInfo::Type(type_name) => {
                self.converter(type_name)?
                    .from_server_to_client(self, server, current, scope)
            }
            ConversionInfo::Nested(entries) => {
                let mut value = server.clone();
                self.convert_children(&mut value, entries, scope, "")?;
                Ok(ClientValue::Plain(value))
            }
        }
    }

    fn convert_children(
        &self,
        value: &mut Value,
        entries: &IndexMap<String, ConversionInfo>,
        scope: Option<&Scope>,
        path: &str,
    ) -> Result<()> {
        for (key, info) in entries {
            let Some(child) = child_mut(value, key) else {
                continue;
            };
            let child_path = format!("{path}/{key}");
            match info {
                ConversionInfo::Nested(nested) => self.convert_children(child, nested, scope, &child_path)?,
                ConversionInfo::Type(_) => match self.from_server_to_client(child, info, None, scope)? {
                    ClientValue::Plain(converted) => *child = converted,
                    _ => return Err(SyncError::NestedSmartValue(child_path)),
                },
            }
        }
        Ok(())
    }

    pub fn from_client_to_server(
        &self,
        value: &ClientValue,
        info: &ConversionInfo,
        old: Option<&ClientValue>,
    ) -> Result<Value> {
        match info {
            ConversionInfo::Type(type_name) => self.converter(type_name)?.from_client_to_server(self, value, old),
            ConversionInfo::Nested(entries) => {
                let mut wire = value.to_json();
                self.unconvert_children(&mut wire, entries)?;
                Ok(wire)
            }
        }
    }

    fn unconvert_children(&self, value: &mut Value, entries: &IndexMap<String, ConversionInfo>) -> Result<()> {
        for (key, info) in entries {
            let Some(child) = child_mut(value, key) else {
                continue;
            };
            match info {
                ConversionInfo::Nested(nested) => self.unconvert_children(child, nested)?,
                ConversionInfo::Type(_) => {
                    let plain = ClientValue::Plain(child.take());
                    *child = self.from_client_to_server(&plain, info, None)?;
                }
            }
        }
        Ok(())
    }

    pub fn update_scope(&self, value: &ClientValue, info: &ConversionInfo, scope: Option<&Scope>) {
        if let Some(converter) = info.type_name().and_then(|name| self.get(name)) {
            converter.update_scope(self, value, scope);
        }
    }

    /// Converts `raw` when metadata is present; passes it through otherwise.
    pub fn convert_or_plain(
        &self,
        raw: &Value,
        info: Option<&ConversionInfo>,
        previous: Option<&ClientValue>,
        scope: Option<&Scope>,
    ) -> Result<ClientValue> {
        match info {
            Some(info) => self.from_server_to_client(raw, info, previous, scope),
            None => Ok(ClientValue::Plain(raw.clone())),
        }
    }

    /// Wire form of `value`: converted when metadata is present, a plain
    /// structural copy otherwise.
    pub fn to_server_or_plain(
        &self,
        value: &ClientValue,
        info: Option<&ConversionInfo>,
        old: Option<&ClientValue>,
    ) -> Result<Value> {
        match info {
            Some(info) => self.from_client_to_server(value, info, old),
            None => Ok(value.to_json()),
        }
    }

    /// Converts a run of elements as one unit. `info` is keyed by position
    /// within `data`; each result carries the metadata of its element.
    pub(crate) fn convert_batch(
        &self,
        data: &[Value],
        info: Option<&ConversionInfo>,
        scope: Option<&Scope>,
    ) -> Result<Vec<(ClientValue, Option<ConversionInfo>)>> {
        data.iter()
            .enumerate()
            .map(|(pos, raw)| -> Result<(ClientValue, Option<ConversionInfo>)> {
                let element_info = info.and_then(|c| c.at(pos)).cloned();
                let value = self.convert_or_plain(raw, element_info.as_ref(), None, scope)?;
                Ok((value, element_info))
            })
            .collect()
    }
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Wire form is a number of seconds, client form a number of millis.
    struct Seconds;

    impl PropertyConverter for Seconds {
        fn from_server_to_client(
            &self,
            _registry: &ConverterRegistry,
            server: &Value,
            _current: Option<&ClientValue>,
            _scope: Option<&Scope>,
        ) -> Result<ClientValue> {
            let secs = server.as_u64().ok_or_else(|| SyncError::Conversion {
                type_name: "secs".into(),
                reason: format!("expected a number, got {server}"),
            })?;
            Ok(ClientValue::Plain(json!(secs * 1000)))
        }

        fn from_client_to_server(
            &self,
            _registry: &ConverterRegistry,
            new: &ClientValue,
            _old: Option<&ClientValue>,
        ) -> Result<Value> {
            Ok(json!(new.to_json().as_u64().unwrap_or(0) / 1000))
        }
    }

    fn registry() -> ConverterRegistry {
        let mut registry = ConverterRegistry::with_defaults();
        registry.register("secs", Seconds);
        registry
    }

    #[test]
    fn defaults_are_registered() {
        let registry = ConverterRegistry::with_defaults();
        assert!(registry.contains("JSON_arr"));
        assert!(registry.contains("JSON_obj"));
        assert!(!registry.contains("Date"));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = ConverterRegistry::new()
            .from_server_to_client(&json!(1), &ConversionInfo::of_type("nope"), None, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownConverter(t) if t == "nope"));
    }

    #[test]
    fn nested_info_converts_children_in_place() {
        let info = ConversionInfo::from_json(&json!({"at": "secs", "list": {"1": "secs"}}))
            .unwrap()
            .unwrap();
        let server = json!({"at": 2, "list": [1, 3], "name": "x"});
        let client = registry().from_server_to_client(&server, &info, None, None).unwrap();
        assert_eq!(client.to_json(), json!({"at": 2000, "list": [1, 3000], "name": "x"}));

        let back = registry().from_client_to_server(&client, &info, None).unwrap();
        assert_eq!(back, server);
    }

    #[test]
    fn smart_value_inside_plain_value_is_rejected() {
        let info = ConversionInfo::from_json(&json!({"0": "JSON_arr"})).unwrap().unwrap();
        let err = registry()
            .from_server_to_client(&json!([{"vEr": 1, "v": []}]), &info, None, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::NestedSmartValue(path) if path == "/0"));
    }

    #[test]
    fn batch_carries_per_element_metadata() {
        let info = ConversionInfo::from_json(&json!({"1": "secs"})).unwrap();
        let batch = registry()
            .convert_batch(&[json!(1), json!(2)], info.as_ref(), None)
            .unwrap();
        assert_eq!(batch[0].0.to_json(), json!(1));
        assert!(batch[0].1.is_none());
        assert_eq!(batch[1].0.to_json(), json!(2000));
        assert_eq!(batch[1].1, Some(ConversionInfo::of_type("secs")));
    }
}
