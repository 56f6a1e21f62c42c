//! Conversion metadata (`conversions` tag).
//!
//! The server annotates payloads with the type tags of values that need a
//! converter. The annotation mirrors the JSON structure it describes: a
//! string names the converter of the value at that position, an object
//! descends into children by key (array positions are decimal keys).

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionInfo {
    /// The value is handled by the converter registered under this tag.
    Type(String),
    /// Only some children need conversion.
    Nested(IndexMap<String, ConversionInfo>),
}

impl ConversionInfo {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        ConversionInfo::Type(type_name.into())
    }

    /// Parses wire metadata. `null` means "no conversion".
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(ConversionInfo::Type(s.clone()))),
            Value::Object(map) => {
                let mut entries = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    if let Some(info) = Self::from_json(child)? {
                        entries.insert(key.clone(), info);
                    }
                }
                Ok(Some(ConversionInfo::Nested(entries)))
            }
            Value::Array(items) => {
                let mut entries = IndexMap::with_capacity(items.len());
                for (index, child) in items.iter().enumerate() {
                    if let Some(info) = Self::from_json(child)? {
                        entries.insert(index.to_string(), info);
                    }
                }
                Ok(Some(ConversionInfo::Nested(entries)))
            }
            other => Err(SyncError::InvalidConversionInfo(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ConversionInfo::Type(name) => Value::String(name.clone()),
            ConversionInfo::Nested(entries) => {
                let mut map = Map::new();
                for (key, info) in entries {
                    map.insert(key.clone(), info.to_json());
                }
                Value::Object(map)
            }
        }
    }

    /// Metadata of the child at `key`.
    ///
    /// A bare type tag at container level applies to every child.
    pub fn entry(&self, key: &str) -> Option<&ConversionInfo> {
        match self {
            ConversionInfo::Type(_) => Some(self),
            ConversionInfo::Nested(entries) => entries.get(key),
        }
    }

    pub fn at(&self, index: usize) -> Option<&ConversionInfo> {
        self.entry(&index.to_string())
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            ConversionInfo::Type(name) => Some(name),
            ConversionInfo::Nested(_) => None,
        }
    }
}
