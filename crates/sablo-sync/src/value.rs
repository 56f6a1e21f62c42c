//! Client-side property values.
//!
//! A [`ClientValue`] is either plain JSON (a "dumb" value that must be
//! watched from the outside) or a smart container that tracks its own
//! changes and reports them through a [`ChangeNotifier`].

use std::rc::Rc;

use serde_json::Value;

use crate::array::SyncArray;
use crate::constants::type_tag;
use crate::conversion::ConversionInfo;
use crate::object::SyncObject;
use crate::scope::Scope;

/// Callback a smart value invokes whenever it has something to send.
pub type ChangeNotifier = Rc<dyn Fn()>;

/// A value that manages its own change detection.
pub trait SmartValue {
    /// Whether the value holds changes that were not serialized yet.
    fn is_changed(&self) -> bool;

    /// Replaces the callback invoked when the value becomes changed.
    fn set_change_notifier(&self, notifier: ChangeNotifier);
}

#[derive(Debug, Clone)]
pub enum ClientValue {
    Plain(Value),
    Array(SyncArray),
    Object(SyncObject),
}

impl Default for ClientValue {
    fn default() -> Self {
        ClientValue::Plain(Value::Null)
    }
}

impl ClientValue {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ClientValue::Plain(Value::Null))
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            ClientValue::Plain(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&SyncArray> {
        match self {
            ClientValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SyncObject> {
        match self {
            ClientValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_smart(&self) -> Option<&dyn SmartValue> {
        match self {
            ClientValue::Plain(_) => None,
            ClientValue::Array(a) => Some(a),
            ClientValue::Object(o) => Some(o),
        }
    }

    pub fn is_smart(&self) -> bool {
        !matches!(self, ClientValue::Plain(_))
    }

    /// Reference identity. Plain values have none.
    pub fn same_ref(&self, other: &ClientValue) -> bool {
        match (self, other) {
            (ClientValue::Array(a), ClientValue::Array(b)) => a.ptr_eq(b),
            (ClientValue::Object(a), ClientValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Structural copy without any synchronization state.
    pub fn to_json(&self) -> Value {
        match self {
            ClientValue::Plain(v) => v.clone(),
            ClientValue::Array(a) => a.to_json(),
            ClientValue::Object(o) => o.to_json(),
        }
    }

    /// Whether the value is a container the server handed version state to.
    pub fn has_sync_state(&self) -> bool {
        match self {
            ClientValue::Plain(_) => false,
            ClientValue::Array(a) => a.has_state(),
            ClientValue::Object(o) => o.has_state(),
        }
    }

    /// Type tag of the converter that handles this value, for smart values.
    pub(crate) fn implied_conversion(&self) -> Option<ConversionInfo> {
        match self {
            ClientValue::Plain(_) => None,
            ClientValue::Array(_) => Some(ConversionInfo::of_type(type_tag::ARRAY)),
            ClientValue::Object(_) => Some(ConversionInfo::of_type(type_tag::OBJECT)),
        }
    }

    /// Moves a smart value, and everything below it, to `scope`.
    pub(crate) fn adopt_scope(&self, scope: Option<&Scope>) {
        match self {
            ClientValue::Plain(_) => {}
            ClientValue::Array(a) => a.update_scope(scope),
            ClientValue::Object(o) => o.update_scope(scope),
        }
    }

    /// Drops every watch a smart value (and its children) registered.
    pub(crate) fn release_observers(&self) {
        match self {
            ClientValue::Plain(_) => {}
            ClientValue::Array(a) => a.release_observers(),
            ClientValue::Object(o) => o.release_observers(),
        }
    }
}

impl From<Value> for ClientValue {
    fn from(value: Value) -> Self {
        ClientValue::Plain(value)
    }
}

impl From<SyncArray> for ClientValue {
    fn from(array: SyncArray) -> Self {
        ClientValue::Array(array)
    }
}

impl From<SyncObject> for ClientValue {
    fn from(object: SyncObject) -> Self {
        ClientValue::Object(object)
    }
}

impl From<&str> for ClientValue {
    fn from(s: &str) -> Self {
        ClientValue::Plain(Value::String(s.to_string()))
    }
}
