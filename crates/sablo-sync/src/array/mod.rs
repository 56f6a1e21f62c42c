//! Array property values (`JSON_arr`).
//!
//! A [`SyncArray`] is a shared handle: clones point at the same elements,
//! and the reconciler mutates the array in place so handles held by the
//! application stay valid across server updates.

mod granular;
mod inbound;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

pub use granular::{decode_batch, validate_batch, GranularOp};

use crate::conversion::ConversionInfo;
use crate::converters::{ConverterRegistry, PropertyConverter};
use crate::error::{Result, SyncError};
use crate::notifier::{rewire, wire};
use crate::observer::{attach, detach};
use crate::outbound;
use crate::policy::PushPolicy;
use crate::scope::Scope;
use crate::state::{Shared, Slot};
use crate::value::{ChangeNotifier, ClientValue, SmartValue};

#[derive(Clone, Default)]
pub struct SyncArray {
    pub(crate) inner: Shared<Vec<Slot>>,
}

impl SyncArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ClientValue>,
    {
        let array = Self::new();
        {
            let mut inner = array.inner.borrow_mut();
            for value in values {
                let value = value.into();
                let conversion = value.implied_conversion();
                let slot = inner.slot(value, conversion);
                inner.slots.push(slot);
            }
        }
        rewire(&array.inner, 0);
        array
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ClientValue> {
        self.inner.borrow().slots.get(index).map(|slot| slot.value.clone())
    }

    pub fn values(&self) -> Vec<ClientValue> {
        self.inner.borrow().slots.iter().map(|slot| slot.value.clone()).collect()
    }

    /// Assigns the element at `index`.
    ///
    /// The slot keeps its conversion metadata. Assigning the element it
    /// already holds (same smart value) is not a re-assignment.
    pub fn set(&self, index: usize, value: impl Into<ClientValue>) -> Result<()> {
        let value = value.into();
        let replaced = {
            let mut inner = self.inner.borrow_mut();
            let len = inner.slots.len();
            let (same, ident, conversion) = match inner.slots.get(index) {
                Some(slot) => (
                    slot.value.same_ref(&value),
                    slot.ident,
                    slot.conversion.clone().or_else(|| value.implied_conversion()),
                ),
                None => return Err(SyncError::IndexOutOfBounds { index, len }),
            };
            let ident = if same { ident } else { inner.fresh_ident() };
            let slot = Slot {
                value: value.clone(),
                ident,
                conversion,
            };
            let previous = std::mem::replace(&mut inner.slots[index], slot);
            (!same).then_some(previous.value)
        };
        if let Some(previous) = replaced {
            previous.release_observers();
        }
        self.adopt(index, &value);
        Ok(())
    }

    /// Edits a plain element in place. Shallow watches do not see this;
    /// deep watches do.
    pub fn update(&self, index: usize, edit: impl FnOnce(&mut Value)) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let len = inner.slots.len();
        match inner.slots.get_mut(index).map(|slot| &mut slot.value) {
            Some(ClientValue::Plain(value)) => {
                edit(value);
                Ok(())
            }
            Some(_) => Err(SyncError::NotPlainValue(index.to_string())),
            None => Err(SyncError::IndexOutOfBounds { index, len }),
        }
    }

    pub fn push(&self, value: impl Into<ClientValue>) {
        let value = value.into();
        let index = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner.slot(value.clone(), value.implied_conversion());
            inner.slots.push(slot);
            inner.slots.len() - 1
        };
        self.adopt(index, &value);
    }

    pub fn insert(&self, index: usize, value: impl Into<ClientValue>) -> Result<()> {
        let value = value.into();
        {
            let mut inner = self.inner.borrow_mut();
            let len = inner.slots.len();
            if index > len {
                return Err(SyncError::IndexOutOfBounds { index, len });
            }
            let slot = inner.slot(value.clone(), value.implied_conversion());
            inner.slots.insert(index, slot);
        }
        self.adopt(index, &value);
        rewire(&self.inner, index);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<ClientValue> {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let len = inner.slots.len();
            if index >= len {
                return Err(SyncError::IndexOutOfBounds { index, len });
            }
            inner.slots.remove(index)
        };
        removed.value.release_observers();
        rewire(&self.inner, index);
        Ok(removed.value)
    }

    /// Swaps the whole contents. Conversion metadata stays with positions.
    pub fn replace_all<I, V>(&self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<ClientValue>,
    {
        let values: Vec<ClientValue> = values.into_iter().map(Into::into).collect();
        for old in self.values() {
            if old.is_smart() && !values.iter().any(|new| new.same_ref(&old)) {
                old.release_observers();
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            let mut slots = Vec::with_capacity(values.len());
            for (index, value) in values.iter().enumerate() {
                let conversion = inner
                    .slots
                    .get(index)
                    .and_then(|slot| slot.conversion.clone())
                    .or_else(|| value.implied_conversion());
                slots.push(inner.slot(value.clone(), conversion));
            }
            inner.slots = slots;
            let seq = inner.fresh_ident();
            inner.seq_ident = seq;
        }
        let scope = self.inner.borrow().scope.clone();
        for value in &values {
            value.adopt_scope(scope.as_ref());
        }
        rewire(&self.inner, 0);
    }

    /// Version agreed with the server, if the array is tracked.
    pub fn content_version(&self) -> Option<u64> {
        self.inner.borrow().state.as_ref().map(|state| state.content_version)
    }

    pub fn push_policy(&self) -> PushPolicy {
        self.inner.borrow().push_policy()
    }

    pub fn conversion_info(&self, index: usize) -> Option<ConversionInfo> {
        self.inner.borrow().slots.get(index).and_then(|slot| slot.conversion.clone())
    }

    pub fn has_state(&self) -> bool {
        self.inner.borrow().state.is_some()
    }

    /// Whether the next outbound payload will be a full value.
    pub fn is_structure_changed(&self) -> bool {
        self.inner.borrow().state.as_ref().map_or(false, |state| state.all_changed)
    }

    pub fn changed_indexes(&self) -> Vec<usize> {
        self.inner
            .borrow()
            .state
            .as_ref()
            .map(|state| state.changed.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of watches currently registered for this array.
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().handles.len()
    }

    pub fn ptr_eq(&self, other: &SyncArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.values().iter().map(ClientValue::to_json).collect())
    }

    /// Moves the array and its smart elements to `scope`, re-installing
    /// watches there.
    pub fn update_scope(&self, scope: Option<&Scope>) {
        detach(&self.inner);
        self.inner.borrow_mut().scope = scope.cloned();
        for value in self.values() {
            value.adopt_scope(scope);
        }
        attach(&self.inner);
    }

    pub(crate) fn release_observers(&self) {
        detach(&self.inner);
        for value in self.values() {
            value.release_observers();
        }
    }

    /// Stops version tracking; the server re-initializes the array later.
    pub(crate) fn discard_state(&self) {
        detach(&self.inner);
        self.inner.borrow_mut().state = None;
    }

    /// Hooks a freshly placed smart element up to this array.
    fn adopt(&self, index: usize, value: &ClientValue) {
        if value.is_smart() {
            let scope = self.inner.borrow().scope.clone();
            value.adopt_scope(scope.as_ref());
            wire(&self.inner, index, value);
        }
    }
}

impl fmt::Debug for SyncArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SyncArray")
            .field("len", &inner.slots.len())
            .field("version", &inner.state.as_ref().map(|s| s.content_version))
            .field("changed", &inner.is_changed())
            .finish()
    }
}

impl SmartValue for SyncArray {
    fn is_changed(&self) -> bool {
        self.inner.borrow().is_changed()
    }

    fn set_change_notifier(&self, notifier: ChangeNotifier) {
        self.inner.borrow_mut().notifier = Some(notifier);
    }
}

/// Converter for the `JSON_arr` type tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayConverter;

impl PropertyConverter for ArrayConverter {
    fn from_server_to_client(
        &self,
        registry: &ConverterRegistry,
        server: &Value,
        current: Option<&ClientValue>,
        scope: Option<&Scope>,
    ) -> Result<ClientValue> {
        inbound::from_server(registry, server, current, scope)
    }

    fn from_client_to_server(
        &self,
        registry: &ConverterRegistry,
        new: &ClientValue,
        old: Option<&ClientValue>,
    ) -> Result<Value> {
        match new {
            ClientValue::Array(array) => outbound::serialize(registry, &array.inner, new, old),
            other => Ok(other.to_json()),
        }
    }

    fn update_scope(&self, registry: &ConverterRegistry, value: &ClientValue, scope: Option<&Scope>) {
        let Some(array) = value.as_array() else {
            return;
        };
        array.update_scope(scope);
        let converted: Vec<(ClientValue, ConversionInfo)> = array
            .inner
            .borrow()
            .slots
            .iter()
            .filter(|slot| !slot.value.is_smart())
            .filter_map(|slot| slot.conversion.clone().map(|info| (slot.value.clone(), info)))
            .collect();
        for (element, info) in converted {
            registry.update_scope(&element, &info, scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_edits_mutate_shared_contents() {
        let array = SyncArray::from_values([json!(1), json!(2)]);
        let alias = array.clone();
        array.push(json!(3));
        array.set(0, json!(10)).unwrap();
        array.remove(1).unwrap();
        assert_eq!(alias.to_json(), json!([10, 3]));
        assert!(alias.ptr_eq(&array));
    }

    #[test]
    fn bounds_are_checked() {
        let array = SyncArray::from_values([json!("a")]);
        assert!(matches!(array.set(1, json!("b")), Err(SyncError::IndexOutOfBounds { index: 1, len: 1 })));
        assert!(array.insert(2, json!("b")).is_err());
        assert!(array.remove(1).is_err());
        array.insert(1, json!("b")).unwrap();
        assert_eq!(array.to_json(), json!(["a", "b"]));
    }

    #[test]
    fn update_edits_plain_elements_only() {
        let array = SyncArray::from_values([ClientValue::from(json!({"n": 1})), SyncArray::new().into()]);
        array.update(0, |v| v["n"] = json!(2)).unwrap();
        assert_eq!(array.get(0).unwrap().to_json(), json!({"n": 2}));
        assert!(matches!(array.update(1, |_| {}), Err(SyncError::NotPlainValue(_))));
    }

    #[test]
    fn smart_elements_get_implied_conversion() {
        let array = SyncArray::new();
        array.push(SyncArray::new());
        array.push(json!(1));
        assert_eq!(array.conversion_info(0), Some(ConversionInfo::of_type("JSON_arr")));
        assert_eq!(array.conversion_info(1), None);
    }

    #[test]
    fn untracked_array_has_no_version() {
        let array = SyncArray::from_values([json!(1)]);
        assert_eq!(array.content_version(), None);
        assert!(!array.is_changed());
        assert_eq!(array.push_policy(), PushPolicy::None);
    }
}
