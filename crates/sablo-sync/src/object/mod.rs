//! Object property values (`JSON_obj`).
//!
//! The keyed sibling of [`crate::array::SyncArray`]: same version state,
//! same observers, but elements are addressed by property name and sparse
//! updates carry a `k` instead of an `i`.

mod inbound;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::conversion::ConversionInfo;
use crate::converters::{ConverterRegistry, PropertyConverter};
use crate::error::{Result, SyncError};
use crate::notifier::wire;
use crate::observer::{attach, detach};
use crate::outbound;
use crate::policy::PushPolicy;
use crate::scope::Scope;
use crate::state::{Shared, Slot};
use crate::value::{ChangeNotifier, ClientValue, SmartValue};

type Slots = IndexMap<String, Slot>;

#[derive(Clone, Default)]
pub struct SyncObject {
    pub(crate) inner: Shared<Slots>,
}

impl SyncObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ClientValue>,
    {
        let object = Self::new();
        let mut smart = Vec::new();
        {
            let mut inner = object.inner.borrow_mut();
            for (key, value) in entries {
                let (key, value) = (key.into(), value.into());
                if value.is_smart() {
                    smart.push((key.clone(), value.clone()));
                }
                let conversion = value.implied_conversion();
                let slot = inner.slot(value, conversion);
                inner.slots.insert(key, slot);
            }
        }
        for (key, value) in smart {
            wire(&object.inner, key, &value);
        }
        object
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().slots.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<ClientValue> {
        self.inner.borrow().slots.get(key).map(|slot| slot.value.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().slots.keys().cloned().collect()
    }

    pub fn entries(&self) -> IndexMap<String, ClientValue> {
        self.inner
            .borrow()
            .slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
            .collect()
    }

    /// Assigns `key`, adding it when absent. An existing key keeps its
    /// conversion metadata and position.
    pub fn set(&self, key: impl Into<String>, value: impl Into<ClientValue>) {
        let (key, value) = (key.into(), value.into());
        let mut replaced = None;
        {
            let mut inner = self.inner.borrow_mut();
            let existing = inner
                .slots
                .get(&key)
                .map(|slot| (slot.value.same_ref(&value), slot.ident, slot.conversion.clone()));
            let slot = match existing {
                Some((true, ident, conversion)) => Slot {
                    value: value.clone(),
                    ident,
                    conversion,
                },
                Some((false, _, conversion)) => {
                    let conversion = conversion.or_else(|| value.implied_conversion());
                    inner.slot(value.clone(), conversion)
                }
                None => inner.slot(value.clone(), value.implied_conversion()),
            };
            if let Some(previous) = inner.slots.insert(key.clone(), slot) {
                if !previous.value.same_ref(&value) {
                    replaced = Some(previous.value);
                }
            }
        }
        if let Some(previous) = replaced {
            previous.release_observers();
        }
        if value.is_smart() {
            let scope = self.inner.borrow().scope.clone();
            value.adopt_scope(scope.as_ref());
            wire(&self.inner, key, &value);
        }
    }

    /// Edits a plain property in place.
    pub fn update(&self, key: &str, edit: impl FnOnce(&mut Value)) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        match inner.slots.get_mut(key).map(|slot| &mut slot.value) {
            Some(ClientValue::Plain(value)) => {
                edit(value);
                Ok(())
            }
            Some(_) => Err(SyncError::NotPlainValue(key.to_string())),
            None => Err(SyncError::MissingKey(key.to_string())),
        }
    }

    pub fn remove(&self, key: &str) -> Option<ClientValue> {
        let removed = self.inner.borrow_mut().slots.shift_remove(key).map(|slot| slot.value);
        if let Some(value) = &removed {
            value.release_observers();
        }
        removed
    }

    /// Swaps the whole contents. Conversion metadata stays with keys.
    pub fn replace_all<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ClientValue>,
    {
        let entries: Vec<(String, ClientValue)> = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        for old in self.entries().into_values() {
            if old.is_smart() && !entries.iter().any(|(_, new)| new.same_ref(&old)) {
                old.release_observers();
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            let mut slots = Slots::with_capacity(entries.len());
            for (key, value) in &entries {
                let conversion = inner
                    .slots
                    .get(key)
                    .and_then(|slot| slot.conversion.clone())
                    .or_else(|| value.implied_conversion());
                let slot = inner.slot(value.clone(), conversion);
                slots.insert(key.clone(), slot);
            }
            inner.slots = slots;
            let seq = inner.fresh_ident();
            inner.seq_ident = seq;
        }
        let scope = self.inner.borrow().scope.clone();
        for (key, value) in entries {
            if value.is_smart() {
                value.adopt_scope(scope.as_ref());
                wire(&self.inner, key, &value);
            }
        }
    }

    pub fn content_version(&self) -> Option<u64> {
        self.inner.borrow().state.as_ref().map(|state| state.content_version)
    }

    pub fn push_policy(&self) -> PushPolicy {
        self.inner.borrow().push_policy()
    }

    pub fn conversion_info(&self, key: &str) -> Option<ConversionInfo> {
        self.inner.borrow().slots.get(key).and_then(|slot| slot.conversion.clone())
    }

    pub fn has_state(&self) -> bool {
        self.inner.borrow().state.is_some()
    }

    pub fn is_structure_changed(&self) -> bool {
        self.inner.borrow().state.as_ref().map_or(false, |state| state.all_changed)
    }

    pub fn changed_keys(&self) -> Vec<String> {
        self.inner
            .borrow()
            .state
            .as_ref()
            .map(|state| state.changed.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.borrow().handles.len()
    }

    pub fn ptr_eq(&self, other: &SyncObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in self.entries() {
            map.insert(key, value.to_json());
        }
        Value::Object(map)
    }

    pub fn update_scope(&self, scope: Option<&Scope>) {
        detach(&self.inner);
        self.inner.borrow_mut().scope = scope.cloned();
        for value in self.entries().values() {
            value.adopt_scope(scope);
        }
        attach(&self.inner);
    }

    pub(crate) fn release_observers(&self) {
        detach(&self.inner);
        for value in self.entries().values() {
            value.release_observers();
        }
    }

    pub(crate) fn discard_state(&self) {
        detach(&self.inner);
        self.inner.borrow_mut().state = None;
    }
}

impl fmt::Debug for SyncObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SyncObject")
            .field("keys", &inner.slots.keys().collect::<Vec<_>>())
            .field("version", &inner.state.as_ref().map(|s| s.content_version))
            .field("changed", &inner.is_changed())
            .finish()
    }
}

impl SmartValue for SyncObject {
    fn is_changed(&self) -> bool {
        self.inner.borrow().is_changed()
    }

    fn set_change_notifier(&self, notifier: ChangeNotifier) {
        self.inner.borrow_mut().notifier = Some(notifier);
    }
}

/// Converter for the `JSON_obj` type tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectConverter;

impl PropertyConverter for ObjectConverter {
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
            ClientValue::Object(object) => outbound::serialize(registry, &object.inner, new, old),
            other => Ok(other.to_json()),
        }
    }

    fn update_scope(&self, registry: &ConverterRegistry, value: &ClientValue, scope: Option<&Scope>) {
        let Some(object) = value.as_object() else {
            return;
        };
        object.update_scope(scope);
        let converted: Vec<(ClientValue, ConversionInfo)> = object
            .inner
            .borrow()
            .slots
            .values()
            .filter(|slot| !slot.value.is_smart())
            .filter_map(|slot| slot.conversion.clone().map(|info| (slot.value.clone(), info)))
            .collect();
        for (element, info) in converted {
            registry.update_scope(&element, &info, scope);
        }
    }
}
