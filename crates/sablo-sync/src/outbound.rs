//! Client-to-server serialization of a container.

use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::{CONTENT_VERSION, NO_OP, UPDATES, VALUE};
use crate::converters::ConverterRegistry;
use crate::conversion::ConversionInfo;
use crate::equal::{deep_equal, watched_value_changed};
use crate::error::Result;
use crate::notifier::rewire;
use crate::observer::{attach, detach};
use crate::state::{ChangeMark, Shared, SlotStore};
use crate::value::ClientValue;

/// `{"n": true}`.
pub(crate) fn no_op() -> Value {
    let mut payload = Map::new();
    payload.insert(NO_OP.to_string(), Value::Bool(true));
    Value::Object(payload)
}

/// Produces the payload for the container behind `inner`.
///
/// `new` is the container itself as a client value, `old` the value last
/// exchanged with the server.
pub(crate) fn serialize<S: SlotStore>(
    registry: &ConverterRegistry,
    inner: &Shared<S>,
    new: &ClientValue,
    old: Option<&ClientValue>,
) -> Result<Value> {
    let pending = {
        let guard = inner.borrow();
        guard
            .state
            .as_ref()
            .map(|state| (state.content_version, state.all_changed, state.is_changed()))
    };
    match pending {
        Some((version, true, _)) => full_snapshot(registry, inner, version),
        Some((version, false, true)) => sparse_update(registry, inner, version),
        _ if old.map_or(false, |old| deep_equal(new, old)) => Ok(no_op()),
        Some(_) => {
            debug!("container replaced client-side, dropping its version state");
            detach(inner);
            inner.borrow_mut().state = None;
            Ok(new.to_json())
        }
        None => Ok(new.to_json()),
    }
}

fn full_snapshot<S: SlotStore>(registry: &ConverterRegistry, inner: &Shared<S>, version: u64) -> Result<Value> {
    let elements: Vec<(S::Key, ClientValue, Option<ConversionInfo>)> = inner
        .borrow()
        .slots
        .keyed()
        .into_iter()
        .map(|(key, slot)| (key, slot.value.clone(), slot.conversion.clone()))
        .collect();

    let mut entries = Vec::with_capacity(elements.len());
    for (key, value, info) in elements {
        // tracked children answer for themselves; anything else is new
        let old = value.has_sync_state().then_some(&value);
        let wire = registry.to_server_or_plain(&value, info.as_ref(), old)?;
        entries.push((key, wire));
    }

    let mut payload = Map::new();
    payload.insert(CONTENT_VERSION.to_string(), Value::from(version));
    payload.insert(VALUE.to_string(), S::assemble(entries));

    if let Some(state) = inner.borrow_mut().state.as_mut() {
        state.content_version += 1;
        state.clear_changes();
    }
    debug!(sent_version = version, next_version = version + 1, "full value sent");

    rewire(inner, 0);
    attach(inner);
    Ok(Value::Object(payload))
}

fn sparse_update<S: SlotStore>(registry: &ConverterRegistry, inner: &Shared<S>, version: u64) -> Result<Value> {
    let dirty: Vec<(S::Key, ChangeMark, Option<(ClientValue, Option<ConversionInfo>)>)> = {
        let guard = inner.borrow();
        match guard.state.as_ref() {
            Some(state) => state
                .changed
                .iter()
                .map(|(key, mark)| {
                    let current = guard
                        .slots
                        .slot(key)
                        .map(|slot| (slot.value.clone(), slot.conversion.clone()));
                    (key.clone(), mark.clone(), current)
                })
                .collect(),
            None => Vec::new(),
        }
    };

    let mut updates = Vec::new();
    for (key, mark, current) in dirty {
        let Some((value, info)) = current else {
            continue;
        };
        let (send, old) = match mark {
            ChangeMark::Watched { old } => (watched_value_changed(old.as_ref(), &value, info.as_ref()), old),
            ChangeMark::Notified => (value.as_smart().map_or(true, |smart| smart.is_changed()), Some(value.clone())),
            ChangeMark::Replaced => (true, None),
        };
        if !send {
            continue;
        }
        let mut entry = Map::new();
        entry.insert(S::KEY_TAG.to_string(), S::key_json(&key));
        entry.insert(
            VALUE.to_string(),
            registry.to_server_or_plain(&value, info.as_ref(), old.as_ref())?,
        );
        updates.push(Value::Object(entry));
    }

    if let Some(state) = inner.borrow_mut().state.as_mut() {
        state.clear_changes();
    }
    debug!(version, updates = updates.len(), "sparse update sent");

    let mut payload = Map::new();
    payload.insert(CONTENT_VERSION.to_string(), Value::from(version));
    payload.insert(UPDATES.to_string(), Value::Array(updates));
    Ok(Value::Object(payload))
}
