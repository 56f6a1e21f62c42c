use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{Slots, SyncObject};
use crate::constants::{INITIALIZE, KEY, UPDATES, VALUE};
use crate::converters::ConverterRegistry;
use crate::conversion::ConversionInfo;
use crate::error::{Result, SyncError};
use crate::inbound::{classify, conversions, push_policy, truthy, version, Shape};
use crate::notifier::{rewire, wire};
use crate::observer::ObservationPause;
use crate::policy::PushPolicy;
use crate::scope::Scope;
use crate::state::{Shared, VersionState};
use crate::value::ClientValue;

pub(super) fn from_server(
    registry: &ConverterRegistry,
    server: &Value,
    current: Option<&ClientValue>,
    scope: Option<&Scope>,
) -> Result<ClientValue> {
    let existing = current.and_then(ClientValue::as_object);
    match classify(server, UPDATES) {
        Shape::Full(Value::Object(map)) => {
            let object = existing.cloned().unwrap_or_default();
            let info = conversions(server)?;
            let policy = push_policy(server).unwrap_or_default();
            apply_full(registry, &object, map, info.as_ref(), version(server).unwrap_or(0), policy, scope)?;
            Ok(object.into())
        }
        Shape::Full(other) => {
            debug!(value = %other, "full object value is not an object, discarding");
            discard(existing);
            Ok(ClientValue::null())
        }
        Shape::Incremental(updates) => {
            let object = existing.ok_or(SyncError::MissingClientValue)?;
            apply_updates(registry, object, server, updates, scope)?;
            Ok(object.clone().into())
        }
        Shape::Touch => {
            let object = existing.ok_or(SyncError::MissingClientValue)?;
            let _pause = ObservationPause::new(&object.inner);
            let mut inner = object.inner.borrow_mut();
            inner.initialize(version(server).unwrap_or(0), push_policy(server));
            if let Some(scope) = scope {
                inner.scope = Some(scope.clone());
            }
            drop(inner);
            Ok(object.clone().into())
        }
        Shape::NoOp => Ok(current.cloned().unwrap_or_default()),
        Shape::Discard => {
            debug!(payload = %server, "unsupported object payload, value becomes null");
            discard(existing);
            Ok(ClientValue::null())
        }
    }
}

fn discard(existing: Option<&SyncObject>) {
    if let Some(object) = existing {
        object.discard_state();
    }
}

fn effective_scope(inner: &Shared<Slots>, scope: Option<&Scope>) -> Option<Scope> {
    let scope = scope.cloned().or_else(|| inner.borrow().scope.clone());
    if let Some(scope) = &scope {
        inner.borrow_mut().scope = Some(scope.clone());
    }
    scope
}

fn apply_full(
    registry: &ConverterRegistry,
    object: &SyncObject,
    map: &Map<String, Value>,
    info: Option<&ConversionInfo>,
    content_version: u64,
    policy: PushPolicy,
    scope: Option<&Scope>,
) -> Result<()> {
    let inner = &object.inner;
    let _pause = ObservationPause::new(inner);
    let scope = effective_scope(inner, scope);
    let previous = object.entries();

    let mut converted = IndexMap::with_capacity(map.len());
    for (key, raw) in map {
        let property_info = info.and_then(|c| c.entry(key)).cloned();
        let value = registry.convert_or_plain(raw, property_info.as_ref(), previous.get(key), scope.as_ref())?;
        converted.insert(key.clone(), (value, property_info));
    }

    for old in previous.values() {
        if old.is_smart() && !converted.values().any(|(new, _)| new.same_ref(old)) {
            old.release_observers();
        }
    }

    {
        let mut guard = inner.borrow_mut();
        let mut slots = Slots::with_capacity(converted.len());
        for (key, (value, property_info)) in converted {
            let slot = guard.slot(value, property_info);
            slots.insert(key, slot);
        }
        guard.slots = slots;
        let seq = guard.fresh_ident();
        guard.seq_ident = seq;
        guard.state = Some(VersionState::new(content_version, policy));
    }
    rewire(inner, 0);
    debug!(version = content_version, len = map.len(), policy = policy.as_str(), "full object value applied");
    Ok(())
}

/// One decoded `{k, v}` entry of an update list.
struct KeyedUpdate<'a> {
    key: &'a str,
    value: &'a Value,
    info: Option<ConversionInfo>,
}

fn decode_updates<'a>(updates: &'a Value, info: Option<&ConversionInfo>) -> Result<Vec<KeyedUpdate<'a>>> {
    let items = updates
        .as_array()
        .ok_or_else(|| SyncError::MalformedPayload(format!("object updates must be an array, got {updates}")))?;
    items
        .iter()
        .enumerate()
        .map(|(pos, item)| -> Result<KeyedUpdate<'a>> {
            let key = item
                .get(KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::MalformedPayload(format!("update without a string key: {item}")))?;
            let value = item
                .get(VALUE)
                .ok_or_else(|| SyncError::MalformedPayload(format!("update without a value: {item}")))?;
            let info = info.and_then(|c| c.at(pos)).and_then(|c| c.entry(VALUE)).cloned();
            Ok(KeyedUpdate { key, value, info })
        })
        .collect()
}

fn apply_updates(
    registry: &ConverterRegistry,
    object: &SyncObject,
    server: &Value,
    updates: &Value,
    scope: Option<&Scope>,
) -> Result<()> {
    let inner = &object.inner;
    let _pause = ObservationPause::new(inner);
    let incoming = version(server);

    if truthy(server.get(INITIALIZE)) {
        inner.borrow_mut().initialize(incoming.unwrap_or(0), push_policy(server));
    }
    let expected = inner.borrow().state.as_ref().map(|state| state.content_version);
    match expected {
        None => {
            debug!("keyed update for an untracked object, ignoring");
            return Ok(());
        }
        Some(expected) if Some(expected) != incoming => {
            debug!(expected, incoming = ?incoming, "stale keyed update, ignoring");
            return Ok(());
        }
        Some(_) => {}
    }

    let info = conversions(server)?;
    let decoded = decode_updates(updates, info.as_ref())?;
    let scope = effective_scope(inner, scope);

    for update in &decoded {
        let previous = object.get(update.key);
        let value = registry.convert_or_plain(update.value, update.info.as_ref(), previous.as_ref(), scope.as_ref())?;
        if let Some(previous) = previous.filter(|p| p.is_smart() && !p.same_ref(&value)) {
            previous.release_observers();
        }
        let slot = inner.borrow_mut().slot(value.clone(), update.info.clone());
        inner.borrow_mut().slots.insert(update.key.to_string(), slot);
        wire(inner, update.key.to_string(), &value);
        if let Some(state) = inner.borrow_mut().state.as_mut() {
            state.forget(&update.key.to_string());
        }
    }
    trace!(updates = decoded.len(), "keyed update applied");
    Ok(())
}
