use serde_json::Value;
use tracing::{debug, trace};

use super::granular::{decode_batch, validate_batch, GranularOp};
use super::SyncArray;
use crate::constants::{OpKind, GRANULAR_UPDATES, INITIALIZE};
use crate::converters::ConverterRegistry;
use crate::conversion::ConversionInfo;
use crate::error::{Result, SyncError};
use crate::inbound::{classify, conversions, push_policy, truthy, version, Shape};
use crate::notifier::{rewire, wire};
use crate::observer::ObservationPause;
use crate::policy::PushPolicy;
use crate::scope::Scope;
use crate::state::{Shared, Slot, VersionState};
use crate::value::ClientValue;

pub(super) fn from_server(
    registry: &ConverterRegistry,
    server: &Value,
    current: Option<&ClientValue>,
    scope: Option<&Scope>,
) -> Result<ClientValue> {
    let existing = current.and_then(ClientValue::as_array);
    match classify(server, GRANULAR_UPDATES) {
        Shape::Full(Value::Array(items)) => {
            let array = existing.cloned().unwrap_or_default();
            let info = conversions(server)?;
            let policy = push_policy(server).unwrap_or_default();
            apply_full(registry, &array, items, info.as_ref(), version(server).unwrap_or(0), policy, scope)?;
            Ok(array.into())
        }
        Shape::Full(other) => {
            debug!(value = %other, "full array value is not an array, discarding");
            discard(existing);
            Ok(ClientValue::null())
        }
        Shape::Incremental(ops) => {
            let array = existing.ok_or(SyncError::MissingClientValue)?;
            apply_granular(registry, array, server, ops, scope)?;
            Ok(array.clone().into())
        }
        Shape::Touch => {
            let array = existing.ok_or(SyncError::MissingClientValue)?;
            let _pause = ObservationPause::new(&array.inner);
            let mut inner = array.inner.borrow_mut();
            inner.initialize(version(server).unwrap_or(0), push_policy(server));
            if let Some(scope) = scope {
                inner.scope = Some(scope.clone());
            }
            drop(inner);
            Ok(array.clone().into())
        }
        Shape::NoOp => Ok(current.cloned().unwrap_or_default()),
        Shape::Discard => {
            debug!(payload = %server, "unsupported array payload, value becomes null");
            discard(existing);
            Ok(ClientValue::null())
        }
    }
}

fn discard(existing: Option<&SyncArray>) {
    if let Some(array) = existing {
        array.discard_state();
    }
}

fn effective_scope(inner: &Shared<Vec<Slot>>, scope: Option<&Scope>) -> Option<Scope> {
    let scope = scope.cloned().or_else(|| inner.borrow().scope.clone());
    if let Some(scope) = &scope {
        inner.borrow_mut().scope = Some(scope.clone());
    }
    scope
}

fn apply_full(
    registry: &ConverterRegistry,
    array: &SyncArray,
    items: &[Value],
    info: Option<&ConversionInfo>,
    content_version: u64,
    policy: PushPolicy,
    scope: Option<&Scope>,
) -> Result<()> {
    let inner = &array.inner;
    let _pause = ObservationPause::new(inner);
    let scope = effective_scope(inner, scope);
    let previous = array.values();

    let mut converted = Vec::with_capacity(items.len());
    for (index, raw) in items.iter().enumerate() {
        let element_info = info.and_then(|c| c.at(index)).cloned();
        let value = registry.convert_or_plain(raw, element_info.as_ref(), previous.get(index), scope.as_ref())?;
        converted.push((value, element_info));
    }

    for old in &previous {
        if old.is_smart() && !converted.iter().any(|(new, _)| new.same_ref(old)) {
            old.release_observers();
        }
    }

    {
        let mut guard = inner.borrow_mut();
        let mut slots = Vec::with_capacity(converted.len());
        for (value, element_info) in converted {
            slots.push(guard.slot(value, element_info));
        }
        guard.slots = slots;
        let seq = guard.fresh_ident();
        guard.seq_ident = seq;
        guard.state = Some(VersionState::new(content_version, policy));
    }
    rewire(inner, 0);
    debug!(version = content_version, len = items.len(), policy = policy.as_str(), "full array value applied");
    Ok(())
}

fn apply_granular(
    registry: &ConverterRegistry,
    array: &SyncArray,
    server: &Value,
    ops: &Value,
    scope: Option<&Scope>,
) -> Result<()> {
    let inner = &array.inner;
    let _pause = ObservationPause::new(inner);
    let incoming = version(server);

    if truthy(server.get(INITIALIZE)) {
        inner.borrow_mut().initialize(incoming.unwrap_or(0), push_policy(server));
    }
    let expected = inner.borrow().state.as_ref().map(|state| state.content_version);
    match expected {
        None => {
            debug!("granular update for an untracked array, ignoring");
            return Ok(());
        }
        Some(expected) if Some(expected) != incoming => {
            debug!(expected, incoming = ?incoming, "stale granular update, ignoring whole batch");
            return Ok(());
        }
        Some(_) => {}
    }

    let ops = decode_batch(ops)?;
    let len = array.len();
    validate_batch(&ops, len)?;
    let scope = effective_scope(inner, scope);

    for op in &ops {
        apply_op(registry, inner, op, scope.as_ref())?;
        follow_op(inner, op);
    }
    trace!(ops = ops.len(), len = array.len(), "granular update applied");
    Ok(())
}

/// Keeps pending local marks on the elements they were recorded for. The
/// server's value wins where it overwrote an element.
fn follow_op(inner: &Shared<Vec<Slot>>, op: &GranularOp) {
    let mut guard = inner.borrow_mut();
    let Some(state) = guard.state.as_mut() else {
        return;
    };
    match op.kind {
        OpKind::Changed => {
            for index in op.start..=op.end {
                state.forget(&index);
            }
        }
        OpKind::Insert => state.shift_inserted(op.start, op.data.len()),
        OpKind::Delete => state.shift_deleted(op.start, op.end),
    }
}

fn apply_op(
    registry: &ConverterRegistry,
    inner: &Shared<Vec<Slot>>,
    op: &GranularOp,
    scope: Option<&Scope>,
) -> Result<()> {
    match op.kind {
        OpKind::Changed => {
            for (offset, raw) in op.data.iter().enumerate() {
                let index = op.start + offset;
                let element_info = op.conversions.as_ref().and_then(|c| c.at(offset)).cloned();
                let previous = inner.borrow().slots.get(index).map(|slot| slot.value.clone());
                let value = registry.convert_or_plain(raw, element_info.as_ref(), previous.as_ref(), scope)?;
                if let Some(previous) = previous.filter(|p| p.is_smart() && !p.same_ref(&value)) {
                    previous.release_observers();
                }
                let slot = inner.borrow_mut().slot(value.clone(), element_info);
                inner.borrow_mut().slots[index] = slot;
                wire(inner, index, &value);
            }
        }
        OpKind::Insert => {
            let batch = registry.convert_batch(&op.data, op.conversions.as_ref(), scope)?;
            {
                let mut guard = inner.borrow_mut();
                for (value, element_info) in batch.into_iter().rev() {
                    let slot = guard.slot(value, element_info);
                    guard.slots.insert(op.start, slot);
                }
            }
            rewire(inner, op.start);
        }
        OpKind::Delete => {
            let removed: Vec<Slot> = inner.borrow_mut().slots.drain(op.start..=op.end).collect();
            for slot in &removed {
                slot.value.release_observers();
            }
            rewire(inner, op.start);
        }
    }
    Ok(())
}
