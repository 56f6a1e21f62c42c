//! Watches installed on a container while the server lets the client push
//! changes.
//!
//! Dumb elements get one value watch each; the container gets exactly one
//! structural watch. Smart elements are not watched: they report through
//! their change notifier instead (see [`crate::notifier`]).

use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::equal::deep_equal;
use crate::policy::PushPolicy;
use crate::scope::{Scope, WatchHandle};
use crate::state::{ChangeMark, Shared, SlotStore, VersionState, WeakShared};
use crate::value::ClientValue;

pub(crate) struct ObserverHandles<K> {
    structure: Option<WatchHandle>,
    elements: BTreeMap<K, WatchHandle>,
}

impl<K> Default for ObserverHandles<K> {
    fn default() -> Self {
        Self {
            structure: None,
            elements: BTreeMap::new(),
        }
    }
}

impl<K> ObserverHandles<K> {
    pub fn release(self) {
        if let Some(handle) = self.structure {
            handle.unwatch();
        }
        for handle in self.elements.into_values() {
            handle.unwatch();
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len() + usize::from(self.structure.is_some())
    }
}

/// Releases every watch of the container. Safe on unobserved containers.
pub(crate) fn detach<S: SlotStore>(inner: &Shared<S>) {
    let handles = mem::take(&mut inner.borrow_mut().handles);
    handles.release();
}

/// Installs watches according to the container's push policy.
///
/// Does nothing without a scope, without version state or when the policy
/// is [`PushPolicy::None`]. Any previous handles are released.
pub(crate) fn attach<S: SlotStore>(inner: &Shared<S>) {
    let (scope, policy, dumb_keys) = {
        let guard = inner.borrow();
        let Some(scope) = guard.scope.clone() else {
            return;
        };
        let policy = guard.push_policy();
        if guard.state.is_none() || !policy.is_watched() {
            return;
        }
        let keys: Vec<S::Key> = guard
            .slots
            .keyed()
            .into_iter()
            .filter(|(_, slot)| !slot.value.is_smart())
            .map(|(key, _)| key)
            .collect();
        (scope, policy, keys)
    };

    let weak = Rc::downgrade(inner);
    let mut handles = ObserverHandles::default();
    for key in dumb_keys {
        let handle = watch_element(&scope, &weak, key.clone(), policy);
        handles.elements.insert(key, handle);
    }
    handles.structure = Some(watch_structure(&scope, &weak));
    trace!(watches = handles.len(), policy = policy.as_str(), "observers attached");

    let previous = mem::replace(&mut inner.borrow_mut().handles, handles);
    previous.release();
}

/// Applies `apply` to the container's version state and, when it recorded
/// something, calls the container's notifier. The notifier runs after the
/// borrow is released.
pub(crate) fn record<S: SlotStore>(
    weak: &WeakShared<S>,
    apply: impl FnOnce(&mut VersionState<S::Key>) -> bool,
) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let notifier = {
        let mut guard = inner.borrow_mut();
        let Some(state) = guard.state.as_mut() else {
            return;
        };
        if !apply(state) {
            return;
        }
        guard.notifier.clone()
    };
    if let Some(notify) = notifier {
        notify();
    }
}

struct ElementProbe {
    ident: u64,
    value: ClientValue,
}

fn probe_element<S: SlotStore>(weak: &WeakShared<S>, key: &S::Key) -> Option<ElementProbe> {
    let inner = weak.upgrade()?;
    let guard = inner.borrow();
    let probe = guard.slots.slot(key).map(|slot| ElementProbe {
        ident: slot.ident,
        value: slot.value.clone(),
    });
    probe
}

fn watch_element<S: SlotStore>(
    scope: &Scope,
    weak: &WeakShared<S>,
    key: S::Key,
    policy: PushPolicy,
) -> WatchHandle {
    let getter = {
        let weak = weak.clone();
        let key = key.clone();
        move || probe_element(&weak, &key)
    };
    let changed = move |new: &Option<ElementProbe>, old: &Option<ElementProbe>| match (new, old) {
        (Some(new), Some(old)) => match policy {
            PushPolicy::Deep => !deep_equal(&new.value, &old.value),
            _ => new.ident != old.ident,
        },
        (None, None) => false,
        _ => true,
    };
    let weak = weak.clone();
    scope.watch(getter, changed, move |new, old| {
        // a vanished key is a structural change, reported by the shape watch
        if new.is_none() {
            return;
        }
        let old = old.as_ref().map(|probe| probe.value.clone());
        record(&weak, |state| state.mark(key.clone(), ChangeMark::Watched { old }));
    })
}

#[derive(PartialEq)]
struct ShapeProbe<K> {
    seq: u64,
    /// `(key, ident, is_smart)` per element, in order.
    entries: Vec<(K, u64, bool)>,
}

fn probe_shape<S: SlotStore>(weak: &WeakShared<S>) -> Option<ShapeProbe<S::Key>> {
    let inner = weak.upgrade()?;
    let guard = inner.borrow();
    let entries = guard
        .slots
        .keyed()
        .into_iter()
        .map(|(key, slot)| (key, slot.ident, slot.value.is_smart()))
        .collect();
    Some(ShapeProbe {
        seq: guard.seq_ident,
        entries,
    })
}

fn watch_structure<S: SlotStore>(scope: &Scope, weak: &WeakShared<S>) -> WatchHandle {
    let getter = {
        let weak = weak.clone();
        move || probe_shape(&weak)
    };
    let weak = weak.clone();
    scope.watch(getter, |new, old| new != old, move |new, old| {
        let (Some(new), Some(old)) = (new, old) else {
            return;
        };
        record(&weak, |state| {
            let reshaped = new.seq != old.seq
                || new.entries.len() != old.entries.len()
                || new.entries.iter().zip(&old.entries).any(|(n, o)| n.0 != o.0);
            if reshaped {
                return state.mark_all();
            }
            let mut recorded = false;
            for ((key, ident, _), (_, old_ident, was_smart)) in new.entries.iter().zip(&old.entries) {
                if ident != old_ident && *was_smart {
                    recorded |= state.mark(key.clone(), ChangeMark::Replaced);
                }
            }
            recorded
        });
    })
}

/// Detaches the container's observers for the lifetime of the guard and
/// re-attaches them when it goes out of scope, error paths included.
pub(crate) struct ObservationPause<'a, S: SlotStore> {
    inner: &'a Shared<S>,
}

impl<'a, S: SlotStore> ObservationPause<'a, S> {
    pub fn new(inner: &'a Shared<S>) -> Self {
        detach(inner);
        Self { inner }
    }
}

impl<S: SlotStore> Drop for ObservationPause<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        attach(self.inner);
    }
}
