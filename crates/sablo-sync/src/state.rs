//! Per-container synchronization state.
//!
//! Arrays and objects share one representation: an ordered slot store plus
//! the version bookkeeping the server handed out. [`SlotStore`] abstracts
//! over the two key spaces (positions and property names).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::constants::{INDEX, KEY};
use crate::conversion::ConversionInfo;
use crate::observer::ObserverHandles;
use crate::policy::PushPolicy;
use crate::scope::Scope;
use crate::value::{ChangeNotifier, ClientValue};

/// One element together with its bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub value: ClientValue,
    /// Assignment identity. Re-assigning an element (even with an equal
    /// value) yields a new ident; in-place edits keep it.
    pub ident: u64,
    pub conversion: Option<ConversionInfo>,
}

pub(crate) trait SlotStore: Default + 'static {
    type Key: Clone + Ord + fmt::Debug + 'static;

    /// Tag naming the key of a sparse update entry.
    const KEY_TAG: &'static str;

    fn slot(&self, key: &Self::Key) -> Option<&Slot>;

    fn keyed(&self) -> Vec<(Self::Key, &Slot)>;

    fn key_json(key: &Self::Key) -> Value;

    /// Builds the wire form of a full value from converted entries.
    fn assemble(entries: Vec<(Self::Key, Value)>) -> Value;
}

impl SlotStore for Vec<Slot> {
    type Key = usize;
    const KEY_TAG: &'static str = INDEX;

    fn slot(&self, key: &usize) -> Option<&Slot> {
        self.get(*key)
    }

    fn keyed(&self) -> Vec<(usize, &Slot)> {
        self.iter().enumerate().collect()
    }

    fn key_json(key: &usize) -> Value {
        Value::from(*key)
    }

    fn assemble(entries: Vec<(usize, Value)>) -> Value {
        Value::Array(entries.into_iter().map(|(_, v)| v).collect())
    }
}

impl SlotStore for IndexMap<String, Slot> {
    type Key = String;
    const KEY_TAG: &'static str = KEY;

    fn slot(&self, key: &String) -> Option<&Slot> {
        self.get(key)
    }

    fn keyed(&self) -> Vec<(String, &Slot)> {
        self.iter().map(|(k, s)| (k.clone(), s)).collect()
    }

    fn key_json(key: &String) -> Value {
        Value::String(key.clone())
    }

    fn assemble(entries: Vec<(String, Value)>) -> Value {
        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            map.insert(key, value);
        }
        Value::Object(map)
    }
}

/// Why a key is dirty.
#[derive(Debug, Clone)]
pub(crate) enum ChangeMark {
    /// A smart element reported a change of its own.
    Notified,
    /// A value watch fired; `old` is the value it held before.
    Watched { old: Option<ClientValue> },
    /// A smart element was replaced by another value.
    Replaced,
}

#[derive(Debug)]
pub(crate) struct VersionState<K> {
    pub content_version: u64,
    pub push_policy: PushPolicy,
    pub changed: BTreeMap<K, ChangeMark>,
    pub all_changed: bool,
}

impl<K: Ord> VersionState<K> {
    pub fn new(content_version: u64, push_policy: PushPolicy) -> Self {
        Self {
            content_version,
            push_policy,
            changed: BTreeMap::new(),
            all_changed: false,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.all_changed || !self.changed.is_empty()
    }

    /// Records a dirty key. The first watched old value wins: it is the
    /// value the server last saw.
    pub fn mark(&mut self, key: K, mark: ChangeMark) -> bool {
        if self.all_changed {
            return false;
        }
        match (self.changed.get(&key), &mark) {
            (Some(ChangeMark::Watched { .. }), ChangeMark::Watched { .. }) => {}
            (Some(ChangeMark::Replaced), _) => {}
            _ => {
                self.changed.insert(key, mark);
            }
        }
        true
    }

    pub fn mark_all(&mut self) -> bool {
        let first = !self.all_changed;
        self.all_changed = true;
        self.changed.clear();
        first
    }

    pub fn clear_changes(&mut self) {
        self.changed.clear();
        self.all_changed = false;
    }

    /// Drops the mark of a key the server just overwrote.
    pub fn forget(&mut self, key: &K) {
        self.changed.remove(key);
    }
}

impl VersionState<usize> {
    /// Moves marks at or after `start` right by `count` after an insert.
    pub fn shift_inserted(&mut self, start: usize, count: usize) {
        let moved = self.changed.split_off(&start);
        self.changed
            .extend(moved.into_iter().map(|(index, mark)| (index + count, mark)));
    }

    /// Drops marks inside `start..=end` and moves later ones left.
    pub fn shift_deleted(&mut self, start: usize, end: usize) {
        let mut tail = self.changed.split_off(&start);
        let after = tail.split_off(&(end + 1));
        let span = end - start + 1;
        self.changed
            .extend(after.into_iter().map(|(index, mark)| (index - span, mark)));
    }
}

pub(crate) struct Inner<S: SlotStore> {
    pub slots: S,
    /// Identity of the element sequence as a whole; changes when the
    /// contents are swapped wholesale.
    pub seq_ident: u64,
    next_ident: u64,
    pub state: Option<VersionState<S::Key>>,
    pub notifier: Option<ChangeNotifier>,
    pub scope: Option<Scope>,
    pub handles: ObserverHandles<S::Key>,
}

impl<S: SlotStore> Default for Inner<S> {
    fn default() -> Self {
        Self {
            slots: S::default(),
            seq_ident: 0,
            next_ident: 1,
            state: None,
            notifier: None,
            scope: None,
            handles: ObserverHandles::default(),
        }
    }
}

impl<S: SlotStore> Inner<S> {
    pub fn fresh_ident(&mut self) -> u64 {
        let ident = self.next_ident;
        self.next_ident += 1;
        ident
    }

    pub fn slot(&mut self, value: ClientValue, conversion: Option<ConversionInfo>) -> Slot {
        Slot {
            value,
            ident: self.fresh_ident(),
            conversion,
        }
    }

    /// Starts version tracking, or only moves the version (and the policy
    /// when given) of a container that is already tracked. Pending local
    /// changes survive.
    pub fn initialize(&mut self, content_version: u64, push_policy: Option<PushPolicy>) {
        match self.state.as_mut() {
            Some(state) => {
                state.content_version = content_version;
                if let Some(policy) = push_policy {
                    state.push_policy = policy;
                }
            }
            None => {
                self.state = Some(VersionState::new(content_version, push_policy.unwrap_or_default()));
            }
        }
    }

    pub fn is_changed(&self) -> bool {
        self.state.as_ref().map_or(false, VersionState::is_changed)
    }

    pub fn push_policy(&self) -> PushPolicy {
        self.state.as_ref().map(|s| s.push_policy).unwrap_or_default()
    }
}

pub(crate) type Shared<S> = Rc<RefCell<Inner<S>>>;
pub(crate) type WeakShared<S> = Weak<RefCell<Inner<S>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_watched_old_value_wins() {
        let mut state = VersionState::new(1, PushPolicy::Shallow);
        state.mark(0usize, ChangeMark::Watched { old: Some(json!("a").into()) });
        state.mark(0usize, ChangeMark::Watched { old: Some(json!("b").into()) });
        match state.changed.get(&0) {
            Some(ChangeMark::Watched { old: Some(v) }) => assert_eq!(v.to_json(), json!("a")),
            other => panic!("unexpected mark {other:?}"),
        }
    }

    #[test]
    fn structural_change_supersedes_keys() {
        let mut state = VersionState::new(1, PushPolicy::Deep);
        state.mark(2usize, ChangeMark::Notified);
        assert!(state.mark_all());
        assert!(state.changed.is_empty());
        assert!(!state.mark(3, ChangeMark::Notified));
        assert!(state.is_changed());
        state.clear_changes();
        assert!(!state.is_changed());
    }

    #[test]
    fn initialize_keeps_policy_when_absent() {
        let mut inner: Inner<Vec<Slot>> = Inner::default();
        inner.initialize(3, Some(PushPolicy::Deep));
        inner.initialize(4, None);
        let state = inner.state.as_ref().unwrap();
        assert_eq!(state.content_version, 4);
        assert_eq!(state.push_policy, PushPolicy::Deep);
    }

    #[test]
    fn initialize_keeps_pending_changes() {
        let mut inner: Inner<Vec<Slot>> = Inner::default();
        inner.initialize(1, Some(PushPolicy::Shallow));
        if let Some(state) = inner.state.as_mut() {
            state.mark(0, ChangeMark::Notified);
        }
        inner.initialize(5, None);
        assert!(inner.is_changed());

        if let Some(state) = inner.state.as_mut() {
            state.mark_all();
        }
        inner.initialize(6, Some(PushPolicy::Deep));
        let state = inner.state.as_ref().unwrap();
        assert!(state.all_changed);
        assert_eq!(state.content_version, 6);
        assert_eq!(state.push_policy, PushPolicy::Deep);
    }

    #[test]
    fn marks_follow_inserts_and_deletes() {
        let mut state = VersionState::new(1, PushPolicy::Shallow);
        for index in [0usize, 2, 5] {
            state.mark(index, ChangeMark::Notified);
        }
        state.shift_inserted(2, 3);
        assert_eq!(state.changed.keys().copied().collect::<Vec<_>>(), vec![0, 5, 8]);

        state.shift_deleted(4, 6);
        assert_eq!(state.changed.keys().copied().collect::<Vec<_>>(), vec![0, 5]);

        state.forget(&0);
        assert_eq!(state.changed.keys().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn keyed_stores_assemble_wire_values() {
        assert_eq!(<Vec<Slot>>::assemble(vec![(0, json!(1)), (1, json!(2))]), json!([1, 2]));
        let obj = <IndexMap<String, Slot>>::assemble(vec![("b".into(), json!(1)), ("a".into(), json!(2))]);
        assert_eq!(obj.to_string(), r#"{"b":1,"a":2}"#);
    }
}
