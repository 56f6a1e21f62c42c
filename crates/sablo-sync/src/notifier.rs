//! Change notifiers handed to smart elements.

use std::rc::Rc;

use crate::observer::record;
use crate::state::{ChangeMark, Shared, SlotStore, WeakShared};
use crate::value::{ChangeNotifier, ClientValue};

/// Notifier that marks `key` of the container dirty and propagates upwards.
///
/// The closure only holds a weak reference, so a child never keeps its
/// parent alive.
pub(crate) fn element_notifier<S: SlotStore>(weak: WeakShared<S>, key: S::Key) -> ChangeNotifier {
    Rc::new(move || record(&weak, |state| state.mark(key.clone(), ChangeMark::Notified)))
}

/// Points `value`'s notifier at `key` if it is a smart value.
pub(crate) fn wire<S: SlotStore>(inner: &Shared<S>, key: S::Key, value: &ClientValue) {
    if let Some(smart) = value.as_smart() {
        smart.set_change_notifier(element_notifier(Rc::downgrade(inner), key));
    }
}

/// Re-wires every smart element past the first `skip` ones. Keys move
/// after inserts and deletes, so notifiers must follow.
pub(crate) fn rewire<S: SlotStore>(inner: &Shared<S>, skip: usize) {
    let smart: Vec<(S::Key, ClientValue)> = inner
        .borrow()
        .slots
        .keyed()
        .into_iter()
        .skip(skip)
        .filter(|(_, slot)| slot.value.is_smart())
        .map(|(key, slot)| (key, slot.value.clone()))
        .collect();
    for (key, value) in smart {
        wire(inner, key, &value);
    }
}
