//! Explicit observation substrate.
//!
//! A [`Scope`] owns a set of watches. Each watch remembers the last value its
//! getter produced; [`Scope::digest`] re-reads every getter, compares, and
//! fires the listener of each watch whose value changed. Passes repeat until
//! one of them is clean, so listeners that mutate watched data are settled
//! within the same digest. Nothing is observed between digests: a batch of
//! writes made in one tick is seen as a single change.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{Result, SyncError};

/// Dirty passes a digest may run before it gives up.
pub const DEFAULT_DIGEST_TTL: usize = 10;

struct Watcher {
    check: Box<dyn FnMut() -> bool>,
}

impl Watcher {
    fn run(&mut self) -> bool {
        (self.check)()
    }
}

struct ScopeInner {
    watchers: BTreeMap<u64, Rc<RefCell<Watcher>>>,
    next_id: u64,
    digesting: bool,
    ttl: usize,
}

#[derive(Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_DIGEST_TTL)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scope")
            .field("watchers", &inner.watchers.len())
            .field("ttl", &inner.ttl)
            .finish()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                watchers: BTreeMap::new(),
                next_id: 0,
                digesting: false,
                ttl: ttl.max(1),
            })),
        }
    }

    /// Registers a watch.
    ///
    /// `getter` is evaluated immediately to establish the baseline, so the
    /// listener only fires for changes made after registration. `changed`
    /// decides whether a new reading differs from the previous one; the
    /// listener receives `(new, old)`.
    pub fn watch<T, G, C, L>(&self, getter: G, changed: C, mut listener: L) -> WatchHandle
    where
        T: 'static,
        G: Fn() -> T + 'static,
        C: Fn(&T, &T) -> bool + 'static,
        L: FnMut(&T, &T) + 'static,
    {
        let mut last = getter();
        let check = move || {
            let current = getter();
            if !changed(&current, &last) {
                return false;
            }
            let previous = std::mem::replace(&mut last, current);
            listener(&last, &previous);
            true
        };
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.watchers.insert(
            id,
            Rc::new(RefCell::new(Watcher {
                check: Box::new(check),
            })),
        );
        WatchHandle {
            scope: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Runs observation passes until no watch fires.
    ///
    /// Returns how many listener invocations happened in total.
    pub fn digest(&self) -> Result<usize> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.digesting {
                return Err(SyncError::DigestInProgress);
            }
            inner.digesting = true;
        }
        let _running = DigestRunning(&self.inner);
        self.run_passes()
    }

    fn run_passes(&self) -> Result<usize> {
        let ttl = self.inner.borrow().ttl;
        let mut fired = 0;
        for pass in 0..ttl {
            let watchers: Vec<(u64, Rc<RefCell<Watcher>>)> = self
                .inner
                .borrow()
                .watchers
                .iter()
                .map(|(id, w)| (*id, Rc::clone(w)))
                .collect();
            let mut dirty = false;
            for (id, watcher) in watchers {
                // a listener earlier in this pass may have removed it
                if !self.inner.borrow().watchers.contains_key(&id) {
                    continue;
                }
                if watcher.borrow_mut().run() {
                    dirty = true;
                    fired += 1;
                }
            }
            trace!(pass, fired, dirty, "digest pass");
            if !dirty {
                return Ok(fired);
            }
        }
        Err(SyncError::DigestLimitExceeded(ttl))
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.borrow().watchers.len()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

struct DigestRunning<'a>(&'a Rc<RefCell<ScopeInner>>);

impl Drop for DigestRunning<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().digesting = false;
    }
}

/// Registration of a single watch. Dropping the handle keeps the watch
/// alive; call [`WatchHandle::unwatch`] to remove it.
#[derive(Debug)]
pub struct WatchHandle {
    scope: Weak<RefCell<ScopeInner>>,
    id: u64,
}

impl WatchHandle {
    /// Removes the watch. Idempotent, and a no-op once the scope is gone.
    pub fn unwatch(&self) {
        if let Some(scope) = self.scope.upgrade() {
            scope.borrow_mut().watchers.remove(&self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.scope
            .upgrade()
            .map_or(false, |scope| scope.borrow().watchers.contains_key(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn listener_fires_only_after_change() {
        let scope = Scope::new();
        let source = Rc::new(Cell::new(1));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (s, log) = (source.clone(), seen.clone());
        scope.watch(move || s.get(), |a, b| a != b, move |new, old| log.borrow_mut().push((*new, *old)));

        assert_eq!(scope.digest().unwrap(), 0);
        source.set(2);
        source.set(3);
        assert_eq!(scope.digest().unwrap(), 1);
        assert_eq!(*seen.borrow(), vec![(3, 1)]);
    }

    #[test]
    fn unwatch_stops_notifications() {
        let scope = Scope::new();
        let source = Rc::new(Cell::new(0));
        let hits = Rc::new(Cell::new(0));

        let (s, h) = (source.clone(), hits.clone());
        let handle = scope.watch(move || s.get(), |a, b| a != b, move |_, _| h.set(h.get() + 1));
        assert!(handle.is_active());
        handle.unwatch();
        handle.unwatch();
        assert!(!handle.is_active());

        source.set(5);
        scope.digest().unwrap();
        assert_eq!(hits.get(), 0);
        assert_eq!(scope.watcher_count(), 0);
    }

    #[test]
    fn listener_writes_settle_in_same_digest() {
        let scope = Scope::new();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));

        let (a1, b1) = (a.clone(), b.clone());
        scope.watch(move || a1.get(), |x, y| x != y, move |new, _| b1.set(*new * 10));
        let b2 = b.clone();
        let copies = Rc::new(Cell::new(0));
        let c = copies.clone();
        scope.watch(move || b2.get(), |x, y| x != y, move |_, _| c.set(c.get() + 1));

        a.set(4);
        scope.digest().unwrap();
        assert_eq!(b.get(), 40);
        assert_eq!(copies.get(), 1);
    }

    #[test]
    fn unstable_watch_hits_ttl() {
        let scope = Scope::with_ttl(3);
        let counter = Rc::new(Cell::new(0));
        let c1 = counter.clone();
        let c2 = counter.clone();
        scope.watch(move || c1.get(), |x, y| x != y, move |_, _| c2.set(c2.get() + 1));
        counter.set(1);
        assert!(matches!(scope.digest(), Err(SyncError::DigestLimitExceeded(3))));
        // the flag is reset, a later digest may run again
        assert!(matches!(scope.digest(), Err(SyncError::DigestLimitExceeded(3))));
    }

    #[test]
    fn digest_is_not_reentrant() {
        let scope = Scope::new();
        let source = Rc::new(Cell::new(0));
        let result = Rc::new(RefCell::new(None));

        let (s, inner_scope, r) = (source.clone(), scope.clone(), result.clone());
        scope.watch(
            move || s.get(),
            |x, y| x != y,
            move |_, _| *r.borrow_mut() = Some(inner_scope.digest().is_err()),
        );
        source.set(1);
        scope.digest().unwrap();
        assert_eq!(*result.borrow(), Some(true));
    }
}
