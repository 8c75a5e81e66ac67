#![forbid(unsafe_code)]

//! Watcher registration, removal and watch groups.
//!
//! # Ordering
//!
//! New watchers are pushed onto the *front* of the scope's deque and the
//! digest walks it back to front. Processing order is therefore registration
//! order, and a watcher removed during a walk never shifts the entries the
//! walk has yet to visit: those sit at lower indices than the cursor.
//!
//! # Short-circuit reset
//!
//! Registering or removing a watcher clears the tree's last-dirty marker.
//! A digest pass can then only stop early once it has seen a full lap of the
//! new watcher set, so a watcher added from a listener always runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use scopewatch_value::Value;

use super::Scope;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        Self(NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A boxed watch function, as taken by [`Scope::watch_group`].
pub type WatchFn = Box<dyn Fn(&Scope) -> Value>;

type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope)>;

/// How a watcher decides whether its value changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Equality {
    /// Scalars by content, containers by identity.
    #[default]
    Reference,
    /// Structural comparison against a deep snapshot.
    Value,
}

pub(crate) struct Watcher {
    pub(super) id: WatcherId,
    pub(super) watch_fn: Box<dyn Fn(&Scope) -> Value>,
    pub(super) listener: ListenerFn,
    /// `None` until the first evaluation. Distinct from every real value,
    /// `Value::Undefined` included.
    pub(super) last: RefCell<Option<Value>>,
    pub(super) equality: Equality,
}

/// Deregistration handle returned by the `watch*` methods.
///
/// Dropping the handle does *not* remove the watcher; call
/// [`destroy`](Self::destroy). Repeat calls are no-ops.
#[derive(Clone)]
pub struct WatchHandle {
    release: Rc<dyn Fn()>,
}

impl WatchHandle {
    pub(crate) fn new(release: impl Fn() + 'static) -> Self {
        Self {
            release: Rc::new(release),
        }
    }

    /// Remove the watcher(s) this handle was returned for.
    pub fn destroy(&self) {
        (self.release)();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

struct GroupState {
    new_values: RefCell<Vec<Value>>,
    old_values: RefCell<Vec<Value>>,
    scheduled: Cell<bool>,
    first_run: Cell<bool>,
}

impl Scope {
    /// Watch `watch_fn` by reference equality; `listener` receives
    /// `(new, old, scope)` whenever the value changes, and once on the first
    /// digest with `old == new`.
    pub fn watch<W, L>(&self, watch_fn: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.watch_with(watch_fn, listener, Equality::Reference)
    }

    /// Watch with an explicit [`Equality`] mode.
    pub fn watch_with<W, L>(&self, watch_fn: W, listener: L, equality: Equality) -> WatchHandle
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.register(Watcher {
            id: WatcherId::next(),
            watch_fn: Box::new(watch_fn),
            listener: Box::new(listener),
            last: RefCell::new(None),
            equality,
        })
    }

    /// Register a watch function with no listener. It is still evaluated on
    /// every pass, which is the point: it gets polled once per digest.
    pub fn watch_poll<W>(&self, watch_fn: W) -> WatchHandle
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        self.watch(watch_fn, |_, _, _| {})
    }

    fn register(&self, watcher: Watcher) -> WatchHandle {
        let id = watcher.id;
        self.inner.watchers.borrow_mut().push_front(Rc::new(watcher));
        self.inner.shared.last_dirty.set(None);

        let scope = Rc::downgrade(&self.inner);
        WatchHandle::new(move || {
            let Some(inner) = scope.upgrade() else { return };
            {
                let mut watchers = inner.watchers.borrow_mut();
                if let Some(pos) = watchers.iter().position(|w| w.id == id) {
                    watchers.remove(pos);
                }
            }
            inner.shared.last_dirty.set(None);
        })
    }

    /// Watch several functions with one listener that receives parallel
    /// slices of new and old values.
    ///
    /// The listener runs at most once per digest however many members
    /// changed: member changes schedule it through `eval_async`. With no
    /// watch functions at all it still runs exactly once, unless the handle
    /// is destroyed first.
    pub fn watch_group<I, L>(&self, watch_fns: I, listener: L) -> WatchHandle
    where
        I: IntoIterator<Item = WatchFn>,
        L: Fn(&[Value], &[Value], &Scope) + 'static,
    {
        let watch_fns: Vec<WatchFn> = watch_fns.into_iter().collect();
        let listener = Rc::new(listener);

        if watch_fns.is_empty() {
            let should_call = Rc::new(Cell::new(true));
            let flag = Rc::clone(&should_call);
            self.eval_async(move |scope| {
                if flag.get() {
                    listener(&[], &[], scope);
                }
            });
            return WatchHandle::new(move || should_call.set(false));
        }

        let state = Rc::new(GroupState {
            new_values: RefCell::new(vec![Value::Undefined; watch_fns.len()]),
            old_values: RefCell::new(vec![Value::Undefined; watch_fns.len()]),
            scheduled: Cell::new(false),
            first_run: Cell::new(true),
        });

        let handles: Vec<WatchHandle> = watch_fns
            .into_iter()
            .enumerate()
            .map(|(i, watch_fn)| {
                let state = Rc::clone(&state);
                let listener = Rc::clone(&listener);
                self.watch(watch_fn, move |new_value, old_value, scope| {
                    state.new_values.borrow_mut()[i] = new_value.clone();
                    state.old_values.borrow_mut()[i] = old_value.clone();
                    if state.scheduled.replace(true) {
                        return;
                    }
                    let state = Rc::clone(&state);
                    let listener = Rc::clone(&listener);
                    scope.eval_async(move |scope| {
                        state.scheduled.set(false);
                        let new_values = state.new_values.borrow().clone();
                        let old_values = if state.first_run.replace(false) {
                            new_values.clone()
                        } else {
                            state.old_values.borrow().clone()
                        };
                        listener(&new_values, &old_values, scope);
                    });
                })
            })
            .collect();

        WatchHandle::new(move || {
            for handle in &handles {
                handle.destroy();
            }
        })
    }

    /// Number of watchers registered directly on this scope.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::MacrotaskQueue;

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let c = Rc::new(Cell::new(0));
        (Rc::clone(&c), c)
    }

    #[test]
    fn calls_listener_on_first_digest() {
        let scope = Scope::new_root();
        let (fired, f) = counter();
        scope.watch(|_| Value::from("wat"), move |_, _, _| f.set(f.get() + 1));
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn calls_watch_fn_with_scope_as_argument() {
        let scope = Scope::new_root();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        scope.watch_poll(move |scope| {
            *s.borrow_mut() = Some(scope.clone());
            Value::Undefined
        });
        scope.digest().unwrap();
        assert_eq!(seen.borrow().as_ref(), Some(&scope));
    }

    #[test]
    fn calls_listener_when_watched_value_changes() {
        let scope = Scope::new_root();
        scope.set("someValue", "a");
        scope.set("counter", 0);
        scope.watch(
            |s| s.get("someValue"),
            |_, _, s| s.update("counter", |c| Value::from(c.as_number().unwrap_or(0.0) + 1.0)),
        );

        assert_eq!(scope.get("counter"), Value::from(0));
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(1));
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(1));

        scope.set("someValue", "b");
        assert_eq!(scope.get("counter"), Value::from(1));
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(2));
    }

    #[test]
    fn calls_listener_when_first_value_is_undefined() {
        let scope = Scope::new_root();
        let (fired, f) = counter();
        scope.watch(|s| s.get("someValue"), move |_, _, _| f.set(f.get() + 1));
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn first_call_passes_new_value_as_old_value() {
        let scope = Scope::new_root();
        scope.set("someValue", 123);
        let given = Rc::new(RefCell::new(Value::Undefined));
        let g = Rc::clone(&given);
        scope.watch(|s| s.get("someValue"), move |_, old, _| *g.borrow_mut() = old.clone());
        scope.digest().unwrap();
        assert_eq!(*given.borrow(), Value::from(123));
    }

    #[test]
    fn watcher_added_from_listener_runs_in_same_digest() {
        let scope = Scope::new_root();
        scope.set("aValue", "abc");
        let (fired, f) = counter();
        scope.watch(
            |s| s.get("aValue"),
            move |_, _, s| {
                let f = Rc::clone(&f);
                s.watch(|s| s.get("aValue"), move |_, _, _| f.set(f.get() + 1));
            },
        );
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn destroy_removes_and_is_idempotent() {
        let scope = Scope::new_root();
        scope.set("aValue", "abc");
        let (fired, f) = counter();
        let handle = scope.watch(|s| s.get("aValue"), move |_, _, _| f.set(f.get() + 1));

        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);

        handle.destroy();
        handle.destroy();
        assert_eq!(scope.watcher_count(), 0);

        scope.set("aValue", "ghi");
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn watch_group_fires_once_per_digest() {
        let scope = Scope::new_root();
        scope.set("a", 1);
        scope.set("b", 2);
        let (fired, f) = counter();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        scope.watch_group(
            vec![
                Box::new(|s: &Scope| s.get("a")) as WatchFn,
                Box::new(|s: &Scope| s.get("b")),
            ],
            move |new, _, _| {
                f.set(f.get() + 1);
                *s.borrow_mut() = new.to_vec();
            },
        );
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn watch_group_reports_old_values_after_first_run() {
        let scope = Scope::new_root();
        scope.set("a", 1);
        scope.set("b", 2);
        let olds = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&olds);
        scope.watch_group(
            vec![
                Box::new(|s: &Scope| s.get("a")) as WatchFn,
                Box::new(|s: &Scope| s.get("b")),
            ],
            move |_, old, _| *o.borrow_mut() = old.to_vec(),
        );
        scope.digest().unwrap();
        assert_eq!(*olds.borrow(), vec![Value::from(1), Value::from(2)]);

        scope.set("b", 3);
        scope.digest().unwrap();
        assert_eq!(*olds.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn empty_watch_group_fires_once() {
        let scope = Scope::new_root();
        let (fired, f) = counter();
        scope.watch_group(Vec::new(), move |new, old, _| {
            assert!(new.is_empty() && old.is_empty());
            f.set(f.get() + 1);
        });
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn empty_watch_group_destroyed_before_digest_never_fires() {
        let timers = MacrotaskQueue::new();
        let scope = Scope::builder().timers(timers.clone()).build();
        let (fired, f) = counter();
        let handle = scope.watch_group(Vec::new(), move |_, _, _| f.set(f.get() + 1));
        handle.destroy();
        timers.run_until_idle();
        scope.digest().unwrap();
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn destroying_group_stops_listener() {
        let scope = Scope::new_root();
        scope.set("a", 1);
        let (fired, f) = counter();
        let handle = scope.watch_group(
            vec![Box::new(|s: &Scope| s.get("a")) as WatchFn],
            move |_, _, _| f.set(f.get() + 1),
        );
        scope.digest().unwrap();
        handle.destroy();
        scope.set("a", 2);
        scope.digest().unwrap();
        assert_eq!(fired.get(), 1);
        assert_eq!(scope.watcher_count(), 0);
    }
}
