#![forbid(unsafe_code)]

//! Shallow collection watches.
//!
//! A value-mode watch deep-copies and deep-compares on every pass. A
//! collection watch only looks one level down: it notices elements or keys
//! being added, removed, replaced or reordered, but not mutations inside an
//! element. Internally it keeps a shadow copy of the collection and a change
//! counter; the counter is what the underlying reference-mode watcher sees.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use scopewatch_value::{Value, same_value};

use super::{Scope, WatchHandle};

/// The engine's private copy of what the collection looked like last pass.
enum Shadow {
    Scalar(Value),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

struct CollectionState {
    shadow: Shadow,
    changes: u64,
    new_value: Value,
    very_old_value: Value,
    first_run: bool,
}

impl CollectionState {
    /// Update the shadow from `new_value`, bumping the counter on any
    /// difference.
    fn observe(&mut self, new_value: Value) {
        match &new_value {
            Value::Array(items) => self.observe_array(&items.borrow()),
            Value::Object(entries) => self.observe_object(&entries.borrow()),
            scalar => {
                let unchanged =
                    matches!(&self.shadow, Shadow::Scalar(old) if same_value(old, scalar));
                if !unchanged {
                    self.changes += 1;
                }
                self.shadow = Shadow::Scalar(scalar.clone());
            }
        }
        self.new_value = new_value;
    }

    fn observe_array(&mut self, items: &[Value]) {
        let mut shadow = match mem::replace(&mut self.shadow, Shadow::Scalar(Value::Undefined)) {
            Shadow::Array(shadow) => shadow,
            _ => {
                self.changes += 1;
                Vec::new()
            }
        };
        if shadow.len() != items.len() {
            self.changes += 1;
            shadow.resize(items.len(), Value::Undefined);
        }
        for (old, new) in shadow.iter_mut().zip(items) {
            if !same_value(old, new) {
                self.changes += 1;
                *old = new.clone();
            }
        }
        self.shadow = Shadow::Array(shadow);
    }

    fn observe_object(&mut self, entries: &BTreeMap<String, Value>) {
        let mut shadow = match mem::replace(&mut self.shadow, Shadow::Scalar(Value::Undefined)) {
            Shadow::Object(shadow) => shadow,
            _ => {
                self.changes += 1;
                BTreeMap::new()
            }
        };
        for (key, new) in entries {
            match shadow.get_mut(key) {
                Some(old) if same_value(old, new) => {}
                Some(old) => {
                    self.changes += 1;
                    *old = new.clone();
                }
                None => {
                    self.changes += 1;
                    shadow.insert(key.clone(), new.clone());
                }
            }
        }
        if shadow.len() > entries.len() {
            self.changes += 1;
            shadow.retain(|key, _| entries.contains_key(key));
        }
        self.shadow = Shadow::Object(shadow);
    }
}

impl Scope {
    /// Watch an array or object shallowly.
    ///
    /// The listener fires when an element or key is added, removed, replaced
    /// (by identity) or reordered. `old` is a one-level copy of the
    /// collection as it was at the previous firing. On the first firing it is
    /// a one-level copy of `new`, so later in-place edits do not reach it.
    /// Non-collection values behave like [`Scope::watch`].
    pub fn watch_collection<W, L>(&self, watch_fn: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        let state = Rc::new(RefCell::new(CollectionState {
            shadow: Shadow::Scalar(Value::Undefined),
            changes: 0,
            new_value: Value::Undefined,
            very_old_value: Value::Undefined,
            first_run: true,
        }));

        let watch_state = Rc::clone(&state);
        let internal_watch = move |scope: &Scope| {
            let new_value = watch_fn(scope);
            let mut state = watch_state.borrow_mut();
            state.observe(new_value);
            #[allow(clippy::cast_precision_loss)]
            let changes = state.changes as f64;
            Value::Number(changes)
        };

        let internal_listener = move |_: &Value, _: &Value, scope: &Scope| {
            let (new_value, old_value) = {
                let mut state = state.borrow_mut();
                let old_value = if state.first_run {
                    state.first_run = false;
                    state.new_value.shallow_copy()
                } else {
                    state.very_old_value.clone()
                };
                (state.new_value.clone(), old_value)
            };
            listener(&new_value, &old_value, scope);
            state.borrow_mut().very_old_value = new_value.shallow_copy();
        };

        self.watch(internal_watch, internal_listener)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn counted(scope: &Scope, name: &'static str) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        scope.watch_collection(move |s| s.get(name), move |_, _, _| c.set(c.get() + 1));
        count
    }

    #[test]
    fn works_like_watch_for_scalars() {
        let scope = Scope::new_root();
        scope.set("aValue", 42);
        let count = counted(&scope, "aValue");
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);
        scope.set("aValue", 43);
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn fires_once_for_undefined() {
        let scope = Scope::new_root();
        let count = counted(&scope, "missing");
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nan_scalar_settles() {
        let scope = Scope::new_root();
        scope.set("aValue", f64::NAN);
        let count = counted(&scope, "aValue");
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn notices_value_becoming_array() {
        let scope = Scope::new_root();
        let count = counted(&scope, "arr");
        scope.digest().unwrap();
        scope.set("arr", Value::empty_array());
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn notices_array_additions_removals_and_replacements() {
        let scope = Scope::new_root();
        scope.set("arr", Value::array([1, 2, 3]));
        let count = counted(&scope, "arr");
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);

        scope.get("arr").push(4);
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);

        scope.get("arr").items_mut().map(|mut items| items.remove(0));
        scope.digest().unwrap();
        assert_eq!(count.get(), 3);

        if let Some(mut items) = scope.get("arr").items_mut() {
            items[0] = Value::from(42);
        }
        scope.digest().unwrap();
        assert_eq!(count.get(), 4);

        if let Some(mut items) = scope.get("arr").items_mut() {
            items.reverse();
        }
        scope.digest().unwrap();
        assert_eq!(count.get(), 5);

        scope.digest().unwrap();
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn ignores_mutation_inside_elements() {
        let scope = Scope::new_root();
        let inner = Value::array([1]);
        scope.set("arr", Value::array([inner.clone()]));
        let count = counted(&scope, "arr");
        scope.digest().unwrap();
        inner.push(2);
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nan_elements_do_not_refire() {
        let scope = Scope::new_root();
        scope.set("arr", Value::array([2.0, f64::NAN, 3.0]));
        let count = counted(&scope, "arr");
        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn notices_object_key_changes() {
        let scope = Scope::new_root();
        scope.set("obj", Value::object([("a", 1)]));
        let count = counted(&scope, "obj");
        scope.digest().unwrap();
        assert_eq!(count.get(), 1);

        scope.get("obj").insert("b", 2);
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);

        scope.get("obj").insert("a", 10);
        scope.digest().unwrap();
        assert_eq!(count.get(), 3);

        scope.get("obj").entries_mut().map(|mut e| e.remove("a"));
        scope.digest().unwrap();
        assert_eq!(count.get(), 4);

        scope.digest().unwrap();
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn switching_between_array_and_object_fires() {
        let scope = Scope::new_root();
        scope.set("v", Value::array([1]));
        let count = counted(&scope, "v");
        scope.digest().unwrap();
        scope.set("v", Value::object([("0", 1)]));
        scope.digest().unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn old_value_is_previous_shallow_copy() {
        let scope = Scope::new_root();
        scope.set("arr", Value::array([1, 2]));
        let olds = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&olds);
        scope.watch_collection(|s| s.get("arr"), move |_, old, _| o.borrow_mut().push(old.clone()));

        scope.digest().unwrap();
        scope.get("arr").push(3);
        scope.digest().unwrap();

        let olds = olds.borrow();
        assert_eq!(olds[0], Value::array([1, 2]), "first call: detached copy of new");
        assert!(!same_value(&olds[0], &scope.get("arr")));
        assert_eq!(olds[1], Value::array([1, 2]), "second call: pre-push copy");
    }
}
