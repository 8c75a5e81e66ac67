#![forbid(unsafe_code)]

//! The equality oracle consulted by the digest loop.
//!
//! Two modes:
//!
//! - **Reference** ([`same_value`]): scalars by content, containers by handle
//!   identity. NaN equals NaN so that a watch returning NaN settles instead of
//!   re-firing on every pass.
//! - **Value** ([`deep_eq`]): containers compared element-wise and key-wise,
//!   recursively. Also treats NaN as equal to NaN.
//!
//! Neither mode has side effects or failure modes (apart from cyclic values,
//! see [`crate::value`]).

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

/// Decide whether `new_value` and `old_value` are "the same" under the
/// requested mode.
#[must_use]
pub fn are_equal(new_value: &Value, old_value: &Value, value_eq: bool) -> bool {
    if value_eq {
        deep_eq(new_value, old_value)
    } else {
        same_value(new_value, old_value)
    }
}

/// Reference-mode identity.
#[must_use]
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Structural equality.
#[must_use]
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| deep_eq(l, r)))
        }
        _ => same_value(a, b),
    }
}

/// Copy a value so that no container handle is shared with the original.
#[must_use]
pub fn deep_clone(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(Rc::new(RefCell::new(
            items.borrow().iter().map(deep_clone).collect(),
        ))),
        Value::Object(entries) => Value::Object(Rc::new(RefCell::new(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), deep_clone(v)))
                .collect(),
        ))),
        other => other.clone(),
    }
}

fn numbers_equal(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan_in_both_modes() {
        let nan = Value::Number(f64::NAN);
        assert!(are_equal(&nan, &Value::Number(f64::NAN), false));
        assert!(are_equal(&nan, &Value::Number(f64::NAN), true));
    }

    #[test]
    fn signed_zeros_are_equal() {
        assert!(same_value(&Value::Number(0.0), &Value::Number(-0.0)));
    }

    #[test]
    fn reference_mode_ignores_in_place_mutation() {
        let arr = Value::array([1, 2]);
        let same_handle = arr.clone();
        arr.push(3);
        assert!(are_equal(&arr, &same_handle, false));
    }

    #[test]
    fn reference_mode_distinguishes_equal_containers() {
        let a = Value::array([1, 2]);
        let b = Value::array([1, 2]);
        assert!(!are_equal(&a, &b, false));
        assert!(are_equal(&a, &b, true));
    }

    #[test]
    fn value_mode_sees_in_place_mutation_against_snapshot() {
        let arr = Value::array([1, 2]);
        let snapshot = deep_clone(&arr);
        assert!(are_equal(&arr, &snapshot, true));
        arr.push(3);
        assert!(!are_equal(&arr, &snapshot, true));
    }

    #[test]
    fn value_mode_nested_objects() {
        let a = Value::object([("x", Value::object([("y", Value::array([1]))]))]);
        let b = deep_clone(&a);
        assert!(deep_eq(&a, &b));
        a.field("x").field("y").push(2);
        assert!(!deep_eq(&a, &b));
    }

    #[test]
    fn object_key_sets_must_match() {
        let a = Value::object([("a", 1)]);
        let b = Value::object([("b", 1)]);
        assert!(!deep_eq(&a, &b));
    }

    #[test]
    fn mismatched_kinds_are_unequal() {
        assert!(!deep_eq(&Value::Undefined, &Value::Null));
        assert!(!deep_eq(&Value::from(1), &Value::from("1")));
        assert!(!deep_eq(&Value::empty_array(), &Value::empty_object()));
    }

    #[test]
    fn deep_clone_detaches_every_level() {
        let inner = Value::array([1]);
        let outer = Value::object([("inner", inner.clone())]);
        let copy = deep_clone(&outer);
        inner.push(2);
        assert_eq!(copy.field("inner").len(), Some(1));
    }
}
