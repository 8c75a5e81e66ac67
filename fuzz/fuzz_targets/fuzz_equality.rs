#![no_main]

//! Structured fuzzing of the equality oracle: build two value trees from
//! arbitrary input and check the relations between the comparison modes.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scopewatch_value::{Value, are_equal, deep_clone, deep_eq, same_value};

const MAX_DEPTH: usize = 4;

#[derive(Debug, Arbitrary)]
enum Shape {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Array(Vec<Shape>),
    Object(Vec<(String, Shape)>),
}

impl Shape {
    fn build(&self, depth: usize) -> Value {
        match self {
            Self::Undefined => Value::Undefined,
            Self::Null => Value::Null,
            Self::Bool(b) => Value::from(*b),
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
            Self::Array(items) if depth < MAX_DEPTH => {
                Value::array(items.iter().map(|item| item.build(depth + 1)))
            }
            Self::Object(entries) if depth < MAX_DEPTH => Value::object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.build(depth + 1))),
            ),
            Self::Array(_) | Self::Object(_) => Value::Null,
        }
    }
}

fuzz_target!(|input: (Shape, Shape)| {
    let (a, b) = (input.0.build(0), input.1.build(0));

    assert!(deep_eq(&a, &a));
    assert!(same_value(&a, &a));
    assert_eq!(deep_eq(&a, &b), deep_eq(&b, &a));
    assert_eq!(same_value(&a, &b), same_value(&b, &a));
    if same_value(&a, &b) {
        assert!(deep_eq(&a, &b));
    }
    assert_eq!(are_equal(&a, &b, false), same_value(&a, &b));
    assert_eq!(are_equal(&a, &b, true), deep_eq(&a, &b));

    let copy = deep_clone(&a);
    assert!(deep_eq(&a, &copy));
    if a.is_collection() {
        assert!(!same_value(&a, &copy));
    }
});
