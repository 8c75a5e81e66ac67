#![forbid(unsafe_code)]

//! Dynamic values and the equality oracle for the scopewatch digest engine.
//!
//! Watch functions return a [`Value`]; the digest loop compares each result
//! against the last one it saw with [`are_equal`], in either reference mode
//! (containers by identity) or value mode (containers by structure).

pub mod equality;
#[cfg(feature = "serde")]
pub mod json;
pub mod value;

pub use equality::{are_equal, deep_clone, deep_eq, same_value};
pub use value::{ArrayRef, ObjectRef, Value};
