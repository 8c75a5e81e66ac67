#![forbid(unsafe_code)]

//! The dynamic [`Value`] that watch functions return and scopes store.
//!
//! Scalars (`Undefined`, `Null`, `Bool`, `Number`, `String`) are compared by
//! content. Containers (`Array`, `Object`) are shared handles: cloning a
//! `Value::Array` clones the handle, not the elements, so two clones observe
//! each other's in-place mutations. This is what lets a reference-mode watcher
//! miss an in-place `push` while a value-mode watcher catches it.
//!
//! # Invariants
//!
//! 1. `Value::clone()` never copies container contents.
//! 2. [`deep_clone`](crate::deep_clone) always produces fresh container handles.
//! 3. `PartialEq` is structural ([`deep_eq`](crate::deep_eq)), with NaN equal
//!    to NaN.
//!
//! # Failure Modes
//!
//! - Cyclic containers: `Debug`, `deep_eq` and `deep_clone` recurse without a
//!   visited set and will overflow the stack.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable object storage. Keys iterate in sorted order.
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// A dynamically typed value observed by watchers.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Reading a property nobody set yields this.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
}

impl Value {
    /// Build a fresh array from the given elements.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Array(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// Build a fresh object from `(key, value)` pairs.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    /// An empty array.
    #[must_use]
    pub fn empty_array() -> Self {
        Self::Array(Rc::default())
    }

    /// An empty object.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(Rc::default())
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a numeric NaN.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Number(n) if n.is_nan())
    }

    /// Whether this is an array or an object.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Borrow the elements of an array value.
    #[must_use]
    pub fn items(&self) -> Option<Ref<'_, Vec<Value>>> {
        self.as_array().map(|a| a.borrow())
    }

    /// Mutably borrow the elements of an array value.
    #[must_use]
    pub fn items_mut(&self) -> Option<RefMut<'_, Vec<Value>>> {
        self.as_array().map(|a| a.borrow_mut())
    }

    /// Borrow the entries of an object value.
    #[must_use]
    pub fn entries(&self) -> Option<Ref<'_, BTreeMap<String, Value>>> {
        self.as_object().map(|o| o.borrow())
    }

    /// Mutably borrow the entries of an object value.
    #[must_use]
    pub fn entries_mut(&self) -> Option<RefMut<'_, BTreeMap<String, Value>>> {
        self.as_object().map(|o| o.borrow_mut())
    }

    /// Append to an array in place. Returns `false` when `self` is not an array.
    pub fn push(&self, item: impl Into<Value>) -> bool {
        match self.items_mut() {
            Some(mut items) => {
                items.push(item.into());
                true
            }
            None => false,
        }
    }

    /// Insert a key into an object in place, returning the displaced value.
    ///
    /// Returns `None` when `self` is not an object or the key was new.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries_mut()
            .and_then(|mut entries| entries.insert(key.into(), value.into()))
    }

    /// Read an element of an array or a key of an object.
    ///
    /// Array indices are given as decimal strings or via [`Value::at`].
    #[must_use]
    pub fn field(&self, key: &str) -> Value {
        match self {
            Self::Object(o) => o.borrow().get(key).cloned().unwrap_or_default(),
            Self::Array(_) => key.parse::<usize>().map(|i| self.at(i)).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Read an array element, `Undefined` when out of range or not an array.
    #[must_use]
    pub fn at(&self, index: usize) -> Value {
        self.items()
            .and_then(|items| items.get(index).cloned())
            .unwrap_or_default()
    }

    /// Number of elements (array) or keys (object).
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(a.borrow().len()),
            Self::Object(o) => Some(o.borrow().len()),
            _ => None,
        }
    }

    /// One-level copy: a new container whose elements share the originals'
    /// handles. Scalars are returned as-is.
    #[must_use]
    pub fn shallow_copy(&self) -> Value {
        match self {
            Self::Array(a) => Self::Array(Rc::new(RefCell::new(a.borrow().clone()))),
            Self::Object(o) => Self::Object(Rc::new(RefCell::new(o.borrow().clone()))),
            other => other.clone(),
        }
    }

    /// Short type label used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equality::deep_eq(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(a) => f.debug_list().entries(a.borrow().iter()).finish(),
            Self::Object(o) => f.debug_map().entries(o.borrow().iter()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::array(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
