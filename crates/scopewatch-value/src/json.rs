#![forbid(unsafe_code)]

//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! JSON has no `undefined` and no NaN/infinity, so both map to `null` on the
//! way out. Everything else round-trips.

use crate::value::Value;

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => Self::array(items),
            serde_json::Value::Object(entries) => Self::object(entries),
        }
    }
}

impl Value {
    /// Snapshot this value as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Self::to_json).collect())
            }
            Self::Object(entries) => serde_json::Value::Object(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_builds_fresh_containers() {
        let v = Value::from(json!({"list": [1, "two", null], "flag": true}));
        assert_eq!(v.field("list").at(1), Value::from("two"));
        assert_eq!(v.field("flag"), Value::Bool(true));
        assert!(v.field("list").at(2).is_null());
    }

    #[test]
    fn to_json_maps_undefined_and_nan_to_null() {
        let v = Value::array([Value::Undefined, Value::Number(f64::NAN), Value::from(1.5)]);
        assert_eq!(v.to_json(), json!([null, null, 1.5]));
    }
}
