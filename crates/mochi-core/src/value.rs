use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::CoreError;

/// Opaque handle to a live stream, reaped by the script runtime on return.
///
/// The concrete `Stream` type lives in `mochi-wire`; this is the identifier
/// that flows through the dynamic value system without creating a dependency
/// cycle between `mochi-core` and `mochi-wire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

/// Dynamic value routed across the script boundary, peer wire, and database
/// query surface. Conversions to/from `serde_json::Value` are total for every
/// variant listed here; anything else is a hard error, never silently
/// stringified.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Stream(StreamId),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Converts to `serde_json::Value`. `Bytes` become base64 strings and
    /// `Stream` handles become an object tagging their id, since neither has
    /// a native JSON representation; this is a lossy but total conversion
    /// used for wire/db interchange, not for round-tripping through JSON.
    pub fn to_json(&self) -> JsonValue {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        match self {
            Value::None => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(obj)
            }
            Value::Stream(id) => {
                let mut obj = serde_json::Map::new();
                obj.insert("__stream__".to_string(), JsonValue::from(id.0));
                JsonValue::Object(obj)
            }
        }
    }

    /// Converts from `serde_json::Value`. Total: every JSON shape maps onto
    /// a `Value` variant (numbers become `Int` when they fit exactly,
    /// otherwise `Float`).
    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), Value::from_json(v));
                }
                Value::Map(map)
            }
        }
    }

    /// Fallible accessor used at argument-shape boundaries, mirroring the
    /// spec's "argument-shape error" taxonomy entry.
    pub fn expect_string(&self, arg_name: &str) -> Result<&str, CoreError> {
        self.as_str()
            .ok_or_else(|| CoreError::Argument(format!("expected string for '{arg_name}'")))
    }

    pub fn expect_int(&self, arg_name: &str) -> Result<i64, CoreError> {
        self.as_int()
            .ok_or_else(|| CoreError::Argument(format!("expected int for '{arg_name}'")))
    }

    pub fn expect_map(&self, arg_name: &str) -> Result<&BTreeMap<String, Value>, CoreError> {
        self.as_map()
            .ok_or_else(|| CoreError::Argument(format!("expected map for '{arg_name}'")))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_scalars_through_json() {
        let cases = vec![
            Value::None,
            Value::Bool(true),
            Value::Int(42),
            Value::String("hi".into()),
        ];
        for case in cases {
            let json = case.to_json();
            let back = Value::from_json(&json);
            assert_eq!(case, back);
        }
    }

    #[test]
    fn map_conversion_preserves_keys() {
        let value = Value::from_json(&json!({"a": 1, "b": "two"}));
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(map.get("b"), Some(&Value::String("two".into())));
    }

    #[test]
    fn expect_string_errors_on_wrong_shape() {
        let value = Value::Int(1);
        let err = value.expect_string("body").unwrap_err();
        assert_eq!(err.kind(), "argument");
    }

    #[test]
    fn bytes_round_trip_as_base64_through_json_but_not_back_to_bytes() {
        let value = Value::Bytes(vec![1, 2, 3]);
        let json = value.to_json();
        assert!(json.as_str().is_some());
    }
}
