//! Generic structured values exchanged between the host and plugins.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured record keyed by field name.
pub type Map = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Lenient integer conversion: floats are truncated, booleans become
    /// 0/1 and strings are parsed.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(f.trunc() as i64)
                } else {
                    None
                }
            }
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

pub(crate) fn coercion_error(field: &str, expected: &'static str, actual: &Value) -> Error {
    Error::TypeCoercion {
        field: field.to_string(),
        expected,
        actual: actual.type_name(),
    }
}

/// Typed field access on a [`Map`] with errors naming the offending key.
pub trait MapExt {
    /// Returns the raw value or `MissingField`.
    fn field(&self, key: &str) -> Result<&Value>;

    fn get_str(&self, key: &str) -> Result<&str>;
    fn get_bool(&self, key: &str) -> Result<bool>;
    fn get_int(&self, key: &str) -> Result<i64>;
    /// Lenient integer read, see [`Value::to_int`].
    fn to_int(&self, key: &str) -> Result<i64>;
    fn get_blob(&self, key: &str) -> Result<&[u8]>;

    fn get_opt_str(&self, key: &str) -> Result<Option<&str>>;
    fn get_opt_bool(&self, key: &str) -> Result<Option<bool>>;
    fn get_opt_int(&self, key: &str) -> Result<Option<i64>>;
}

impl MapExt for Map {
    fn field(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    fn get_str(&self, key: &str) -> Result<&str> {
        let v = self.field(key)?;
        v.as_str().ok_or_else(|| coercion_error(key, "string", v))
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        let v = self.field(key)?;
        v.as_bool().ok_or_else(|| coercion_error(key, "bool", v))
    }

    fn get_int(&self, key: &str) -> Result<i64> {
        let v = self.field(key)?;
        v.as_int().ok_or_else(|| coercion_error(key, "int", v))
    }

    fn to_int(&self, key: &str) -> Result<i64> {
        let v = self.field(key)?;
        v.to_int().ok_or_else(|| coercion_error(key, "int", v))
    }

    fn get_blob(&self, key: &str) -> Result<&[u8]> {
        let v = self.field(key)?;
        v.as_blob().ok_or_else(|| coercion_error(key, "blob", v))
    }

    fn get_opt_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(_) => self.get_str(key).map(Some),
        }
    }

    fn get_opt_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(_) => self.get_bool(key).map(Some),
        }
    }

    fn get_opt_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(_) => self.get_int(key).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Map {
        let mut m = Map::new();
        m.insert("uri".to_string(), Value::from("/data/file.avi"));
        m.insert("frame_skip".to_string(), Value::Int(5));
        m.insert("next_frame_error".to_string(), Value::Bool(false));
        m.insert("image".to_string(), Value::Blob(vec![1, 2, 3]));
        m.insert("width".to_string(), Value::from("640"));
        m
    }

    #[test]
    fn test_strict_accessors() {
        let m = sample();
        assert_eq!(m.get_str("uri").unwrap(), "/data/file.avi");
        assert_eq!(m.get_int("frame_skip").unwrap(), 5);
        assert!(!m.get_bool("next_frame_error").unwrap());
        assert_eq!(m.get_blob("image").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_missing_field() {
        let m = sample();
        match m.get_str("device_id") {
            Err(Error::MissingField(key)) => assert_eq!(key, "device_id"),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_rejects_other_types() {
        let m = sample();
        match m.get_int("width") {
            Err(Error::TypeCoercion { field, expected, actual }) => {
                assert_eq!(field, "width");
                assert_eq!(expected, "int");
                assert_eq!(actual, "string");
            }
            other => panic!("Expected TypeCoercion, got {:?}", other),
        }
        assert!(m.get_bool("uri").is_err());
    }

    #[test]
    fn test_lenient_int() {
        let m = sample();
        assert_eq!(m.to_int("width").unwrap(), 640);
        assert_eq!(Value::Float(3.9).to_int(), Some(3));
        assert_eq!(Value::Bool(true).to_int(), Some(1));
        assert_eq!(Value::from("@").to_int(), None);
        assert_eq!(Value::Null.to_int(), None);
        assert_eq!(Value::Float(f64::NAN).to_int(), None);
    }

    #[test]
    fn test_optional_accessors() {
        let m = sample();
        assert_eq!(m.get_opt_int("fps").unwrap(), None);
        assert_eq!(m.get_opt_int("frame_skip").unwrap(), Some(5));
        assert!(m.get_opt_bool("uri").is_err());
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "uri": "a.avi",
            "frame_skip": 2,
            "scale": 1.5,
            "flags": [true, null],
        });
        let value = Value::from(json);
        let map = value.as_map().unwrap();
        assert_eq!(map.get_str("uri").unwrap(), "a.avi");
        assert_eq!(map.get_int("frame_skip").unwrap(), 2);
        assert_eq!(map.get("scale"), Some(&Value::Float(1.5)));
        assert_eq!(
            map.get("flags"),
            Some(&Value::Array(vec![Value::Bool(true), Value::Null]))
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_lenient_int_agrees_with_strict(i in any::<i64>()) {
                prop_assert_eq!(Value::Int(i).to_int(), Some(i));
                prop_assert_eq!(Value::from(i.to_string()).to_int(), Some(i));
            }

            #[test]
            fn test_float_truncates_toward_zero(f in -1.0e12f64..1.0e12) {
                prop_assert_eq!(Value::Float(f).to_int(), Some(f.trunc() as i64));
            }
        }
    }
}
