//!
//! Generic value tree
//! ------------------
//! A tagged-variant mapping/sequence/scalar tree used in two places: as the
//! `attributes` payload of every stored resource, and as the `ParameterTree`
//! produced by wire decoding. Keeping one type for both means the filter
//! evaluator and the response encoders traverse resources generically instead
//! of through per-type structs.
//!
//! Maps use `BTreeMap` so enumeration order is stable within a process run.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value { Value::Str(s.into()) }

    pub fn empty_map() -> Value { Value::Map(BTreeMap::new()) }

    pub fn is_map(&self) -> bool { matches!(self, Value::Map(_)) }

    /// Insert a key on a Map value. No effect on non-map variants.
    pub fn set(&mut self, key: impl Into<String>, v: Value) {
        if let Value::Map(m) = self {
            m.insert(key.into(), v);
        }
    }

    /// Remove and return a key from a Map value.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        match self {
            Value::Map(m) => m.remove(key),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Traverse a dotted path of map keys.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut cur = self;
        for seg in path.split('.') {
            cur = cur.get(seg)?;
        }
        Some(cur)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> { self.get(key).and_then(|v| v.as_str()) }

    pub fn get_i64(&self, key: &str) -> Option<i64> { self.get(key).and_then(|v| v.as_i64()) }

    /// Render a scalar variant as its wire string. Lists and maps have no
    /// scalar rendering and return None.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert into a serde_json value for JSON-protocol responses.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Build a value tree from a serde_json document (JSON-protocol request bodies).
    /// Numbers outside i64 and nulls degrade to strings so the tree stays closed.
    pub fn from_json(j: &serde_json::Value) -> Value {
        match j {
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Str(n.to_string()),
            },
            serde_json::Value::Null => Value::Str(String::new()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => {
                let mut m = BTreeMap::new();
                for (k, v) in obj {
                    m.insert(k.clone(), Value::from_json(v));
                }
                Value::Map(m)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_traversal() {
        let mut inner = Value::empty_map();
        inner.set("cidrBlock", Value::str("10.0.0.0/16"));
        let mut root = Value::empty_map();
        root.set("vpc", inner);
        assert_eq!(root.get_path("vpc.cidrBlock").and_then(|v| v.as_str()), Some("10.0.0.0/16"));
        assert!(root.get_path("vpc.missing").is_none());
        assert!(root.get_path("nope.cidrBlock").is_none());
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(Value::Int(42).scalar_string().as_deref(), Some("42"));
        assert_eq!(Value::Bool(true).scalar_string().as_deref(), Some("true"));
        assert_eq!(Value::List(vec![]).scalar_string(), None);
    }

    #[test]
    fn json_round_trip() {
        let j = serde_json::json!({"a": [1, "x", true], "b": {"c": "d"}});
        let v = Value::from_json(&j);
        assert_eq!(v.to_json(), j);
    }
}
