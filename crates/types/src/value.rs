//! Dynamic value model shared by assets, forms, storage, and the script bridge.
//!
//! Every map key is a string. Numeric keys coming from scripts or storage are
//! canonicalised to their decimal text form at the boundary, so a lookup never
//! has to guess whether `7` and `"7"` refer to the same entry.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Ordered string-keyed map of values.
pub type ValueMap = IndexMap<String, Value>;

/// Typed sum of every value that can cross a component boundary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Builds an empty map value.
    pub fn empty_map() -> Self {
        Value::Map(ValueMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `Null`, empty text (after trimming), and empty lists.
    ///
    /// Used by required-field checks: a whitespace-only entry counts as missing.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Returns an integer view; integral floats are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(number) => Some(*number),
            Value::Float(number) if number.fract() == 0.0 && number.is_finite() => Some(*number as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(number) => Some(*number as f64),
            Value::Float(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Canonical map key for a scalar value.
    ///
    /// Integers and integral floats become their decimal text, text is used
    /// verbatim. Other shapes cannot act as keys.
    pub fn canonical_key(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.clone()),
            Value::Int(number) => Some(number.to_string()),
            Value::Float(_) => self.as_i64().map(|number| number.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            other => write!(f, "{}", JsonValue::from(other.clone())),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        i64::try_from(value).map(Value::Int).unwrap_or(Value::Float(value as f64))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(flag) => Value::Bool(flag),
            JsonValue::Number(number) => number
                .as_i64()
                .map(Value::Int)
                .or_else(|| number.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            JsonValue::String(text) => Value::Text(text),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Map(map.into_iter().map(|(key, item)| (key, Value::from(item))).collect()),
        }
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(flag) => JsonValue::Bool(flag),
            Value::Int(number) => JsonValue::from(number),
            Value::Float(number) => serde_json::Number::from_f64(number)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(text) => JsonValue::String(text),
            Value::List(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            Value::Map(map) => JsonValue::Object(map.into_iter().map(|(key, item)| (key, JsonValue::from(item))).collect()),
        }
    }
}

/// Convenience macro-free builder for small maps in tests and defaults.
pub fn value_map<K, V, I>(entries: I) -> ValueMap
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_untagged_json_shapes() {
        let value: Value = serde_json::from_value(json!({
            "name": "Ann",
            "age": 31,
            "score": 4.5,
            "active": true,
            "tags": ["a", "b"],
            "manager": null
        }))
        .expect("deserialize value");

        assert_eq!(value.get("name"), Some(&Value::Text("Ann".into())));
        assert_eq!(value.get("age"), Some(&Value::Int(31)));
        assert_eq!(value.get("score"), Some(&Value::Float(4.5)));
        assert_eq!(value.get("active"), Some(&Value::Bool(true)));
        assert_eq!(value.get("manager"), Some(&Value::Null));
        assert_eq!(value.get("tags").and_then(Value::as_list).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn preserves_map_insertion_order() {
        let value: Value = serde_yaml::from_str("zeta: 1\nalpha: 2\nmid: 3\n").expect("yaml map");
        let keys: Vec<&str> = value.as_map().expect("map").keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn canonical_key_unifies_numeric_and_text_ids() {
        assert_eq!(Value::Int(7).canonical_key().as_deref(), Some("7"));
        assert_eq!(Value::Float(7.0).canonical_key().as_deref(), Some("7"));
        assert_eq!(Value::Text("7".into()).canonical_key().as_deref(), Some("7"));
        assert_eq!(Value::Float(7.5).canonical_key(), None);
        assert_eq!(Value::Bool(true).canonical_key(), None);
    }

    #[test]
    fn blank_detection_covers_whitespace_text() {
        assert!(Value::Null.is_blank());
        assert!(Value::Text("   ".into()).is_blank());
        assert!(Value::List(Vec::new()).is_blank());
        assert!(!Value::Int(0).is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn json_round_trip_keeps_nested_structure() {
        let original = json!({"items": [{"id": 1}, {"id": 2}], "total": 2});
        let value = Value::from(original.clone());
        assert_eq!(JsonValue::from(value), original);
    }
}
