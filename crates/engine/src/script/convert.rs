//! Conversion between [`Value`] and the engine's `Dynamic`.
//!
//! All map keys become strings on the way in and on the way out. Values the
//! typed model cannot represent (function pointers, custom types) are carried
//! across as their display text.

use capsule_types::{Value, ValueMap};
use rhai::{Array, Dynamic, Map};

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(flag) => Dynamic::from(*flag),
        Value::Int(number) => Dynamic::from(*number),
        Value::Float(number) => Dynamic::from(*number),
        Value::Text(text) => Dynamic::from(text.clone()),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect::<Array>()),
        Value::Map(map) => Dynamic::from_map(map_to_dynamic(map)),
    }
}

pub fn map_to_dynamic(map: &ValueMap) -> Map {
    map.iter()
        .map(|(key, item)| (key.as_str().into(), to_dynamic(item)))
        .collect()
}

pub fn from_dynamic(value: &Dynamic) -> Value {
    let value = value.flatten_clone();
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(flag) = value.as_bool() {
        return Value::Bool(flag);
    }
    if let Ok(number) = value.as_int() {
        return Value::Int(number);
    }
    if let Ok(number) = value.as_float() {
        return Value::Float(number);
    }
    if let Ok(character) = value.as_char() {
        return Value::Text(character.to_string());
    }
    if value.is_string() {
        return match value.into_string() {
            Ok(text) => Value::Text(text),
            Err(type_name) => Value::Text(type_name.to_string()),
        };
    }
    if value.is_array() {
        return match value.try_cast::<Array>() {
            Some(items) => Value::List(items.iter().map(from_dynamic).collect()),
            None => Value::List(Vec::new()),
        };
    }
    if value.is_map() {
        return match value.try_cast::<Map>() {
            Some(map) => Value::Map(
                map.iter()
                    .map(|(key, item)| (key.to_string(), from_dynamic(item)))
                    .collect(),
            ),
            None => Value::empty_map(),
        };
    }
    Value::Text(value.to_string())
}

/// Canonical result-store key for an id passed from script (integer or text).
pub fn operation_key(id: &Dynamic) -> Option<String> {
    from_dynamic(id).canonical_key().map(|key| key.trim().to_string())
}
