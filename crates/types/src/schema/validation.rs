//! Field-level validation shared by form state and submission.
//!
//! The checks mirror what inline error display expects:
//! - Required fields reject blank values; optional blank values always pass.
//! - The stored value must be coercible to the declared field type.
//! - Length and pattern constraints apply to text, bounds to numbers.
//! - `options` restricts any type to an allowed set.

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use super::{FieldType, SchemaField};
use crate::value::Value;

/// Validate a raw value against a declared field.
///
/// Returns the user-facing message for the first failing rule.
pub fn validate_field_value(field: &SchemaField, value: Option<&Value>) -> Result<(), String> {
    let value = match value {
        Some(value) if !value.is_blank() => value,
        _ => {
            return if field.required {
                Err(format!("{} is required", display_name(field)))
            } else {
                Ok(())
            };
        }
    };

    let coerced = coerce_field_value(field.field_type, value)
        .ok_or_else(|| format!("{} must be a valid {}", display_name(field), field.field_type.as_str()))?;

    if let Some(Value::List(options)) = field.constraint("options")
        && !options.iter().any(|option| option == &coerced || option == value)
    {
        return Err(format!("{} is not one of the allowed values", display_name(field)));
    }

    match (&field.field_type, &coerced) {
        (FieldType::Text, Value::Text(text)) => validate_text(field, text),
        (FieldType::Integer | FieldType::Decimal, number) => validate_bounds(field, number),
        _ => Ok(()),
    }
}

/// Coerce a raw value into the canonical representation for `field_type`.
///
/// Returns `None` when the value cannot represent the type. Text input
/// widgets deliver strings, so numeric, boolean, and date parsing from text is
/// accepted.
pub fn coerce_field_value(field_type: FieldType, value: &Value) -> Option<Value> {
    match field_type {
        FieldType::Text => match value {
            Value::Text(_) => Some(value.clone()),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Some(Value::Text(value.to_string())),
            _ => None,
        },
        FieldType::Integer => match value {
            Value::Int(_) => Some(value.clone()),
            Value::Float(_) => value.as_i64().map(Value::Int),
            Value::Text(text) => text.trim().parse::<i64>().ok().map(Value::Int),
            _ => None,
        },
        FieldType::Decimal => match value {
            Value::Int(number) => Some(Value::Float(*number as f64)),
            Value::Float(_) => Some(value.clone()),
            Value::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(Value::Float),
            _ => None,
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::Int(0) => Some(Value::Bool(false)),
            Value::Int(1) => Some(Value::Bool(true)),
            Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        FieldType::Date => match value {
            Value::Text(text) if is_date_text(text.trim()) => Some(Value::Text(text.trim().to_string())),
            _ => None,
        },
    }
}

fn is_date_text(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(text).is_ok()
}

fn validate_text(field: &SchemaField, text: &str) -> Result<(), String> {
    let length = text.chars().count();
    if let Some(min_length) = field.constraint("minLength").and_then(Value::as_i64)
        && (length as i64) < min_length
    {
        return Err(format!("{} must be at least {} characters", display_name(field), min_length));
    }

    if let Some(max_length) = field.constraint("maxLength").and_then(Value::as_i64)
        && (length as i64) > max_length
    {
        return Err(format!("{} must be at most {} characters", display_name(field), max_length));
    }

    if let Some(pattern) = field.constraint("pattern").and_then(Value::as_str) {
        let regex = Regex::new(pattern).map_err(|error| format!("invalid pattern '{}': {}", pattern, error))?;
        if !regex.is_match(text) {
            return Err(format!("{} must match the pattern {}", display_name(field), pattern));
        }
    }
    Ok(())
}

fn validate_bounds(field: &SchemaField, number: &Value) -> Result<(), String> {
    let Some(number) = number.as_f64() else {
        return Ok(());
    };

    if let Some(minimum) = field.constraint("min").and_then(Value::as_f64)
        && number < minimum
    {
        return Err(format!("{} must be at least {}", display_name(field), minimum));
    }

    if let Some(maximum) = field.constraint("max").and_then(Value::as_f64)
        && number > maximum
    {
        return Err(format!("{} must be at most {}", display_name(field), maximum));
    }
    Ok(())
}

fn display_name(field: &SchemaField) -> &str {
    field
        .label
        .as_deref()
        .filter(|label| !label.trim().is_empty())
        .unwrap_or(&field.name)
}
