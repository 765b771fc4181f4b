//! Queued storage operations and their recorded results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// Session-scoped, strictly increasing operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    /// Result-store key: the decimal string form of the id.
    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    RawExec,
    RawQuery,
    Save,
    FindById,
    FindAll,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::RawExec => "rawExec",
            OperationKind::RawQuery => "rawQuery",
            OperationKind::Save => "save",
            OperationKind::FindById => "findById",
            OperationKind::FindAll => "findAll",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// A storage request captured from a script call. Never mutated after creation.
///
/// Payload shapes by kind:
/// - `Save`: `{data}`
/// - `FindById` / `Delete`: `{id}`
/// - `Update`: `{id, data}`
/// - `FindAll`: `{where, orderBy, limit}`
/// - `RawExec` / `RawQuery`: `{sql, params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl Operation {
    pub fn new(id: OperationId, kind: OperationKind, entity: Option<String>, payload: Value) -> Self {
        Self {
            id,
            kind,
            entity,
            payload,
        }
    }

    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Captured failure of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Value(Value),
    Error(ErrorDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation_id: OperationId,
    pub outcome: OperationOutcome,
    pub completed_at: DateTime<Utc>,
}

impl OperationResult {
    pub fn success(operation_id: OperationId, value: Value) -> Self {
        Self {
            operation_id,
            outcome: OperationOutcome::Value(value),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(operation_id: OperationId, message: impl Into<String>) -> Self {
        Self {
            operation_id,
            outcome: OperationOutcome::Error(ErrorDescriptor::new(message)),
            completed_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, OperationOutcome::Error(_))
    }

    /// Shape handed to scripts: the value itself, or `{error: message}`.
    pub fn to_script_value(&self) -> Value {
        match &self.outcome {
            OperationOutcome::Value(value) => value.clone(),
            OperationOutcome::Error(error) => {
                let mut map = ValueMap::new();
                map.insert("error".to_string(), Value::Text(error.message.clone()));
                Value::Map(map)
            }
        }
    }
}
