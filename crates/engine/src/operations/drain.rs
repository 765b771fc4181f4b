//! Host-side execution of a pending batch.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use capsule_types::{Operation, OperationKind, OperationResult, Value, ValueMap};
use capsule_util::DrainMode;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::{DrainedBatch, FindAllQuery, PendingBatch, StorageBackend};

/// Message recorded for every operation drained without a backend.
pub const STORAGE_UNAVAILABLE: &str = "storage backend unavailable";

/// Executes every operation of `batch` and captures one result per operation.
///
/// Failures become error results; nothing is retried. In concurrent mode the
/// operations run together but the returned results keep enqueue order.
pub async fn drain_batch(batch: PendingBatch, storage: Option<Arc<dyn StorageBackend>>, mode: DrainMode) -> DrainedBatch {
    let operations = batch.into_operations();
    if operations.is_empty() {
        return DrainedBatch::new(Vec::new());
    }

    let Some(storage) = storage else {
        warn!(operations = operations.len(), "draining without a storage backend");
        return DrainedBatch::new(
            operations
                .iter()
                .map(|operation| OperationResult::failure(operation.id, STORAGE_UNAVAILABLE))
                .collect(),
        );
    };

    debug!(operations = operations.len(), mode = ?mode, "draining operation batch");
    let results = match mode {
        DrainMode::Sequential => {
            let mut results = Vec::with_capacity(operations.len());
            for operation in &operations {
                results.push(execute_operation(storage.as_ref(), operation).await);
            }
            results
        }
        DrainMode::Concurrent => {
            join_all(
                operations
                    .iter()
                    .map(|operation| execute_operation(storage.as_ref(), operation)),
            )
            .await
        }
    };
    DrainedBatch::new(results)
}

async fn execute_operation(storage: &dyn StorageBackend, operation: &Operation) -> OperationResult {
    match perform(storage, operation).await {
        Ok(value) => OperationResult::success(operation.id, value),
        Err(error) => {
            let message = format!("{error:#}");
            warn!(
                operation_id = operation.id.0,
                kind = operation.kind.as_str(),
                error = %message,
                "storage operation failed"
            );
            OperationResult::failure(operation.id, message)
        }
    }
}

async fn perform(storage: &dyn StorageBackend, operation: &Operation) -> Result<Value> {
    match operation.kind {
        OperationKind::RawExec => {
            let (sql, params) = raw_arguments(operation)?;
            storage.execute_raw(sql, &params).await
        }
        OperationKind::RawQuery => {
            let (sql, params) = raw_arguments(operation)?;
            storage.query(sql, &params).await.map(Value::List)
        }
        OperationKind::Save => {
            let entity = entity_name(operation)?;
            storage.save(entity, record_data(operation)?).await
        }
        OperationKind::FindById => {
            let entity = entity_name(operation)?;
            storage.find_by_id(entity, record_id(operation)?).await
        }
        OperationKind::FindAll => {
            let entity = entity_name(operation)?;
            let query = FindAllQuery::from_payload(&operation.payload);
            storage.find_all(entity, &query).await.map(Value::List)
        }
        OperationKind::Update => {
            let entity = entity_name(operation)?;
            storage.update(entity, record_id(operation)?, record_data(operation)?).await
        }
        OperationKind::Delete => {
            let entity = entity_name(operation)?;
            storage.delete(entity, record_id(operation)?).await
        }
    }
}

fn entity_name(operation: &Operation) -> Result<&str> {
    operation
        .entity
        .as_deref()
        .filter(|entity| !entity.trim().is_empty())
        .with_context(|| format!("{} operation requires an entity name", operation.kind.as_str()))
}

fn record_id(operation: &Operation) -> Result<&Value> {
    operation
        .payload_field("id")
        .filter(|id| !id.is_null())
        .with_context(|| format!("{} operation requires a record id", operation.kind.as_str()))
}

fn record_data(operation: &Operation) -> Result<ValueMap> {
    match operation.payload_field("data") {
        Some(Value::Map(data)) => Ok(data.clone()),
        Some(other) => Err(anyhow!(
            "{} operation expects a map of field values, got {}",
            operation.kind.as_str(),
            other.type_name()
        )),
        None => Ok(ValueMap::new()),
    }
}

fn raw_arguments(operation: &Operation) -> Result<(&str, Vec<Value>)> {
    let sql = operation
        .payload_field("sql")
        .and_then(Value::as_str)
        .context("raw statement requires SQL text")?;
    let params = operation
        .payload_field("params")
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    Ok((sql, params))
}
