//! Storage seam behind the script storage verbs.
//!
//! Host callables never touch storage directly. The drain step hands each
//! queued operation to a [`StorageBackend`], whose futures are awaited on the
//! host side only.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use capsule_types::{DEFAULT_PRIMARY_KEY, SchemaBundle, Value, ValueMap};
use tokio::sync::Mutex;
use tracing::debug;

/// Filters, ordering, and limit of a `findAll` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAllQuery {
    /// Exact-match field filters.
    pub filter: ValueMap,
    /// `"field"` or `"field desc"`.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl FindAllQuery {
    /// Reads `where`, `orderBy`, and `limit` from an operation payload.
    pub fn from_payload(payload: &Value) -> Self {
        let filter = payload.get("where").and_then(Value::as_map).cloned().unwrap_or_default();
        let order_by = payload
            .get("orderBy")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|order| !order.is_empty())
            .map(str::to_string);
        let limit = payload
            .get("limit")
            .and_then(Value::as_i64)
            .filter(|limit| *limit >= 0)
            .map(|limit| limit as usize);
        Self { filter, order_by, limit }
    }

    /// Splits `order_by` into the field name and whether it sorts descending.
    pub fn ordering(&self) -> Option<(&str, bool)> {
        let order_by = self.order_by.as_deref()?;
        let mut parts = order_by.split_whitespace();
        let field = parts.next()?;
        let descending = parts.next().is_some_and(|direction| direction.eq_ignore_ascii_case("desc"));
        Some((field, descending))
    }
}

/// Local relational storage consumed by the drain step.
///
/// Single-row verbs return one value map (`Null` when nothing matched);
/// `find_all` and `query` always return a list.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn save(&self, entity: &str, data: ValueMap) -> Result<Value>;
    async fn find_by_id(&self, entity: &str, id: &Value) -> Result<Value>;
    async fn find_all(&self, entity: &str, query: &FindAllQuery) -> Result<Vec<Value>>;
    async fn update(&self, entity: &str, id: &Value, data: ValueMap) -> Result<Value>;
    async fn delete(&self, entity: &str, id: &Value) -> Result<Value>;
    async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<Value>;
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>>;
}

#[derive(Debug, Default)]
struct EntityTable {
    next_id: i64,
    rows: Vec<(String, ValueMap)>,
}

impl EntityTable {
    fn position(&self, key: &str) -> Option<usize> {
        self.rows.iter().position(|(row_key, _)| row_key == key)
    }
}

/// In-process backend for previews and tests.
///
/// Tables are created on first write. Integer ids are assigned from 1 under
/// the entity's primary key unless the saved record already carries one.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    schema: Option<Arc<SchemaBundle>>,
    tables: Mutex<HashMap<String, EntityTable>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `schema` for primary keys and rejects entities it does not declare.
    pub fn with_schema(schema: Arc<SchemaBundle>) -> Self {
        Self {
            schema: Some(schema),
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn primary_key(&self, entity: &str) -> Result<String> {
        let Some(schema) = &self.schema else {
            return Ok(DEFAULT_PRIMARY_KEY.to_string());
        };
        schema
            .entity(entity)
            .map(|entity| entity.primary_key().to_string())
            .ok_or_else(|| anyhow!("unknown entity '{}'", entity))
    }

    /// Number of stored rows for `entity`.
    pub async fn row_count(&self, entity: &str) -> usize {
        self.tables.lock().await.get(entity).map_or(0, |table| table.rows.len())
    }
}

fn row_key(id: &Value) -> Result<String> {
    id.canonical_key()
        .ok_or_else(|| anyhow!("record id must be an integer or text, got {}", id.type_name()))
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn save(&self, entity: &str, mut data: ValueMap) -> Result<Value> {
        let primary_key = self.primary_key(entity)?;
        let mut tables = self.tables.lock().await;
        let table = tables.entry(entity.to_string()).or_default();

        let key = match data.get(&primary_key).filter(|id| !id.is_null()) {
            Some(id) => {
                let key = row_key(id)?;
                if let Some(number) = id.as_i64() {
                    table.next_id = table.next_id.max(number);
                }
                key
            }
            None => {
                table.next_id += 1;
                data.insert(primary_key.clone(), Value::Int(table.next_id));
                table.next_id.to_string()
            }
        };

        match table.position(&key) {
            Some(index) => table.rows[index].1 = data.clone(),
            None => table.rows.push((key.clone(), data.clone())),
        }
        debug!(entity, id = %key, "saved record");
        Ok(Value::Map(data))
    }

    async fn find_by_id(&self, entity: &str, id: &Value) -> Result<Value> {
        self.primary_key(entity)?;
        let key = row_key(id)?;
        let tables = self.tables.lock().await;
        Ok(tables
            .get(entity)
            .and_then(|table| table.position(&key).map(|index| Value::Map(table.rows[index].1.clone())))
            .unwrap_or(Value::Null))
    }

    async fn find_all(&self, entity: &str, query: &FindAllQuery) -> Result<Vec<Value>> {
        self.primary_key(entity)?;
        let tables = self.tables.lock().await;
        let Some(table) = tables.get(entity) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&ValueMap> = table
            .rows
            .iter()
            .map(|(_, row)| row)
            .filter(|row| query.filter.iter().all(|(field, expected)| row.get(field) == Some(expected)))
            .collect();

        if let Some((field, descending)) = query.ordering() {
            rows.sort_by(|left, right| {
                let ordering = compare_values(left.get(field), right.get(field));
                if descending { ordering.reverse() } else { ordering }
            });
        }

        Ok(rows
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| Value::Map(row.clone()))
            .collect())
    }

    async fn update(&self, entity: &str, id: &Value, data: ValueMap) -> Result<Value> {
        let primary_key = self.primary_key(entity)?;
        let key = row_key(id)?;
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(entity) else {
            bail!("{} {} not found", entity, key);
        };
        let Some(index) = table.position(&key) else {
            bail!("{} {} not found", entity, key);
        };

        let row = &mut table.rows[index].1;
        for (field, value) in data {
            if field != primary_key {
                row.insert(field, value);
            }
        }
        Ok(Value::Map(row.clone()))
    }

    async fn delete(&self, entity: &str, id: &Value) -> Result<Value> {
        self.primary_key(entity)?;
        let key = row_key(id)?;
        let mut tables = self.tables.lock().await;
        let removed = tables
            .get_mut(entity)
            .and_then(|table| table.position(&key).map(|index| table.rows.remove(index)))
            .is_some();
        Ok(Value::Bool(removed))
    }

    async fn execute_raw(&self, _sql: &str, _params: &[Value]) -> Result<Value> {
        bail!("raw SQL is not supported by the in-memory storage backend")
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Value>> {
        bail!("raw SQL is not supported by the in-memory storage backend")
    }
}

/// Orders values for `orderBy`: nulls first, then numbers, then text, then the rest.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Int(_) | Value::Float(_)) => 2,
            Some(Value::Text(_)) => 3,
            Some(_) => 4,
        }
    }

    match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Text(a)), Some(Value::Text(b))) => a.cmp(b),
        (Some(a), Some(b)) if rank(left) == 2 && rank(right) == 2 => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        _ => rank(left).cmp(&rank(right)),
    }
}
