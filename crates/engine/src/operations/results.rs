//! Completed operation results keyed by the string form of their id.

use std::collections::HashMap;

use capsule_types::{OperationId, OperationResult};

/// Results of one fully executed batch, in enqueue order.
///
/// Only the drain step constructs this type, so results can never be
/// committed for a batch that did not run.
#[derive(Debug)]
pub struct DrainedBatch {
    results: Vec<OperationResult>,
}

impl DrainedBatch {
    pub(crate) fn new(results: Vec<OperationResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[OperationResult] {
        &self.results
    }

    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.results.iter().map(|result| result.operation_id).collect()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_error()).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    results: HashMap<String, OperationResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every result of `batch` and returns their ids.
    pub fn commit(&mut self, batch: DrainedBatch) -> Vec<OperationId> {
        let ids = batch.operation_ids();
        for result in batch.results {
            self.results.insert(result.operation_id.key(), result);
        }
        ids
    }

    pub fn get(&self, key: &str) -> Option<&OperationResult> {
        self.results.get(key)
    }

    pub fn get_by_id(&self, id: OperationId) -> Option<&OperationResult> {
        self.results.get(&id.key())
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
