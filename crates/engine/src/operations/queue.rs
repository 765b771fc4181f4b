//! Append-only queue of storage operations awaiting the next drain.

use std::mem;

use capsule_types::{Operation, OperationId, OperationKind, Value};
use tracing::trace;

#[derive(Debug, Default)]
pub struct OperationQueue {
    next_id: u64,
    pending: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an operation and returns its id. Ids are never reused.
    pub fn enqueue(&mut self, kind: OperationKind, entity: Option<String>, payload: Value) -> OperationId {
        let id = OperationId(self.next_id);
        self.next_id += 1;
        trace!(operation_id = id.0, kind = kind.as_str(), entity = ?entity, "enqueued operation");
        self.pending.push(Operation::new(id, kind, entity, payload));
        id
    }

    /// Operations waiting for the next drain, in enqueue order.
    pub fn pending(&self) -> &[Operation] {
        &self.pending
    }

    /// Number of operations waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Id the next enqueue will receive.
    pub fn peek_next_id(&self) -> OperationId {
        OperationId(self.next_id)
    }

    /// Moves every pending operation into a batch, leaving the queue empty.
    pub fn take_batch(&mut self) -> PendingBatch {
        PendingBatch {
            operations: mem::take(&mut self.pending),
        }
    }
}

/// Operations taken from the queue that have not been executed yet.
///
/// A pending batch exposes no results; the only way forward is
/// [`drain_batch`](super::drain_batch), which yields a
/// [`DrainedBatch`](super::DrainedBatch).
#[derive(Debug, Default)]
#[must_use = "a pending batch must be drained"]
pub struct PendingBatch {
    operations: Vec<Operation>,
}

impl PendingBatch {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn ids(&self) -> Vec<OperationId> {
        self.operations.iter().map(|operation| operation.id).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_across_batches() {
        let mut queue = OperationQueue::new();
        let first = queue.enqueue(OperationKind::Save, Some("Customer".into()), Value::Null);
        let second = queue.enqueue(OperationKind::FindAll, Some("Customer".into()), Value::Null);
        assert_eq!((first, second), (OperationId(0), OperationId(1)));

        let batch = queue.take_batch();
        assert_eq!(batch.ids(), vec![OperationId(0), OperationId(1)]);
        assert!(queue.is_empty());

        let third = queue.enqueue(OperationKind::Delete, Some("Customer".into()), Value::Null);
        assert_eq!(third, OperationId(2));
        assert_eq!(queue.peek_next_id(), OperationId(3));
    }

    #[test]
    fn batch_preserves_enqueue_order() {
        let mut queue = OperationQueue::new();
        for kind in [OperationKind::Save, OperationKind::Update, OperationKind::Delete] {
            queue.enqueue(kind, Some("Order".into()), Value::Null);
        }
        let kinds: Vec<OperationKind> = queue.take_batch().operations().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Save, OperationKind::Update, OperationKind::Delete]);
    }
}
