//! Operation queue, drain step, and result store.
//!
//! Scripts cannot suspend, so storage verbs only enqueue and return an id.
//! The host drains the queue after the script returns and commits the
//! results, which scripts read in a later call:
//!
//! `OperationQueue::take_batch` -> [`PendingBatch`] -> [`drain_batch`] ->
//! [`DrainedBatch`] -> `ResultStore::commit`.

mod drain;
mod queue;
mod results;
mod storage;

pub use drain::{STORAGE_UNAVAILABLE, drain_batch};
pub use queue::{OperationQueue, PendingBatch};
pub use results::{DrainedBatch, ResultStore};
pub use storage::{FindAllQuery, InMemoryStorage, StorageBackend};
