//! Action dispatch: script functions first, fixed built-ins as fallback.

mod builtin;
mod dispatch;

pub use builtin::BuiltinAction;

use capsule_types::{OperationId, Value};
use indexmap::IndexMap;

use crate::errors::ScriptError;

/// What handled an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionHandler {
    Script { function: String },
    Builtin(BuiltinAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Completed,
    /// Submission blocked; field name to message.
    ValidationFailed { errors: IndexMap<String, String> },
}

/// A workflow transition requested by a script and applied after the drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub workflow_id: String,
    pub step_id: String,
    pub accepted: bool,
}

/// Everything one action did.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,
    pub handler: ActionHandler,
    pub status: ActionStatus,
    /// Return value of the script function, `Null` for built-ins.
    pub result: Value,
    /// Operations drained during this action, in enqueue order.
    pub operations: Vec<OperationId>,
    /// Screen entered as a result of this action.
    pub navigation: Option<String>,
    pub transitions: Vec<TransitionOutcome>,
    /// Failure of the script function that made the built-in run instead.
    pub script_error: Option<ScriptError>,
    /// Save enqueued by the submit built-in.
    pub auto_save: Option<OperationId>,
}

impl ActionOutcome {
    fn new(action: &str, handler: ActionHandler) -> Self {
        Self {
            action: action.to_string(),
            handler,
            status: ActionStatus::Completed,
            result: Value::Null,
            operations: Vec::new(),
            navigation: None,
            transitions: Vec::new(),
            script_error: None,
            auto_save: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ActionStatus::Completed
    }
}
