mod engine;

pub use engine::{TransitionEvent, TransitionRejection, WorkflowEngine};
