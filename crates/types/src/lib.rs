//! # Capsule Types
//!
//! Shared data model for the Capsule runtime: the dynamic [`Value`] sum type,
//! entity schemas with field validation, declarative UI nodes and the abstract
//! widget tree, workflow step graphs, rule expressions, and the records that
//! flow through the operation queue.
//!
//! Everything here is plain data. Behavior that needs the embedded engine,
//! storage, or the widget registry lives in the other workspace crates.

pub mod operation;
pub mod rules;
pub mod schema;
pub mod value;
pub mod widget;
pub mod workflow;

pub use operation::{ErrorDescriptor, Operation, OperationId, OperationKind, OperationOutcome, OperationResult};
pub use rules::{Rule, RuleSet};
pub use schema::validation::{coerce_field_value, validate_field_value};
pub use schema::{DEFAULT_PRIMARY_KEY, EntitySchema, FieldType, SchemaBundle, SchemaField};
pub use value::{Value, ValueMap, value_map};
pub use widget::{Capability, DeclarativeNode, UiDefinition, WIDGET_DISCRIMINATOR, WidgetNode};
pub use workflow::{WorkflowBundle, WorkflowDefinition, WorkflowIssue, WorkflowStep};
