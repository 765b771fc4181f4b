//! # Capsule Engine
//!
//! The script-driven action runtime. A [`Session`] ties together one embedded
//! script engine, the operation queue and result store, the workflow state
//! machine, and the active form.
//!
//! ## Key Features
//!
//! - **Script Bridge**: a single `rhai` engine per session with storage verbs,
//!   navigation, and levelled logging exposed as host functions
//! - **Two-phase storage**: storage verbs enqueue and return an id; the
//!   dispatcher drains the queue after the script returns; later calls read
//!   results with `getResult`
//! - **Action Dispatch**: script functions first, `navigate_*`/`submit`/`cancel`
//!   built-ins as fallback
//! - **Forms and Rules**: reactive per-form validation and fail-open
//!   visibility expressions
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use capsule_engine::{InMemoryStorage, Session, SessionOptions};
//! use capsule_registry::WidgetRegistry;
//! use capsule_types::{DeclarativeNode, SchemaBundle, UiDefinition, ValueMap};
//! use capsule_util::{AssetBundle, ScriptSource};
//!
//! # tokio::runtime::Builder::new_current_thread().build()?.block_on(async {
//! let mut ui = UiDefinition::default();
//! ui.screens.insert("home".into(), DeclarativeNode::new("screen"));
//! let assets = AssetBundle::new(SchemaBundle::default(), ui).with_script(ScriptSource::new(
//!     "actions.rhai",
//!     r#"fn remember(context) { save("Note", #{ text: "hi" }) }"#,
//! ));
//!
//! let mut session = Session::bootstrap(assets, Arc::new(WidgetRegistry::standard([])), SessionOptions::default())?;
//! session.attach_storage(Arc::new(InMemoryStorage::new()));
//!
//! let outcome = session.execute_action("remember", ValueMap::new()).await?;
//! assert_eq!(outcome.operations.len(), 1);
//! assert!(session.operation_result(outcome.operations[0]).is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actions;
pub mod errors;
pub mod forms;
pub mod operations;
pub mod script;
pub mod session;
pub mod workflow;

pub use actions::{ActionHandler, ActionOutcome, ActionStatus, BuiltinAction, TransitionOutcome};
pub use errors::{RuntimeError, ScriptError};
pub use forms::{FormChange, FormState, RuleOutcome, RuleReport, SubscriptionId};
pub use operations::{
    DrainedBatch, FindAllQuery, InMemoryStorage, OperationQueue, PendingBatch, ResultStore, STORAGE_UNAVAILABLE,
    StorageBackend, drain_batch,
};
pub use script::{HostState, ScriptBridge, SharedHost};
pub use session::{Session, SessionOptions};
pub use workflow::{TransitionEvent, TransitionRejection, WorkflowEngine};
