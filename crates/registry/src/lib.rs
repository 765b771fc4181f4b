//! # Capsule Registry
//!
//! The widget allow-list and the builder that turns declarative UI nodes into
//! renderer-agnostic [`WidgetNode`] trees.
//!
//! ```rust
//! use capsule_registry::{WidgetRegistry, WidgetTreeBuilder};
//! use capsule_types::DeclarativeNode;
//!
//! let registry = WidgetRegistry::standard([]);
//! let screen = DeclarativeNode::new("screen")
//!     .with_property("title", "Home")
//!     .with_children(vec![DeclarativeNode::new("text").with_property("text", "Welcome")]);
//!
//! let tree = WidgetTreeBuilder::new(&registry).build(&screen);
//! assert!(tree.is_complete());
//! ```

pub mod builtin;
pub mod error;
pub mod tree;
pub mod widgets;

pub use builtin::ERROR_PLACEHOLDER;
pub use capsule_types::{Capability, WidgetNode};
pub use error::BuildError;
pub use tree::{BuiltTree, FailurePolicy, NodeFailure, TypeResolution, WidgetTreeBuilder, resolve_type_name};
pub use widgets::{WidgetBuilder, WidgetRegistry};
