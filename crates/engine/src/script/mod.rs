//! Embedded script engine and its host surface.

mod bridge;
mod convert;
mod host;

pub use bridge::ScriptBridge;
pub use convert::{from_dynamic, to_dynamic};
pub use host::{HostState, SharedHost};
