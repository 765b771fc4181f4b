//! Allow-list of widget builders.
//!
//! The registry is the only way a declarative asset or a script can turn a
//! type name into a renderable node: names that were never registered are
//! rejected with [`BuildError::UnknownWidgetType`]. Device widgets are
//! registered through [`WidgetRegistry::register_gated`] and only exist when
//! the matching [`Capability`] was granted at construction.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use capsule_types::{Capability, ValueMap, WidgetNode};
use tracing::debug;

use crate::{builtin, error::BuildError};

/// Turns a type name, its properties, and already-built children into a node.
pub type WidgetBuilder = Arc<dyn Fn(&str, ValueMap, Vec<WidgetNode>) -> WidgetNode + Send + Sync>;

#[derive(Clone, Default)]
pub struct WidgetRegistry {
    builders: HashMap<String, WidgetBuilder>,
    capabilities: HashSet<Capability>,
}

impl fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetRegistry")
            .field("type_names", &self.type_names())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl WidgetRegistry {
    /// Empty registry with no capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            builders: HashMap::new(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Standard widget set plus every device widget allowed by `capabilities`.
    pub fn standard(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut registry = Self::with_capabilities(capabilities);
        builtin::register_standard(&mut registry);
        registry
    }

    /// Registers `builder` under `type_name`. The last registration wins.
    pub fn register<F>(&mut self, type_name: impl Into<String>, builder: F)
    where
        F: Fn(&str, ValueMap, Vec<WidgetNode>) -> WidgetNode + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.builders.insert(type_name.clone(), Arc::new(builder)).is_some() {
            debug!(widget = %type_name, "replaced widget builder");
        }
    }

    /// Registers `builder` only when `capability` was granted.
    ///
    /// Returns whether the builder was registered.
    pub fn register_gated<F>(&mut self, type_name: impl Into<String>, capability: Capability, builder: F) -> bool
    where
        F: Fn(&str, ValueMap, Vec<WidgetNode>) -> WidgetNode + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if !self.capabilities.contains(&capability) {
            debug!(widget = %type_name, capability = %capability, "capability not granted; widget unavailable");
            return false;
        }
        self.register(type_name, builder);
        true
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.builders.contains_key(type_name)
    }

    /// Registered names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn build(&self, type_name: &str, properties: ValueMap, children: Vec<WidgetNode>) -> Result<WidgetNode, BuildError> {
        let builder = self
            .builders
            .get(type_name)
            .ok_or_else(|| BuildError::unknown_widget(type_name))?;
        Ok(builder(type_name, properties, children))
    }
}
