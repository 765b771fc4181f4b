//! Declarative UI nodes and the abstract widget tree built from them.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// Property key holding the explicit widget type discriminator.
pub const WIDGET_DISCRIMINATOR: &str = "widget";

/// One node of a UI asset as delivered by the asset loader.
///
/// `children` and `fields` are lifted out of the property bag so the tree
/// builder can choose between them; every other key stays in `properties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeNode {
    /// Explicit widget type. Nodes without it fall back to structural inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeclarativeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<DeclarativeNode>,
    #[serde(flatten)]
    pub properties: ValueMap,
}

impl DeclarativeNode {
    pub fn new(widget: impl Into<String>) -> Self {
        Self {
            widget: Some(widget.into()),
            ..Default::default()
        }
    }

    /// Node without a discriminator, used for compatibility assets.
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<DeclarativeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_fields(mut self, fields: Vec<DeclarativeNode>) -> Self {
        self.fields = fields;
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.get(key).is_some_and(|value| !value.is_null())
    }

    /// Text of a property when present and non-empty.
    pub fn text_property(&self, key: &str) -> Option<&str> {
        self.property(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Visits this node and its descendants depth-first in declaration order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a DeclarativeNode)) {
        visit(self);
        for child in self.children.iter().chain(self.fields.iter()) {
            child.walk(visit);
        }
    }
}

/// Renderer-agnostic widget produced by the widget registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetNode {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: ValueMap,
    /// Render order.
    #[serde(default)]
    pub children: Vec<WidgetNode>,
}

impl WidgetNode {
    pub fn new(type_name: impl Into<String>, properties: ValueMap, children: Vec<WidgetNode>) -> Self {
        Self {
            type_name: type_name.into(),
            properties,
            children,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Visits this widget and its descendants mutably, depth-first.
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut WidgetNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(WidgetNode::node_count).sum::<usize>()
    }
}

/// Device capability a widget builder may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Location,
    Signature,
    Barcode,
    FileAccess,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Camera,
        Capability::Location,
        Capability::Signature,
        Capability::Barcode,
        Capability::FileAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Location => "location",
            Capability::Signature => "signature",
            Capability::Barcode => "barcode",
            Capability::FileAccess => "file_access",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Capability::ALL
            .into_iter()
            .find(|capability| capability.as_str() == normalized)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

/// Parsed UI asset: screens keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiDefinition {
    /// Screen shown when the session starts. Defaults to the first declared screen.
    #[serde(default)]
    pub initial_screen: Option<String>,
    #[serde(default)]
    pub screens: IndexMap<String, DeclarativeNode>,
}

impl UiDefinition {
    pub fn screen(&self, screen_id: &str) -> Option<&DeclarativeNode> {
        self.screens.get(screen_id)
    }

    pub fn initial_screen_id(&self) -> Option<&str> {
        self.initial_screen
            .as_deref()
            .or_else(|| self.screens.keys().next().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_children_and_fields_out_of_properties() {
        let node: DeclarativeNode = serde_yaml::from_str(
            r#"
widget: form
entity: Customer
fields:
  - { field: name, label: Name }
children: []
"#,
        )
        .expect("declarative node");

        assert_eq!(node.widget.as_deref(), Some("form"));
        assert_eq!(node.fields.len(), 1);
        assert!(node.children.is_empty());
        assert_eq!(node.text_property("entity"), Some("Customer"));
        assert!(!node.properties.contains_key("fields"));
        assert!(!node.properties.contains_key("children"));
    }

    #[test]
    fn ui_definition_defaults_to_first_screen() {
        let ui: UiDefinition = serde_yaml::from_str(
            r#"
screens:
  home: { widget: screen, title: Home }
  detail: { widget: screen, title: Detail }
"#,
        )
        .expect("ui definition");

        assert_eq!(ui.initial_screen_id(), Some("home"));
        assert!(ui.screen("detail").is_some());
    }

    #[test]
    fn capability_parses_loose_spellings() {
        assert_eq!("Camera".parse::<Capability>(), Ok(Capability::Camera));
        assert_eq!("file-access".parse::<Capability>(), Ok(Capability::FileAccess));
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn walk_visits_in_declaration_order() {
        let node = DeclarativeNode::new("column").with_children(vec![
            DeclarativeNode::new("text").with_property("id", "a"),
            DeclarativeNode::new("row").with_children(vec![DeclarativeNode::new("text").with_property("id", "b")]),
        ]);

        let mut seen = Vec::new();
        node.walk(&mut |visited| seen.push(visited.widget.clone().unwrap_or_default()));
        assert_eq!(seen, vec!["column", "text", "row", "text"]);
    }
}
