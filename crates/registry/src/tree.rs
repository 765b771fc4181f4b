//! Declarative node to widget tree conversion.
//!
//! Type resolution uses the `widget` discriminator. Nodes without one go
//! through structural inference, a deprecated compatibility path that logs a
//! warning every time it is taken. Children come from `children`, else from
//! `fields`, else (for forms bound to a known entity) from the schema.
//!
//! A failing node never aborts the whole tree: depending on the
//! [`FailurePolicy`] it is replaced by an `error_placeholder` node or dropped,
//! and the failure is reported with its path.

use capsule_types::{
    DeclarativeNode, EntitySchema, SchemaBundle, SchemaField, Value, ValueMap, WIDGET_DISCRIMINATOR, WidgetNode,
};
use heck::ToTitleCase;
use tracing::{debug, warn};

use crate::{
    builtin::{ERROR_PLACEHOLDER, input_widget_for_field, input_widget_for_hint},
    error::BuildError,
    widgets::WidgetRegistry,
};

/// What happens to a subtree that fails to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Substitute an `error_placeholder` node.
    #[default]
    Placeholder,
    /// Drop the subtree.
    SkipSubtree,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub path: String,
    pub error: BuildError,
}

/// Outcome of building one tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuiltTree {
    /// `None` only when the root itself was skipped.
    pub root: Option<WidgetNode>,
    pub failures: Vec<NodeFailure>,
}

impl BuiltTree {
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.failures.is_empty()
    }
}

/// How a node's type name was determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeResolution {
    Explicit(String),
    Inferred(&'static str),
}

impl TypeResolution {
    pub fn type_name(&self) -> &str {
        match self {
            TypeResolution::Explicit(name) => name,
            TypeResolution::Inferred(name) => name,
        }
    }
}

/// Resolves the widget type of `node`.
///
/// Inference order: `entity` (form), `field` + `label` (input refined by
/// `type`), `label` + `action` (button), `id` or `title` (screen).
pub fn resolve_type_name(node: &DeclarativeNode) -> Option<TypeResolution> {
    if let Some(explicit) = node.widget.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        return Some(TypeResolution::Explicit(explicit.to_string()));
    }

    let inferred = if node.has_property("entity") {
        "form"
    } else if node.has_property("field") && node.has_property("label") {
        input_widget_for_hint(node.text_property("type"))
    } else if node.has_property("label") && node.has_property("action") {
        "button"
    } else if node.has_property("id") || node.has_property("title") {
        "screen"
    } else {
        return None;
    };
    Some(TypeResolution::Inferred(inferred))
}

/// Builds widget trees against one registry and, optionally, one schema.
#[derive(Debug, Clone, Copy)]
pub struct WidgetTreeBuilder<'a> {
    registry: &'a WidgetRegistry,
    schema: Option<&'a SchemaBundle>,
    policy: FailurePolicy,
}

impl<'a> WidgetTreeBuilder<'a> {
    pub fn new(registry: &'a WidgetRegistry) -> Self {
        Self {
            registry,
            schema: None,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_schema(mut self, schema: &'a SchemaBundle) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(&self, node: &DeclarativeNode) -> BuiltTree {
        self.build_at(node, "$")
    }

    /// Builds with `root_path` as the prefix of every reported node path.
    pub fn build_at(&self, node: &DeclarativeNode, root_path: &str) -> BuiltTree {
        let mut failures = Vec::new();
        let root = self.build_node(node, root_path, None, &mut failures);
        if !failures.is_empty() {
            debug!(root = root_path, failures = failures.len(), "widget tree built with failures");
        }
        BuiltTree { root, failures }
    }

    /// Builds without substitution, failing on the first broken node.
    pub fn build_strict(&self, node: &DeclarativeNode) -> Result<WidgetNode, BuildError> {
        let tree = self.build(node);
        if let Some(failure) = tree.failures.into_iter().next() {
            return Err(failure.error);
        }
        tree.root.ok_or_else(|| BuildError::malformed("$", "root produced no widget"))
    }

    fn build_node(
        &self,
        node: &DeclarativeNode,
        path: &str,
        entity: Option<&'a EntitySchema>,
        failures: &mut Vec<NodeFailure>,
    ) -> Option<WidgetNode> {
        let Some(resolution) = resolve_type_name(node) else {
            let error = BuildError::malformed(path, "no widget discriminator and no structural match");
            return self.fail(path, error, failures);
        };
        if let TypeResolution::Inferred(type_name) = resolution {
            warn!(
                path,
                inferred = type_name,
                "node has no '{}' discriminator; using deprecated structural inference",
                WIDGET_DISCRIMINATOR
            );
        }
        let type_name = resolution.type_name();

        let bound_entity = self.bound_entity(node).or(entity);
        let mut properties = node.properties.clone();
        if let Some(entity) = entity {
            annotate_from_schema(&mut properties, entity);
        }

        let children = self.build_children(node, type_name, path, bound_entity, failures);
        match self.registry.build(type_name, properties, children) {
            Ok(widget) => Some(widget),
            Err(error) => self.fail(path, error, failures),
        }
    }

    fn build_children(
        &self,
        node: &DeclarativeNode,
        type_name: &str,
        path: &str,
        entity: Option<&'a EntitySchema>,
        failures: &mut Vec<NodeFailure>,
    ) -> Vec<WidgetNode> {
        let (list_name, sources) = if !node.children.is_empty() {
            ("children", node.children.clone())
        } else if !node.fields.is_empty() {
            ("fields", node.fields.clone())
        } else if type_name == "form"
            && let Some(entity) = entity
        {
            ("schema", schema_field_nodes(entity))
        } else {
            return Vec::new();
        };

        sources
            .iter()
            .enumerate()
            .filter_map(|(index, child)| {
                let child_path = format!("{}.{}[{}]", path, list_name, index);
                self.build_node(child, &child_path, entity, failures)
            })
            .collect()
    }

    fn bound_entity(&self, node: &DeclarativeNode) -> Option<&'a EntitySchema> {
        let schema = self.schema?;
        let entity_name = node.text_property("entity")?;
        schema.find_entity_ignore_case(entity_name)
    }

    fn fail(&self, path: &str, error: BuildError, failures: &mut Vec<NodeFailure>) -> Option<WidgetNode> {
        warn!(path, error = %error, "widget node failed to build");
        failures.push(NodeFailure {
            path: path.to_string(),
            error: error.clone(),
        });

        match self.policy {
            FailurePolicy::SkipSubtree => None,
            FailurePolicy::Placeholder => {
                let mut properties = ValueMap::new();
                properties.insert("message".to_string(), Value::from(error.to_string()));
                properties.insert("path".to_string(), Value::from(path));
                Some(
                    self.registry
                        .build(ERROR_PLACEHOLDER, properties.clone(), Vec::new())
                        .unwrap_or_else(|_| WidgetNode::new(ERROR_PLACEHOLDER, properties, Vec::new())),
                )
            }
        }
    }
}

/// Fills `label` and `required` on input nodes bound to a schema field.
fn annotate_from_schema(properties: &mut ValueMap, entity: &EntitySchema) {
    let Some(field) = properties
        .get("field")
        .and_then(Value::as_str)
        .and_then(|name| entity.field(name))
    else {
        return;
    };

    if !properties.contains_key("label") {
        properties.insert("label".to_string(), Value::from(field_label(field)));
    }
    if !properties.contains_key("required") {
        properties.insert("required".to_string(), Value::Bool(field.required));
    }
}

fn field_label(field: &SchemaField) -> String {
    field
        .label
        .clone()
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| field.name.to_title_case())
}

/// One input node per schema field, in declaration order.
fn schema_field_nodes(entity: &EntitySchema) -> Vec<DeclarativeNode> {
    entity
        .fields
        .values()
        .filter(|field| field.name != entity.primary_key())
        .map(|field| {
            let widget = input_widget_for_field(field.field_type, field.constraint("options").is_some());
            let mut node = DeclarativeNode::new(widget)
                .with_property("field", field.name.as_str())
                .with_property("label", field_label(field))
                .with_property("required", field.required)
                .with_property("type", field.field_type.as_str());
            if let Some(options) = field.constraint("options") {
                node = node.with_property("options", options.clone());
            }
            node
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_types::FieldType;

    fn registry() -> WidgetRegistry {
        WidgetRegistry::standard([])
    }

    #[test]
    fn explicit_discriminator_wins_over_structure() {
        let node = DeclarativeNode::new("card").with_property("entity", "Customer");
        assert_eq!(resolve_type_name(&node), Some(TypeResolution::Explicit("card".into())));
    }

    #[test]
    fn structural_inference_follows_precedence() {
        let form = DeclarativeNode::untyped().with_property("entity", "Customer").with_property("id", "f");
        let input = DeclarativeNode::untyped()
            .with_property("field", "email")
            .with_property("label", "Email")
            .with_property("type", "email");
        let button = DeclarativeNode::untyped().with_property("label", "Go").with_property("action", "submit");
        let screen = DeclarativeNode::untyped().with_property("title", "Home");

        assert_eq!(resolve_type_name(&form).map(|r| r.type_name().to_string()).as_deref(), Some("form"));
        assert_eq!(resolve_type_name(&input).map(|r| r.type_name().to_string()).as_deref(), Some("email_input"));
        assert_eq!(resolve_type_name(&button).map(|r| r.type_name().to_string()).as_deref(), Some("button"));
        assert_eq!(resolve_type_name(&screen).map(|r| r.type_name().to_string()).as_deref(), Some("screen"));
        assert_eq!(resolve_type_name(&DeclarativeNode::untyped().with_property("text", "x")), None);
    }

    #[test]
    fn form_without_children_derives_inputs_from_schema() {
        let mut entity = EntitySchema {
            name: "Customer".into(),
            ..Default::default()
        };
        entity.fields.insert("id".into(), SchemaField::new("id", FieldType::Integer));
        entity.fields.insert("first_name".into(), SchemaField::new("first_name", FieldType::Text).required());
        entity.fields.insert("vip".into(), SchemaField::new("vip", FieldType::Boolean));
        let mut schema = SchemaBundle::default();
        schema.entities.insert("Customer".into(), entity);

        let registry = registry();
        let node = DeclarativeNode::new("form").with_property("entity", "Customer");
        let root = WidgetTreeBuilder::new(&registry)
            .with_schema(&schema)
            .build_strict(&node)
            .expect("form");

        let types: Vec<&str> = root.children.iter().map(|child| child.type_name.as_str()).collect();
        assert_eq!(types, vec!["text_input", "checkbox"]);
        assert_eq!(root.children[0].property("label"), Some(&Value::from("First Name")));
        assert_eq!(root.children[0].property("required"), Some(&Value::Bool(true)));
    }

    #[test]
    fn unknown_widget_becomes_placeholder_with_path() {
        let registry = registry();
        let node = DeclarativeNode::new("column").with_children(vec![
            DeclarativeNode::new("text"),
            DeclarativeNode::new("hologram"),
        ]);

        let tree = WidgetTreeBuilder::new(&registry).build_at(&node, "home");
        let root = tree.root.expect("root");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].type_name, ERROR_PLACEHOLDER);
        assert_eq!(tree.failures.len(), 1);
        assert_eq!(tree.failures[0].path, "home.children[1]");
        assert_eq!(tree.failures[0].error, BuildError::unknown_widget("hologram"));
    }

    #[test]
    fn skip_policy_drops_failed_subtree() {
        let registry = registry();
        let node = DeclarativeNode::new("column").with_children(vec![
            DeclarativeNode::untyped().with_property("text", "orphan"),
            DeclarativeNode::new("text"),
        ]);

        let tree = WidgetTreeBuilder::new(&registry)
            .with_policy(FailurePolicy::SkipSubtree)
            .build(&node);
        let root = tree.root.expect("root");
        assert_eq!(root.children.len(), 1);
        assert!(matches!(tree.failures[0].error, BuildError::MalformedNode { .. }));
    }

    #[test]
    fn strict_build_reports_first_failure() {
        let registry = registry();
        let node = DeclarativeNode::new("column").with_children(vec![DeclarativeNode::new("hologram")]);
        let error = WidgetTreeBuilder::new(&registry).build_strict(&node).expect_err("strict");
        assert_eq!(error, BuildError::unknown_widget("hologram"));
    }
}
