//! Standard widget set.

use capsule_types::{Capability, FieldType, Value, ValueMap, WidgetNode};

use crate::widgets::WidgetRegistry;

/// Type name of the node substituted for a subtree that failed to build.
pub const ERROR_PLACEHOLDER: &str = "error_placeholder";

/// Layout and display widgets that pass their properties through unchanged.
const PASSTHROUGH_WIDGETS: &[&str] = &[
    "screen", "form", "column", "row", "section", "card", "list", "text", "heading", "image", "divider", "spacer",
];

/// Input widgets and the `input_kind` property each one carries.
const INPUT_WIDGETS: &[(&str, &str)] = &[
    ("text_input", "text"),
    ("email_input", "email"),
    ("password_input", "password"),
    ("number_input", "number"),
    ("date_input", "date"),
    ("textarea", "multiline"),
    ("checkbox", "boolean"),
    ("switch", "boolean"),
    ("select", "choice"),
];

/// Device widgets and the capability each one needs.
const DEVICE_WIDGETS: &[(&str, Capability)] = &[
    ("photo_capture", Capability::Camera),
    ("map_view", Capability::Location),
    ("signature_pad", Capability::Signature),
    ("barcode_scanner", Capability::Barcode),
    ("file_picker", Capability::FileAccess),
];

pub fn register_standard(registry: &mut WidgetRegistry) {
    for type_name in PASSTHROUGH_WIDGETS {
        registry.register(*type_name, passthrough);
    }

    for (type_name, input_kind) in INPUT_WIDGETS {
        let input_kind = *input_kind;
        registry.register(*type_name, move |name: &str, mut properties: ValueMap, children: Vec<WidgetNode>| {
            properties
                .entry("input_kind".to_string())
                .or_insert_with(|| Value::from(input_kind));
            WidgetNode::new(name, properties, children)
        });
    }

    registry.register("button", |name: &str, mut properties: ValueMap, children: Vec<WidgetNode>| {
        properties.entry("enabled".to_string()).or_insert(Value::Bool(true));
        WidgetNode::new(name, properties, children)
    });

    registry.register(ERROR_PLACEHOLDER, |name: &str, mut properties: ValueMap, _children: Vec<WidgetNode>| {
        properties
            .entry("message".to_string())
            .or_insert_with(|| Value::from("This section could not be displayed"));
        WidgetNode::new(name, properties, Vec::new())
    });

    for (type_name, capability) in DEVICE_WIDGETS {
        let capability = *capability;
        registry.register_gated(*type_name, capability, move |name: &str, mut properties: ValueMap, children: Vec<WidgetNode>| {
            properties.insert("capability".to_string(), Value::from(capability.as_str()));
            WidgetNode::new(name, properties, children)
        });
    }
}

fn passthrough(name: &str, properties: ValueMap, children: Vec<WidgetNode>) -> WidgetNode {
    WidgetNode::new(name, properties, children)
}

/// Input widget for an authored `type` hint on an input-like node.
pub fn input_widget_for_hint(hint: Option<&str>) -> &'static str {
    match hint.map(|hint| hint.trim().to_ascii_lowercase()).as_deref() {
        Some("email") => "email_input",
        Some("password") => "password_input",
        Some("number" | "integer" | "int" | "decimal" | "float") => "number_input",
        Some("date") => "date_input",
        Some("textarea" | "multiline") => "textarea",
        Some("boolean" | "bool" | "checkbox") => "checkbox",
        Some("switch" | "toggle") => "switch",
        Some("select" | "choice" | "dropdown") => "select",
        _ => "text_input",
    }
}

/// Input widget generated for a schema field.
pub fn input_widget_for_field(field_type: FieldType, has_options: bool) -> &'static str {
    if has_options {
        return "select";
    }
    match field_type {
        FieldType::Text => "text_input",
        FieldType::Integer | FieldType::Decimal => "number_input",
        FieldType::Boolean => "checkbox",
        FieldType::Date => "date_input",
    }
}
