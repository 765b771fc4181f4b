//! Entity schema definitions delivered by the schema asset.
//!
//! A schema is created once per loaded asset and treated as immutable
//! afterwards. Form state and the storage operation processor share it by
//! reference. Map keys are authoritative for names: [`SchemaBundle::normalize`]
//! copies every key into the corresponding `name` field so authors may omit it.

pub mod validation;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// Primary key used when an entity does not declare one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Collection of entity schemas keyed by entity name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaBundle {
    #[serde(default)]
    pub entities: IndexMap<String, EntitySchema>,
}

impl SchemaBundle {
    /// Copies map keys into entity and field names.
    pub fn normalize(mut self) -> Self {
        for (entity_name, entity) in self.entities.iter_mut() {
            entity.name = entity_name.clone();
            for (field_name, field) in entity.fields.iter_mut() {
                field.name = field_name.clone();
            }
        }
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// Case-insensitive lookup used when an entity name comes from an action
    /// suffix such as `submit_customer`.
    pub fn find_entity_ignore_case(&self, name: &str) -> Option<&EntitySchema> {
        self.entities
            .get(name)
            .or_else(|| self.entities.values().find(|entity| entity.name.eq_ignore_ascii_case(name)))
    }
}

/// Structure of one persisted entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Declared fields in authoring order.
    #[serde(default)]
    pub fields: IndexMap<String, SchemaField>,
    /// Field name to related entity name.
    #[serde(default)]
    pub relationships: IndexMap<String, String>,
    /// Field name to `"Entity.field"` reference.
    #[serde(default)]
    pub foreign_keys: IndexMap<String, String>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.get(name)
    }

    pub fn primary_key(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// Splits a foreign-key hint into `(entity, field)`.
    pub fn foreign_key_target(&self, field: &str) -> Option<(&str, &str)> {
        let reference = self.foreign_keys.get(field)?;
        let (entity, target_field) = reference.split_once('.')?;
        if entity.is_empty() || target_field.is_empty() {
            return None;
        }
        Some((entity, target_field))
    }

    /// Initial form values sourced from field defaults.
    pub fn default_values(&self) -> ValueMap {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.default_value.clone().map(|value| (name.clone(), value)))
            .collect()
    }
}

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    #[serde(alias = "string")]
    Text,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "number", alias = "float")]
    Decimal,
    #[serde(alias = "bool")]
    Boolean,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }
}

/// One declared field of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Optional human-readable label for generated inputs.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "default")]
    pub default_value: Option<Value>,
    /// Constraint bag (`maxLength`, `minLength`, `pattern`, `min`, `max`, `options`).
    #[serde(default)]
    pub constraints: Option<ValueMap>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.get_or_insert_with(ValueMap::new).insert(key.into(), value.into());
        self
    }

    /// Looks up a constraint by its camelCase key, falling back to snake_case.
    pub fn constraint(&self, camel_key: &str) -> Option<&Value> {
        let constraints = self.constraints.as_ref()?;
        constraints
            .get(camel_key)
            .or_else(|| constraints.get(&camel_to_snake(camel_key)))
    }
}

fn camel_to_snake(key: &str) -> String {
    let mut snake = String::with_capacity(key.len() + 4);
    for character in key.chars() {
        if character.is_ascii_uppercase() {
            snake.push('_');
            snake.push(character.to_ascii_lowercase());
        } else {
            snake.push(character);
        }
    }
    snake
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA_YAML: &str = r#"
entities:
  Customer:
    primary_key: customer_id
    fields:
      customer_id: { type: integer }
      name: { type: text, required: true, constraints: { maxLength: 40 } }
      tier: { type: string, default: "basic" }
      region_id: { type: int }
    relationships:
      orders: Order
    foreign_keys:
      region_id: Region.id
"#;

    #[test]
    fn normalizes_names_from_map_keys() {
        let bundle: SchemaBundle = serde_yaml::from_str(SCHEMA_YAML).expect("schema yaml");
        let bundle = bundle.normalize();
        let customer = bundle.entity("Customer").expect("customer entity");

        assert_eq!(customer.name, "Customer");
        assert_eq!(customer.primary_key(), "customer_id");
        assert_eq!(customer.field("name").map(|field| field.name.as_str()), Some("name"));
        assert_eq!(customer.field("tier").map(|field| field.field_type), Some(FieldType::Text));
        assert_eq!(customer.field("region_id").map(|field| field.field_type), Some(FieldType::Integer));
        assert_eq!(customer.relationships.get("orders").map(String::as_str), Some("Order"));
    }

    #[test]
    fn resolves_foreign_key_targets_and_defaults() {
        let bundle: SchemaBundle = serde_yaml::from_str(SCHEMA_YAML).expect("schema yaml");
        let bundle = bundle.normalize();
        let customer = bundle.entity("Customer").expect("customer entity");

        assert_eq!(customer.foreign_key_target("region_id"), Some(("Region", "id")));
        assert_eq!(customer.foreign_key_target("name"), None);
        assert_eq!(customer.default_values().get("tier"), Some(&Value::Text("basic".into())));
    }

    #[test]
    fn constraint_lookup_accepts_snake_case_keys() {
        let field = SchemaField::new("title", FieldType::Text).with_constraint("max_length", 10);
        assert_eq!(field.constraint("maxLength"), Some(&Value::Int(10)));
        assert_eq!(field.constraint("minLength"), None);
    }

    #[test]
    fn finds_entities_case_insensitively() {
        let bundle: SchemaBundle = serde_yaml::from_str(SCHEMA_YAML).expect("schema yaml");
        let bundle = bundle.normalize();
        assert!(bundle.find_entity_ignore_case("customer").is_some());
        assert!(bundle.find_entity_ignore_case("invoice").is_none());
    }
}
