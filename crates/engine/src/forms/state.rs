//! Reactive value and error map for one data-capture form.
//!
//! Every mutation bumps `revision` and is published to subscribers right
//! away. Validation is per field and not transactional, so observers can show
//! inline errors while the user types.

use std::fmt;

use capsule_types::{EntitySchema, Value, ValueMap, coerce_field_value, validate_field_value};
use indexmap::IndexMap;
use tracing::trace;

/// Published after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FormChange {
    Value {
        field: String,
        revision: u64,
        error: Option<String>,
    },
    Validated {
        revision: u64,
        valid: bool,
    },
    Reset {
        revision: u64,
    },
}

impl FormChange {
    pub fn revision(&self) -> u64 {
        match self {
            FormChange::Value { revision, .. } | FormChange::Validated { revision, .. } | FormChange::Reset { revision } => {
                *revision
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&FormChange)>;

pub struct FormState {
    schema: EntitySchema,
    values: ValueMap,
    errors: IndexMap<String, Option<String>>,
    revision: u64,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl fmt::Debug for FormState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormState")
            .field("entity", &self.schema.name)
            .field("values", &self.values)
            .field("errors", &self.errors)
            .field("revision", &self.revision)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl FormState {
    /// Starts from schema defaults with no errors.
    pub fn new(schema: EntitySchema) -> Self {
        let values = schema.default_values();
        let errors = schema.fields.keys().map(|name| (name.clone(), None)).collect();
        Self {
            schema,
            values,
            errors,
            revision: 0,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Name of the bound entity.
    pub fn entity_name(&self) -> &str {
        &self.schema.name
    }

    /// Schema the form validates against.
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Raw stored value of `field`.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Every stored value, in declaration order.
    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    /// Current error message of `field`, if any.
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).and_then(Option::as_deref)
    }

    /// Error slot per field; `None` means the field is valid.
    pub fn errors(&self) -> &IndexMap<String, Option<String>> {
        &self.errors
    }

    /// Fields that currently hold an error message.
    pub fn error_messages(&self) -> IndexMap<String, String> {
        self.errors
            .iter()
            .filter_map(|(field, error)| error.clone().map(|message| (field.clone(), message)))
            .collect()
    }

    /// Bumped by every change observers are told about.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stores `value` and re-validates that field only.
    ///
    /// Unknown fields get an error entry and the value is not stored.
    pub fn set_value(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        let error = match self.schema.field(field) {
            Some(declared) => {
                let error = validate_field_value(declared, Some(&value)).err();
                self.values.insert(field.to_string(), value);
                error
            }
            None => Some(format!("unknown field '{field}'")),
        };
        self.errors.insert(field.to_string(), error.clone());
        self.revision += 1;
        trace!(entity = %self.schema.name, field, revision = self.revision, "form value set");
        self.publish(FormChange::Value {
            field: field.to_string(),
            revision: self.revision,
            error,
        });
    }

    /// Re-validates every declared field and returns overall validity.
    pub fn validate(&mut self) -> bool {
        let mut errors = IndexMap::with_capacity(self.schema.fields.len());
        for (name, field) in &self.schema.fields {
            errors.insert(name.clone(), validate_field_value(field, self.values.get(name)).err());
        }
        self.errors = errors;
        let valid = self.errors.values().all(Option::is_none);
        self.revision += 1;
        self.publish(FormChange::Validated {
            revision: self.revision,
            valid,
        });
        valid
    }

    /// Validity without recording errors or notifying.
    pub fn is_valid(&self) -> bool {
        self.schema
            .fields
            .iter()
            .all(|(name, field)| validate_field_value(field, self.values.get(name)).is_ok())
    }

    /// Declared, non-blank values coerced to their schema types.
    pub fn typed_values(&self) -> ValueMap {
        self.schema
            .fields
            .iter()
            .filter_map(|(name, field)| {
                let value = self.values.get(name).filter(|value| !value.is_blank())?;
                let typed = coerce_field_value(field.field_type, value).unwrap_or_else(|| value.clone());
                Some((name.clone(), typed))
            })
            .collect()
    }

    /// Back to schema defaults with every error cleared.
    pub fn reset(&mut self) {
        self.values = self.schema.default_values();
        self.errors = self.schema.fields.keys().map(|name| (name.clone(), None)).collect();
        self.revision += 1;
        self.publish(FormChange::Reset { revision: self.revision });
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&FormChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    fn publish(&mut self, change: FormChange) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&change);
        }
    }
}
