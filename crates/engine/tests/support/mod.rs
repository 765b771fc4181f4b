#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use capsule_engine::{FindAllQuery, Session, SessionOptions, StorageBackend};
use capsule_registry::WidgetRegistry;
use capsule_types::{RuleSet, SchemaBundle, UiDefinition, Value, ValueMap, WorkflowBundle, value_map};
use capsule_util::{
    AssetBundle, AssetKind, ScriptSource,
    assets::parse_document,
};

pub const SCHEMA_YAML: &str = r#"
entities:
  Customer:
    fields:
      id: { type: integer }
      name: { type: text }
      email: { type: text, required: true }
      country: { type: text, default: "NZ" }
"#;

pub const UI_YAML: &str = r#"
initial_screen: home
screens:
  home:
    widget: screen
    title: Home
    children:
      - widget: button
        label: New customer
        action: navigate_customer
  customer:
    widget: screen
    title: Customer
    children:
      - widget: form
        entity: Customer
        fields:
          - widget: text_input
            field: name
          - widget: email_input
            field: email
          - widget: text_input
            field: country
          - widget: text_input
            field: nickname
"#;

pub const WORKFLOWS_YAML: &str = r#"
workflows:
  onboarding:
    initial_step: A
    steps:
      A: { screen_id: home, next_steps: [B] }
      B: { screen_id: customer, next_steps: [] }
"#;

pub const RULES_YAML: &str = r#"
rules:
  - id: flag_foreign
    when: 'country != "NZ"'
    then: 'logInfo("foreign customer")'
  - id: broken
    when: 'country +'
    then: '1'
visibility:
  email: 'country == "NZ"'
  nickname: 'undefined_thing > 1'
"#;

pub fn assets(script: Option<&str>) -> AssetBundle {
    let schema: SchemaBundle = parse_document(AssetKind::Schema, "schema.yaml", SCHEMA_YAML).expect("schema");
    let ui: UiDefinition = parse_document(AssetKind::Ui, "ui.yaml", UI_YAML).expect("ui");
    let workflows: WorkflowBundle =
        parse_document(AssetKind::Workflows, "workflows.yaml", WORKFLOWS_YAML).expect("workflows");
    let rules: RuleSet = parse_document(AssetKind::Rules, "rules.yaml", RULES_YAML).expect("rules");

    let mut bundle = AssetBundle::new(schema, ui).with_workflows(workflows).with_rules(rules);
    if let Some(script) = script {
        bundle = bundle.with_script(ScriptSource::new("actions.rhai", script));
    }
    bundle
}

pub fn session(script: Option<&str>) -> Session {
    Session::bootstrap(assets(script), Arc::new(WidgetRegistry::standard([])), SessionOptions::default())
        .expect("bootstrap")
}

/// Backend whose saves always answer `{ id: 7, name: "Ann" }`.
#[derive(Debug, Default)]
pub struct FixedStorage {
    pub saves: AtomicUsize,
}

impl FixedStorage {
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for FixedStorage {
    async fn save(&self, _entity: &str, _data: ValueMap) -> Result<Value> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Map(value_map([("id", Value::Int(7)), ("name", Value::from("Ann"))])))
    }

    async fn find_by_id(&self, _entity: &str, _id: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn find_all(&self, _entity: &str, _query: &FindAllQuery) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn update(&self, _entity: &str, _id: &Value, _data: ValueMap) -> Result<Value> {
        bail!("update is not supported here")
    }

    async fn delete(&self, _entity: &str, _id: &Value) -> Result<Value> {
        Ok(Value::Bool(false))
    }

    async fn execute_raw(&self, _sql: &str, _params: &[Value]) -> Result<Value> {
        bail!("raw statements are not supported here")
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Value>> {
        bail!("raw queries are not supported here")
    }
}

pub fn fixed_storage() -> Arc<FixedStorage> {
    Arc::new(FixedStorage::default())
}
