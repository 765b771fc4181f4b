mod support;

use std::sync::Arc;

use capsule_engine::{
    ActionHandler, ActionStatus, BuiltinAction, InMemoryStorage, RuntimeError, STORAGE_UNAVAILABLE, StorageBackend,
};
use capsule_types::{OperationId, Value, ValueMap, value_map};
use support::{fixed_storage, session};

const CUSTOMER_SCRIPT: &str = r#"
fn create_customers(context) {
    let first = save("Customer", #{ name: "Ann" });
    let second = save("Customer", #{ name: "Bob" });
    let early = getResult(first);
    #{ first: first, second: second, early: type_of(early) }
}

fn read_result(context, params) {
    getResult(params.op)
}

fn open_customer() {
    navigate("customer");
}

fn go_nowhere() {
    navigate("missing");
}

fn explode() {
    save("Customer", #{ name: "partial" });
    throw "boom";
}
"#;

#[tokio::test]
async fn save_ids_and_results_follow_enqueue_drain_read() {
    let mut session = session(Some(CUSTOMER_SCRIPT));
    let storage = fixed_storage();
    session.attach_storage(storage.clone());

    let outcome = session.execute_action("create_customers", ValueMap::new()).await.unwrap();
    assert_eq!(
        outcome.handler,
        ActionHandler::Script {
            function: "create_customers".into()
        }
    );
    assert_eq!(outcome.result.get("first"), Some(&Value::Int(0)));
    assert_eq!(outcome.result.get("second"), Some(&Value::Int(1)));
    assert_eq!(outcome.result.get("early"), Some(&Value::from("()")));
    assert_eq!(outcome.operations, vec![OperationId(0), OperationId(1)]);
    assert_eq!(session.pending_operations(), 0);
    assert_eq!(storage.save_count(), 2);

    let read = session
        .execute_action("read_result", value_map([("op", "0")]))
        .await
        .unwrap();
    assert_eq!(read.result.get("id"), Some(&Value::Int(7)));
    assert_eq!(read.result.get("name"), Some(&Value::from("Ann")));
    assert!(session.operation_result(OperationId(1)).is_some());
    assert!(session.operation_result(OperationId(2)).is_none());
}

#[tokio::test]
async fn operation_ids_keep_increasing_across_actions() {
    let mut session = session(Some(CUSTOMER_SCRIPT));
    session.attach_storage(fixed_storage());

    session.execute_action("create_customers", ValueMap::new()).await.unwrap();
    let second = session.execute_action("create_customers", ValueMap::new()).await.unwrap();
    assert_eq!(second.result.get("first"), Some(&Value::Int(2)));
    assert_eq!(second.operations, vec![OperationId(2), OperationId(3)]);
}

#[tokio::test]
async fn missing_storage_records_error_results() {
    let mut session = session(Some(CUSTOMER_SCRIPT));
    assert!(!session.has_storage());

    session.execute_action("create_customers", ValueMap::new()).await.unwrap();
    let read = session
        .execute_action("read_result", value_map([("op", 1)]))
        .await
        .unwrap();
    assert_eq!(read.result.get("error"), Some(&Value::from(STORAGE_UNAVAILABLE)));
    assert!(session.operation_result(OperationId(0)).is_some_and(|result| result.is_error()));
}

#[tokio::test]
async fn script_navigation_is_applied_after_the_drain() {
    let mut session = session(Some(CUSTOMER_SCRIPT));
    assert_eq!(session.current_screen(), Some("home"));

    let outcome = session.execute_action("open_customer", ValueMap::new()).await.unwrap();
    assert_eq!(outcome.navigation.as_deref(), Some("customer"));
    assert_eq!(session.current_screen(), Some("customer"));
    assert_eq!(session.form().map(|form| form.entity_name()), Some("Customer"));

    let error = session.execute_action("go_nowhere", ValueMap::new()).await.unwrap_err();
    assert!(matches!(error, RuntimeError::UnknownScreen { ref screen_id } if screen_id == "missing"));
    assert_eq!(session.current_screen(), Some("customer"));
}

#[tokio::test]
async fn unknown_actions_and_failed_scripts_are_reported() {
    let mut session = session(Some(CUSTOMER_SCRIPT));
    let storage = fixed_storage();
    session.attach_storage(storage.clone());

    let error = session.execute_action("do_something", ValueMap::new()).await.unwrap_err();
    assert!(matches!(error, RuntimeError::UnknownAction { ref name } if name == "do_something"));

    let error = session.execute_action("explode", ValueMap::new()).await.unwrap_err();
    assert!(matches!(error, RuntimeError::Script(_)));
    assert_eq!(storage.save_count(), 1);
    assert_eq!(session.pending_operations(), 0);

    session.navigate("customer").unwrap();
    assert!(session.execute_action("navigate_home", ValueMap::new()).await.is_ok());
}

#[tokio::test]
async fn builtin_navigation_and_cancel() {
    let mut session = session(None);
    let outcome = session.execute_action("navigate_customer", ValueMap::new()).await.unwrap();
    assert_eq!(
        outcome.handler,
        ActionHandler::Builtin(BuiltinAction::Navigate {
            screen_id: "customer".into()
        })
    );
    session.set_field_value("country", "AU").unwrap();

    let cancelled = session.execute_action("cancel", ValueMap::new()).await.unwrap();
    assert_eq!(cancelled.navigation.as_deref(), Some("home"));
    assert_eq!(session.current_screen(), Some("home"));
    assert_eq!(
        session.form().and_then(|form| form.value("country")),
        Some(&Value::from("NZ"))
    );
}

#[tokio::test]
async fn submit_requires_a_valid_form_then_auto_saves() {
    let mut session = session(None);
    let storage = fixed_storage();
    session.attach_storage(storage.clone());

    let error = session.execute_action("submit", ValueMap::new()).await.unwrap_err();
    assert!(matches!(error, RuntimeError::NoActiveForm { .. }));

    session.navigate("customer").unwrap();
    let blocked = session.execute_action("submit", ValueMap::new()).await.unwrap();
    match &blocked.status {
        ActionStatus::ValidationFailed { errors } => assert!(errors.contains_key("email")),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(blocked.auto_save, None);
    assert_eq!(storage.save_count(), 0);

    session.set_field_value("email", "ann@example.com").unwrap();
    assert_eq!(session.form().and_then(|form| form.error("email")), None);

    let saved = session.execute_action("submit_customer", ValueMap::new()).await.unwrap();
    assert!(saved.is_completed());
    let id = saved.auto_save.expect("auto-save enqueued");
    assert_eq!(saved.operations, vec![id]);
    assert_eq!(storage.save_count(), 1);
    assert!(session.operation_result(id).is_some_and(|result| !result.is_error()));
}

#[tokio::test]
async fn script_handler_suppresses_auto_save() {
    let script = r#"
        fn submit_customer(context) {
            logInfo("custom submit for " + context.entity);
            save("Customer", context.values)
        }
    "#;
    let mut session = session(Some(script));
    let storage = fixed_storage();
    session.attach_storage(storage.clone());
    session.navigate("customer").unwrap();

    let outcome = session.execute_action("submit_customer", ValueMap::new()).await.unwrap();
    assert!(matches!(outcome.handler, ActionHandler::Script { .. }));
    assert_eq!(outcome.auto_save, None);
    assert_eq!(outcome.result, Value::Int(0));
    assert_eq!(storage.save_count(), 1);
    assert!(
        session
            .script_logs()
            .iter()
            .any(|record| record.message == "custom submit for Customer")
    );
}

#[tokio::test]
async fn failing_script_falls_back_to_builtin_submit() {
    let script = r#"
        fn submit() {
            throw "scripted submit is broken";
        }
    "#;
    let mut session = session(Some(script));
    let storage: Arc<dyn StorageBackend> = fixed_storage();
    session.attach_storage(storage);
    session.navigate("customer").unwrap();
    session.set_field_value("email", "ann@example.com").unwrap();

    let outcome = session.execute_action("submit", ValueMap::new()).await.unwrap();
    assert_eq!(outcome.handler, ActionHandler::Builtin(BuiltinAction::Submit { entity: None }));
    assert!(outcome.script_error.is_some());
    assert!(outcome.auto_save.is_some());
}

#[tokio::test]
async fn action_context_reaches_script_functions() {
    let script = r#"
        fn inspect(context, params) {
            #{ valid: context.valid, entity: context.entity, flag: params.flag, same: actionContext().action }
        }
    "#;
    let mut session = session(Some(script));
    session.navigate("customer").unwrap();

    let outcome = session
        .execute_action("inspect", value_map([("flag", true)]))
        .await
        .unwrap();
    assert_eq!(outcome.result.get("valid"), Some(&Value::Bool(false)));
    assert_eq!(outcome.result.get("entity"), Some(&Value::from("Customer")));
    assert_eq!(outcome.result.get("flag"), Some(&Value::Bool(true)));
    assert_eq!(outcome.result.get("same"), Some(&Value::from("inspect")));
}

const CATALOGUE_SCRIPT: &str = r#"
fn seed() {
    save("Customer", #{ name: "Ann", country: "NZ" });
    save("Customer", #{ name: "Bob", country: "NZ" });
    save("Customer", #{ name: "Cat", country: "AU" });
}

fn search() {
    #{
        top: findAll("Customer", #{ country: "NZ" }, "name desc", 1),
        all: findAll("Customer"),
        renamed: update("Customer", 1, #{ name: "Anna" }),
        removed: delete("Customer", 3),
        raw: executeRaw("DELETE FROM customer", [1]),
        rows: query("SELECT * FROM customer"),
    }
}

fn read(context, params) {
    getResult(params.op)
}

fn forget() {
    clearResults();
}
"#;

async fn read(session: &mut capsule_engine::Session, op: &Value) -> Value {
    session
        .execute_action("read", value_map([("op", op.clone())]))
        .await
        .unwrap()
        .result
}

#[tokio::test]
async fn query_verbs_round_trip_through_the_in_memory_backend() {
    let mut session = session(Some(CATALOGUE_SCRIPT));
    session.attach_storage(Arc::new(InMemoryStorage::new()));
    session.execute_action("seed", ValueMap::new()).await.unwrap();

    let search = session.execute_action("search", ValueMap::new()).await.unwrap();
    assert_eq!(search.operations.len(), 6);
    let op = |key: &str| search.result.get(key).cloned().unwrap_or(Value::Null);

    match read(&mut session, &op("top")).await {
        Value::List(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("name"), Some(&Value::from("Bob")));
        }
        other => panic!("expected a list, got {other:?}"),
    }
    assert!(matches!(read(&mut session, &op("all")).await, Value::List(rows) if rows.len() == 3));
    assert_eq!(read(&mut session, &op("renamed")).await.get("name"), Some(&Value::from("Anna")));
    assert_eq!(read(&mut session, &op("removed")).await, Value::Bool(true));
    assert!(read(&mut session, &op("raw")).await.get("error").is_some());
    assert!(read(&mut session, &op("rows")).await.get("error").is_some());

    session.execute_action("forget", ValueMap::new()).await.unwrap();
    assert_eq!(read(&mut session, &op("top")).await, Value::Null);
    assert!(session.operation_result(OperationId(3)).is_none());
}
