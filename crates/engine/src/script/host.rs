//! Host callables exposed to scripts and the state they share.
//!
//! Storage verbs never touch storage: they enqueue an [`Operation`] and
//! return its id. `getResult` reads the committed result store, so a result
//! is visible only after the owning batch has drained.
//!
//! [`Operation`]: capsule_types::Operation

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use capsule_types::{OperationKind, Value, ValueMap};
use capsule_util::{LogLevel, LogRecord, LogRingBuffer};
use rhai::{Dynamic, Engine, EvalAltResult};
use tracing::{debug, error, info, warn};

use super::convert::{from_dynamic, operation_key, to_dynamic};
use crate::operations::{OperationQueue, ResultStore};

pub(crate) const SCRIPT_TARGET: &str = "capsule::script";

/// Session-wide state reachable from host callables.
#[derive(Debug)]
pub struct HostState {
    pub queue: OperationQueue,
    pub results: ResultStore,
    pub logs: LogRingBuffer,
    /// Screen requested by `navigate`, applied after the drain.
    pub navigation: Option<String>,
    /// `(workflow_id, step_id)` requests from `transition`, applied after the drain.
    pub transitions: Vec<(String, String)>,
    /// Map returned by `actionContext()` for the running action.
    pub action_context: Value,
    /// Set while evaluating visibility; storage verbs, `navigate`,
    /// `transition`, and `clearResults` then raise instead of acting.
    pub read_only: bool,
}

impl HostState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            queue: OperationQueue::new(),
            results: ResultStore::new(),
            logs: LogRingBuffer::new(log_capacity),
            navigation: None,
            transitions: Vec::new(),
            action_context: Value::empty_map(),
            read_only: false,
        }
    }

    /// Records a script log line in the buffer and emits it as a tracing event.
    pub fn log(&mut self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: SCRIPT_TARGET, component, "{}", message),
            LogLevel::Info => info!(target: SCRIPT_TARGET, component, "{}", message),
            LogLevel::Warn => warn!(target: SCRIPT_TARGET, component, "{}", message),
            LogLevel::Error => error!(target: SCRIPT_TARGET, component, "{}", message),
        }
        self.logs.push(LogRecord::new(level, component, message));
    }

    /// Takes the pending navigation and transition requests.
    pub fn take_requests(&mut self) -> (Option<String>, Vec<(String, String)>) {
        (self.navigation.take(), std::mem::take(&mut self.transitions))
    }
}

pub type SharedHost = Rc<RefCell<HostState>>;

type HostResult<T> = Result<T, Box<EvalAltResult>>;

fn ensure_writable(host: &HostState, function: &str) -> HostResult<()> {
    if host.read_only {
        return Err(format!("'{function}' is not available in read-only evaluation").into());
    }
    Ok(())
}

macro_rules! register_once {
    ($engine:expr, $registered:expr, $name:literal, $arity:literal, $func:expr) => {
        if $registered.insert(format!("{}/{}", $name, $arity)) {
            $engine.register_fn($name, $func);
        }
    };
}

/// Registers every host callable that is not registered yet.
///
/// Keys are `name/arity`, so calling this again after more scripts load
/// never replaces a closure bound to the live queue.
pub(crate) fn register_host_functions(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    let before = registered.len();
    register_storage_verbs(engine, host, registered);
    register_result_access(engine, host, registered);
    register_navigation(engine, host, registered);
    register_logging(engine, host, registered);
    register_output_hooks(engine, host, registered);
    debug!(added = registered.len() - before, total = registered.len(), "host functions registered");
}

fn enqueue(host: &SharedHost, kind: OperationKind, entity: Option<&str>, payload: ValueMap) -> HostResult<i64> {
    let mut host = host.borrow_mut();
    ensure_writable(&host, kind.as_str())?;
    let id = host.queue.enqueue(kind, entity.map(str::to_string), Value::Map(payload));
    Ok(i64::try_from(id.0).unwrap_or(i64::MAX))
}

fn payload<const N: usize>(entries: [(&str, Value); N]) -> ValueMap {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn register_storage_verbs(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    register_once!(engine, registered, "save", 2, {
        let host = host.clone();
        move |entity: &str, data: Dynamic| {
            enqueue(&host, OperationKind::Save, Some(entity), payload([("data", from_dynamic(&data))]))
        }
    });
    register_once!(engine, registered, "findById", 2, {
        let host = host.clone();
        move |entity: &str, id: Dynamic| {
            enqueue(&host, OperationKind::FindById, Some(entity), payload([("id", from_dynamic(&id))]))
        }
    });
    register_once!(engine, registered, "findAll", 1, {
        let host = host.clone();
        move |entity: &str| enqueue(&host, OperationKind::FindAll, Some(entity), ValueMap::new())
    });
    register_once!(engine, registered, "findAll", 2, {
        let host = host.clone();
        move |entity: &str, filter: Dynamic| {
            enqueue(&host, OperationKind::FindAll, Some(entity), payload([("where", from_dynamic(&filter))]))
        }
    });
    register_once!(engine, registered, "findAll", 3, {
        let host = host.clone();
        move |entity: &str, filter: Dynamic, order_by: Dynamic| {
            let payload = payload([("where", from_dynamic(&filter)), ("orderBy", from_dynamic(&order_by))]);
            enqueue(&host, OperationKind::FindAll, Some(entity), payload)
        }
    });
    register_once!(engine, registered, "findAll", 4, {
        let host = host.clone();
        move |entity: &str, filter: Dynamic, order_by: Dynamic, limit: Dynamic| {
            let payload = payload([
                ("where", from_dynamic(&filter)),
                ("orderBy", from_dynamic(&order_by)),
                ("limit", from_dynamic(&limit)),
            ]);
            enqueue(&host, OperationKind::FindAll, Some(entity), payload)
        }
    });
    register_once!(engine, registered, "update", 3, {
        let host = host.clone();
        move |entity: &str, id: Dynamic, data: Dynamic| {
            let payload = payload([("id", from_dynamic(&id)), ("data", from_dynamic(&data))]);
            enqueue(&host, OperationKind::Update, Some(entity), payload)
        }
    });
    register_once!(engine, registered, "delete", 2, {
        let host = host.clone();
        move |entity: &str, id: Dynamic| {
            enqueue(&host, OperationKind::Delete, Some(entity), payload([("id", from_dynamic(&id))]))
        }
    });

    register_once!(engine, registered, "executeRaw", 1, {
        let host = host.clone();
        move |sql: &str| enqueue(&host, OperationKind::RawExec, None, payload([("sql", Value::from(sql))]))
    });
    register_once!(engine, registered, "executeRaw", 2, {
        let host = host.clone();
        move |sql: &str, params: Dynamic| {
            let payload = payload([("sql", Value::from(sql)), ("params", from_dynamic(&params))]);
            enqueue(&host, OperationKind::RawExec, None, payload)
        }
    });
    register_once!(engine, registered, "query", 1, {
        let host = host.clone();
        move |sql: &str| enqueue(&host, OperationKind::RawQuery, None, payload([("sql", Value::from(sql))]))
    });
    register_once!(engine, registered, "query", 2, {
        let host = host.clone();
        move |sql: &str, params: Dynamic| {
            let payload = payload([("sql", Value::from(sql)), ("params", from_dynamic(&params))]);
            enqueue(&host, OperationKind::RawQuery, None, payload)
        }
    });
}

fn register_result_access(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    register_once!(engine, registered, "getResult", 1, {
        let host = host.clone();
        move |id: Dynamic| -> Dynamic {
            let Some(key) = operation_key(&id) else {
                return Dynamic::UNIT;
            };
            host.borrow()
                .results
                .get(&key)
                .map(|result| to_dynamic(&result.to_script_value()))
                .unwrap_or(Dynamic::UNIT)
        }
    });
    register_once!(engine, registered, "clearResults", 0, {
        let host = host.clone();
        move || -> HostResult<()> {
            let mut host = host.borrow_mut();
            ensure_writable(&host, "clearResults")?;
            host.results.clear();
            Ok(())
        }
    });
}

fn register_navigation(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    register_once!(engine, registered, "navigate", 1, {
        let host = host.clone();
        move |screen_id: &str| -> HostResult<()> {
            let mut host = host.borrow_mut();
            ensure_writable(&host, "navigate")?;
            host.navigation = Some(screen_id.to_string());
            Ok(())
        }
    });
    register_once!(engine, registered, "transition", 2, {
        let host = host.clone();
        move |workflow_id: &str, step_id: &str| -> HostResult<()> {
            let mut host = host.borrow_mut();
            ensure_writable(&host, "transition")?;
            host.transitions.push((workflow_id.to_string(), step_id.to_string()));
            Ok(())
        }
    });
    register_once!(engine, registered, "actionContext", 0, {
        let host = host.clone();
        move || -> Dynamic { to_dynamic(&host.borrow().action_context) }
    });
}

fn register_logging(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    register_once!(engine, registered, "logDebug", 1, {
        let host = host.clone();
        move |message: Dynamic| host.borrow_mut().log(LogLevel::Debug, "script", &message.to_string())
    });
    register_once!(engine, registered, "logInfo", 1, {
        let host = host.clone();
        move |message: Dynamic| host.borrow_mut().log(LogLevel::Info, "script", &message.to_string())
    });
    register_once!(engine, registered, "logWarn", 1, {
        let host = host.clone();
        move |message: Dynamic| host.borrow_mut().log(LogLevel::Warn, "script", &message.to_string())
    });
    register_once!(engine, registered, "logError", 1, {
        let host = host.clone();
        move |message: Dynamic| host.borrow_mut().log(LogLevel::Error, "script", &message.to_string())
    });
}

fn register_output_hooks(engine: &mut Engine, host: &SharedHost, registered: &mut HashSet<String>) {
    if !registered.insert("print/hook".to_string()) {
        return;
    }
    let print_host = host.clone();
    engine.on_print(move |text| print_host.borrow_mut().log(LogLevel::Info, "print", text));
    let debug_host = host.clone();
    engine.on_debug(move |text, source, position| {
        let message = match source {
            Some(source) => format!("{source} @ {position}: {text}"),
            None => format!("{position}: {text}"),
        };
        debug_host.borrow_mut().log(LogLevel::Debug, "debug", &message);
    });
}
