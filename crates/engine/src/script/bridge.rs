use std::{collections::HashSet, fmt};

use capsule_types::{Value, ValueMap};
use capsule_util::{ScriptLimits, ScriptSource};
use rhai::{AST, CallFnOptions, Dynamic, Engine, Scope};
use tracing::{debug, info};

use super::{
    convert::{from_dynamic, to_dynamic},
    host::{SharedHost, register_host_functions},
};
use crate::errors::ScriptError;

/// The session's single embedded engine instance.
///
/// Global variables live in one shared [`Scope`]; script functions from every
/// loaded source accumulate in one function-only [`AST`]. Nothing here is
/// per-action.
pub struct ScriptBridge {
    engine: Engine,
    scope: Scope<'static>,
    functions: AST,
    host: SharedHost,
    registered: HashSet<String>,
    sources: Vec<String>,
}

impl fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBridge")
            .field("functions", &self.function_names())
            .field("scope_len", &self.scope.len())
            .field("host_functions", &self.registered.len())
            .field("sources", &self.sources)
            .finish()
    }
}

impl ScriptBridge {
    pub fn new(host: SharedHost, limits: &ScriptLimits) -> Self {
        let mut engine = Engine::new();
        engine
            .set_max_operations(limits.max_operations)
            .set_max_call_levels(limits.max_call_levels)
            .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth)
            .set_max_string_size(limits.max_string_size);

        Self {
            engine,
            scope: Scope::new(),
            functions: AST::empty(),
            host,
            registered: HashSet::new(),
            sources: Vec::new(),
        }
    }

    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    /// Idempotent; see [`register_host_functions`].
    pub fn register_host_functions(&mut self) {
        register_host_functions(&mut self.engine, &self.host, &mut self.registered);
    }

    pub fn registered_host_functions(&self) -> usize {
        self.registered.len()
    }

    /// Compiles `source`, runs its top-level statements in the shared scope,
    /// and keeps its functions. A later source may redefine a function.
    pub fn load_script(&mut self, source: &ScriptSource) -> Result<(), ScriptError> {
        let ast = self
            .engine
            .compile(&source.text)
            .map_err(|error| ScriptError::compile(&source.name, error))?;

        let runnable = self.functions.merge(&ast);
        self.engine
            .run_ast_with_scope(&mut self.scope, &runnable)
            .map_err(|error| ScriptError::evaluation(format!("loading '{}'", source.name), error))?;

        let function_count = ast.iter_functions().count();
        self.functions.combine(ast.clone_functions_only());
        self.sources.push(source.name.clone());
        info!(source = %source.name, functions = function_count, "script loaded");
        Ok(())
    }

    /// Runs statement text in the shared scope and returns its final value.
    pub fn eval_statement(&mut self, text: &str) -> Result<Value, ScriptError> {
        let ast = self
            .engine
            .compile(text)
            .map_err(|error| ScriptError::compile("statement", error))?;
        let runnable = self.functions.merge(&ast);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &runnable)
            .map_err(|error| ScriptError::evaluation("statement", error))?;
        self.functions.combine(ast.clone_functions_only());
        Ok(from_dynamic(&result))
    }

    /// Evaluates a single expression. Assignments and statements are rejected
    /// at compile time.
    pub fn eval_expression(&mut self, text: &str) -> Result<Value, ScriptError> {
        let ast = self
            .engine
            .compile_expression(text)
            .map_err(|error| ScriptError::compile("expression", error))?;
        let runnable = self.functions.merge(&ast);
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &runnable)
            .map(|result| from_dynamic(&result))
            .map_err(|error| ScriptError::evaluation(format!("expression '{text}'"), error))
    }

    /// Evaluates `text` with `variables` injected for this call only.
    pub fn eval_with(&mut self, text: &str, variables: &ValueMap) -> Result<Value, ScriptError> {
        let mark = self.scope.len();
        for (name, value) in variables {
            self.scope.push_dynamic(name.as_str(), to_dynamic(value));
        }
        let result = self.eval_expression(text);
        self.scope.rewind(mark);
        result
    }

    /// [`eval_with`](Self::eval_with) with the host in read-only mode, so
    /// the expression can neither enqueue operations nor request navigation.
    pub fn eval_read_only(&mut self, text: &str, variables: &ValueMap) -> Result<Value, ScriptError> {
        let previous = std::mem::replace(&mut self.host.borrow_mut().read_only, true);
        let result = self.eval_with(text, variables);
        self.host.borrow_mut().read_only = previous;
        result
    }

    /// Statement counterpart of [`eval_with`](Self::eval_with).
    pub fn run_with(&mut self, text: &str, variables: &ValueMap) -> Result<Value, ScriptError> {
        let mark = self.scope.len();
        for (name, value) in variables {
            self.scope.push_dynamic(name.as_str(), to_dynamic(value));
        }
        let result = self.eval_statement(text);
        self.scope.rewind(mark);
        result
    }

    /// Reads a global variable; `None` when it does not exist.
    pub fn fetch_variable(&self, name: &str) -> Option<Value> {
        self.scope.get_value::<Dynamic>(name).map(|value| from_dynamic(&value))
    }

    pub fn set_variable(&mut self, name: &str, value: &Value) {
        self.scope.set_or_push(name, to_dynamic(value));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.function_arity(name).is_some()
    }

    /// Parameter count of the most recently loaded function named `name`.
    pub fn function_arity(&self, name: &str) -> Option<usize> {
        self.functions
            .iter_functions()
            .filter(|function| function.name == name)
            .map(|function| function.params.len())
            .last()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .iter_functions()
            .map(|function| function.name.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Calls a script function with positional arguments.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
        if !self.has_function(name) {
            return Err(ScriptError::FunctionNotFound { name: name.to_string() });
        }
        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        let mut options = CallFnOptions::new();
        options.eval_ast = false;
        options.rewind_scope = true;

        debug!(function = name, args = args.len(), "invoking script function");
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.functions, name, args)
            .map(|result| from_dynamic(&result))
            .map_err(|error| ScriptError::evaluation(format!("function '{name}'"), error))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::script::HostState;
    use capsule_types::{OperationId, OperationResult, value_map};

    fn bridge() -> ScriptBridge {
        let host = Rc::new(RefCell::new(HostState::new(16)));
        let mut bridge = ScriptBridge::new(host, &ScriptLimits::default());
        bridge.register_host_functions();
        bridge
    }

    #[test]
    fn storage_verbs_return_increasing_ids_without_io() {
        let mut bridge = bridge();
        let first = bridge.eval_statement(r#"save("Customer", #{ name: "Ann" })"#).unwrap();
        let second = bridge.eval_statement(r#"save("Customer", #{ name: "Bob" })"#).unwrap();
        assert_eq!((first, second), (Value::Int(0), Value::Int(1)));

        let host = bridge.host().borrow();
        assert_eq!(host.queue.len(), 2);
        assert!(host.results.is_empty());
    }

    #[test]
    fn get_result_is_unit_until_results_are_committed() {
        let mut bridge = bridge();
        bridge.eval_statement(r#"let op = save("Customer", #{})"#).unwrap();
        assert_eq!(bridge.eval_expression("getResult(op)").unwrap(), Value::Null);

        let batch = crate::operations::DrainedBatch::new(vec![OperationResult::success(
            OperationId(0),
            Value::Map(value_map([("id", 7)])),
        )]);
        bridge.host().borrow_mut().results.commit(batch);

        assert_eq!(bridge.eval_expression(r#"getResult("0").id"#).unwrap(), Value::Int(7));
        assert_eq!(bridge.eval_expression("getResult(0).id").unwrap(), Value::Int(7));
    }

    #[test]
    fn registration_is_idempotent() {
        let mut bridge = bridge();
        let count = bridge.registered_host_functions();
        bridge.eval_statement(r#"save("Customer", #{})"#).unwrap();
        bridge.register_host_functions();
        assert_eq!(bridge.registered_host_functions(), count);
        assert_eq!(bridge.eval_statement(r#"save("Customer", #{})"#).unwrap(), Value::Int(1));
    }

    #[test]
    fn loaded_functions_are_invocable_and_globals_persist() {
        let mut bridge = bridge();
        let source = ScriptSource::new("actions.rhai", "let greeting = \"hi\";\nfn double(x) { x * 2 }");
        bridge.load_script(&source).unwrap();

        assert_eq!(bridge.fetch_variable("greeting"), Some(Value::from("hi")));
        assert_eq!(bridge.function_arity("double"), Some(1));
        assert_eq!(bridge.invoke("double", &[Value::Int(21)]).unwrap(), Value::Int(42));
        assert!(matches!(
            bridge.invoke("missing", &[]),
            Err(ScriptError::FunctionNotFound { .. })
        ));
    }

    #[test]
    fn compile_errors_name_the_source() {
        let mut bridge = bridge();
        let error = bridge
            .load_script(&ScriptSource::new("broken.rhai", "fn ( {"))
            .unwrap_err();
        assert!(matches!(error, ScriptError::Compile { ref source_name, .. } if source_name == "broken.rhai"));
    }

    #[test]
    fn injected_variables_do_not_leak() {
        let mut bridge = bridge();
        let variables = value_map([("country", "NZ")]);
        assert_eq!(bridge.eval_with(r#"country == "NZ""#, &variables).unwrap(), Value::Bool(true));
        assert_eq!(bridge.fetch_variable("country"), None);
    }

    #[test]
    fn log_functions_fill_the_buffer() {
        let mut bridge = bridge();
        bridge.eval_statement(r#"logWarn("careful"); print("hello");"#).unwrap();
        let records = bridge.host().borrow().logs.all();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "careful");
        assert_eq!(records[1].component, "print");
    }
}
