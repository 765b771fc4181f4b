use capsule_types::{OperationKind, Value, ValueMap};
use tracing::{debug, info, warn};

use super::{ActionHandler, ActionOutcome, ActionStatus, BuiltinAction, TransitionOutcome};
use crate::{errors::RuntimeError, session::Session};

/// Global script variable holding the running action's context.
pub const ACTION_CONTEXT_VARIABLE: &str = "context";

impl Session {
    /// Runs one named action to completion, including its drain.
    ///
    /// A script function with the action's name is preferred. When none
    /// exists, or it fails, the name is matched against the built-ins
    /// (`navigate_<screen>`, `submit`, `submit_<entity>`, `cancel`). Anything
    /// matching neither is [`RuntimeError::UnknownAction`]. Operations a
    /// failed function enqueued are still drained.
    pub async fn execute_action(&mut self, name: &str, params: ValueMap) -> Result<ActionOutcome, RuntimeError> {
        self.bridge.register_host_functions();
        let context = self.action_context(name, &params);
        self.host.borrow_mut().action_context = context.clone();
        self.bridge.set_variable(ACTION_CONTEXT_VARIABLE, &context);

        let builtin = BuiltinAction::parse(name);
        let mut script_error = None;
        let mut operations = Vec::new();

        if let Some(arity) = self.bridge.function_arity(name) {
            let args = action_arguments(arity, context, Value::Map(params));
            let invoked = self.bridge.invoke(name, &args);
            operations = self.drain_pending().await;
            match invoked {
                Ok(result) => {
                    let mut outcome = ActionOutcome::new(
                        name,
                        ActionHandler::Script {
                            function: name.to_string(),
                        },
                    );
                    outcome.result = result;
                    outcome.operations = operations;
                    self.apply_requests(&mut outcome)?;
                    info!(action = name, handler = "script", operations = outcome.operations.len(), "action completed");
                    return Ok(outcome);
                }
                Err(error) => {
                    let discarded = self.host.borrow_mut().take_requests();
                    warn!(
                        action = name,
                        error = %error,
                        discarded_navigation = ?discarded.0,
                        "script action failed"
                    );
                    if builtin.is_none() {
                        return Err(error.into());
                    }
                    script_error = Some(error);
                }
            }
        }

        let Some(builtin) = builtin else {
            warn!(action = name, "no script function or built-in matches action");
            return Err(RuntimeError::UnknownAction { name: name.to_string() });
        };
        let mut outcome = ActionOutcome::new(name, ActionHandler::Builtin(builtin.clone()));
        outcome.operations = operations;
        outcome.script_error = script_error;
        self.run_builtin(name, builtin, &mut outcome).await?;
        info!(
            action = name,
            handler = "builtin",
            completed = outcome.is_completed(),
            operations = outcome.operations.len(),
            "action completed"
        );
        Ok(outcome)
    }

    /// `{ action, params, values, valid, entity, screen, accumulated }`
    pub fn action_context(&self, name: &str, params: &ValueMap) -> Value {
        let mut context = ValueMap::new();
        context.insert("action".into(), Value::from(name));
        context.insert("params".into(), Value::Map(params.clone()));
        context.insert(
            "values".into(),
            Value::Map(self.form.as_ref().map(|form| form.values().clone()).unwrap_or_default()),
        );
        context.insert(
            "valid".into(),
            Value::Bool(self.form.as_ref().is_none_or(|form| form.is_valid())),
        );
        context.insert(
            "entity".into(),
            Value::from(self.form.as_ref().map(|form| form.entity_name().to_string())),
        );
        context.insert("screen".into(), Value::from(self.current_screen.clone()));
        context.insert("accumulated".into(), Value::Map(self.accumulated.clone()));
        Value::Map(context)
    }

    async fn run_builtin(
        &mut self,
        name: &str,
        builtin: BuiltinAction,
        outcome: &mut ActionOutcome,
    ) -> Result<(), RuntimeError> {
        match builtin {
            BuiltinAction::Navigate { screen_id } => {
                self.navigate(&screen_id)?;
                outcome.navigation = Some(screen_id);
            }
            BuiltinAction::Submit { entity } => {
                let form = self.form.as_mut().ok_or_else(|| RuntimeError::NoActiveForm {
                    action: name.to_string(),
                })?;
                if !form.validate() {
                    let errors = form.error_messages();
                    debug!(action = name, errors = errors.len(), "submission blocked by validation");
                    outcome.status = ActionStatus::ValidationFailed { errors };
                    return Ok(());
                }

                let entity_name = match entity {
                    Some(suffix) => self
                        .assets
                        .schema
                        .find_entity_ignore_case(&suffix)
                        .map(|schema| schema.name.clone())
                        .unwrap_or(suffix),
                    None => form.entity_name().to_string(),
                };
                if entity_name.trim().is_empty() {
                    return Ok(());
                }
                let data = Value::Map(form.typed_values());
                let mut payload = ValueMap::new();
                payload.insert("data".into(), data);
                let id = self
                    .host
                    .borrow_mut()
                    .queue
                    .enqueue(OperationKind::Save, Some(entity_name.clone()), Value::Map(payload));
                debug!(action = name, entity = %entity_name, operation_id = id.0, "auto-save enqueued");
                outcome.auto_save = Some(id);
                outcome.operations.extend(self.drain_pending().await);
            }
            BuiltinAction::Cancel => {
                if let Some(form) = self.form.as_mut() {
                    form.reset();
                }
                outcome.navigation = self.navigate_back()?;
            }
        }
        Ok(())
    }

    /// Applies the transition and navigation requests a script made.
    /// Transitions go first so an explicit `navigate` has the last word.
    pub(crate) fn apply_script_requests(&mut self) -> Result<(Option<String>, Vec<TransitionOutcome>), RuntimeError> {
        let (navigation, transitions) = self.host.borrow_mut().take_requests();
        let mut outcomes = Vec::with_capacity(transitions.len());
        let mut entered = None;
        for (workflow_id, step_id) in transitions {
            let before = self.current_screen.clone();
            let accepted = self.transition_to(&workflow_id, &step_id)?;
            if accepted && self.current_screen != before {
                entered = self.current_screen.clone();
            }
            outcomes.push(TransitionOutcome {
                workflow_id,
                step_id,
                accepted,
            });
        }
        if let Some(screen_id) = navigation {
            self.navigate(&screen_id)?;
            entered = Some(screen_id);
        }
        Ok((entered, outcomes))
    }

    fn apply_requests(&mut self, outcome: &mut ActionOutcome) -> Result<(), RuntimeError> {
        let (navigation, transitions) = self.apply_script_requests()?;
        outcome.navigation = navigation;
        outcome.transitions = transitions;
        Ok(())
    }
}

/// `[context, params]` fitted to the function's arity.
fn action_arguments(arity: usize, context: Value, params: Value) -> Vec<Value> {
    let mut args = vec![context, params];
    args.resize(arity, Value::Null);
    args
}
