//! Explicit state machine over declared workflow steps.
//!
//! States are step ids and edges are `next_steps`. A transition is accepted
//! only when the target is listed on the current step and every condition
//! declared on the target matches the context exactly. Rejections are
//! reported as `false`, never as errors.

use std::collections::HashMap;

use capsule_types::{Value, ValueMap, WorkflowBundle, WorkflowDefinition, WorkflowStep};
use capsule_util::{AssetKind, LoadError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::errors::RuntimeError;

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionRejection {
    #[error("workflow '{workflow_id}' is not declared")]
    UnknownWorkflow { workflow_id: String },

    #[error("step '{target}' is not a next step of '{from}'")]
    NotListed { from: String, target: String },

    #[error("condition '{key}' expected {expected} but found {found}")]
    ConditionMismatch { key: String, expected: Value, found: Value },
}

/// One attempted transition, accepted or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub workflow_id: String,
    pub from: String,
    pub to: String,
    pub rejection: Option<TransitionRejection>,
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

#[derive(Debug, Clone)]
struct WorkflowRun {
    current: String,
    history: Vec<String>,
}

#[derive(Debug, Default)]
pub struct WorkflowEngine {
    definitions: IndexMap<String, WorkflowDefinition>,
    runs: HashMap<String, WorkflowRun>,
    telemetry: Vec<TransitionEvent>,
}

impl WorkflowEngine {
    /// Takes ownership of the declared workflows after checking their
    /// structure again.
    pub fn new(bundle: WorkflowBundle) -> Result<Self, LoadError> {
        let bundle = bundle.normalize();
        let issues = bundle.validate();
        if !issues.is_empty() {
            return Err(LoadError::InvalidWorkflow {
                name: AssetKind::Workflows.to_string(),
                issues,
            });
        }
        Ok(Self {
            definitions: bundle.workflows,
            ..Default::default()
        })
    }

    pub fn definition(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.definitions.get(workflow_id)
    }

    pub fn workflow_ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Positions a fresh run at the initial step, discarding any earlier run.
    pub fn start(&mut self, workflow_id: &str) -> Result<&WorkflowStep, RuntimeError> {
        let definition = self.definitions.get(workflow_id).ok_or_else(|| RuntimeError::UnknownWorkflow {
            workflow_id: workflow_id.to_string(),
        })?;
        let initial = definition.initial_step.clone();
        debug!(workflow = workflow_id, step = %initial, "workflow started");
        self.runs.insert(
            workflow_id.to_string(),
            WorkflowRun {
                current: initial.clone(),
                history: vec![initial.clone()],
            },
        );
        definition.step(&initial).ok_or_else(|| RuntimeError::UnknownWorkflow {
            workflow_id: workflow_id.to_string(),
        })
    }

    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.runs.contains_key(workflow_id)
    }

    pub fn current_step(&self, workflow_id: &str) -> Option<&WorkflowStep> {
        let run = self.runs.get(workflow_id)?;
        self.definitions.get(workflow_id)?.step(&run.current)
    }

    pub fn is_terminal(&self, workflow_id: &str) -> bool {
        self.current_step(workflow_id).is_some_and(WorkflowStep::is_terminal)
    }

    /// Steps visited by the current run, oldest first.
    pub fn history(&self, workflow_id: &str) -> &[String] {
        self.runs.get(workflow_id).map(|run| run.history.as_slice()).unwrap_or_default()
    }

    /// Next steps whose conditions `context` satisfies, in declaration order.
    pub fn available_transitions(&self, workflow_id: &str, context: &ValueMap) -> Vec<&str> {
        let Some(definition) = self.definitions.get(workflow_id) else {
            return Vec::new();
        };
        let current = self.current_step_id(definition);
        definition
            .step(current)
            .map(|step| step.next_steps.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|target| self.check_transition(workflow_id, target, context).is_ok())
            .map(String::as_str)
            .collect()
    }

    /// Checks a transition without performing it.
    pub fn check_transition(&self, workflow_id: &str, target: &str, context: &ValueMap) -> Result<(), TransitionRejection> {
        let definition = self
            .definitions
            .get(workflow_id)
            .ok_or_else(|| TransitionRejection::UnknownWorkflow {
                workflow_id: workflow_id.to_string(),
            })?;
        let current = self.current_step_id(definition);
        let listed = definition
            .step(current)
            .is_some_and(|step| step.next_steps.iter().any(|next| next == target));
        let Some(target_step) = definition.step(target).filter(|_| listed) else {
            return Err(TransitionRejection::NotListed {
                from: current.to_string(),
                target: target.to_string(),
            });
        };

        for (key, expected) in &target_step.conditions {
            let found = context.get(key).cloned().unwrap_or_default();
            if &found != expected {
                return Err(TransitionRejection::ConditionMismatch {
                    key: key.clone(),
                    expected: expected.clone(),
                    found,
                });
            }
        }
        Ok(())
    }

    /// Moves the run to `target` when allowed. A workflow without a run is
    /// started implicitly first.
    pub fn transition_to(&mut self, workflow_id: &str, target: &str, context: &ValueMap) -> bool {
        if !self.runs.contains_key(workflow_id) && self.start(workflow_id).is_err() {
            debug!(workflow = workflow_id, target, "transition rejected: unknown workflow");
            self.record(workflow_id, "", target, Some(TransitionRejection::UnknownWorkflow {
                workflow_id: workflow_id.to_string(),
            }));
            return false;
        }

        let from = self
            .runs
            .get(workflow_id)
            .map(|run| run.current.clone())
            .unwrap_or_default();
        match self.check_transition(workflow_id, target, context) {
            Ok(()) => {
                if let Some(run) = self.runs.get_mut(workflow_id) {
                    run.current = target.to_string();
                    run.history.push(target.to_string());
                }
                debug!(workflow = workflow_id, from = %from, to = target, "workflow transitioned");
                self.record(workflow_id, &from, target, None);
                true
            }
            Err(rejection) => {
                debug!(workflow = workflow_id, from = %from, to = target, reason = %rejection, "transition rejected");
                self.record(workflow_id, &from, target, Some(rejection));
                false
            }
        }
    }

    /// Every attempted transition, in order.
    pub fn telemetry(&self) -> &[TransitionEvent] {
        &self.telemetry
    }

    fn current_step_id<'a>(&'a self, definition: &'a WorkflowDefinition) -> &'a str {
        self.runs
            .get(&definition.id)
            .map(|run| run.current.as_str())
            .unwrap_or(definition.initial_step.as_str())
    }

    fn record(&mut self, workflow_id: &str, from: &str, to: &str, rejection: Option<TransitionRejection>) {
        self.telemetry.push(TransitionEvent {
            workflow_id: workflow_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            rejection,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_types::value_map;

    fn step(next: &[&str]) -> WorkflowStep {
        WorkflowStep {
            next_steps: next.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn two_step() -> WorkflowEngine {
        let mut definition = WorkflowDefinition {
            initial_step: "A".into(),
            ..Default::default()
        };
        definition.steps.insert("A".into(), step(&["B"]));
        definition.steps.insert("B".into(), step(&[]));
        let mut bundle = WorkflowBundle::default();
        bundle.workflows.insert("flow".into(), definition);
        WorkflowEngine::new(bundle).unwrap()
    }

    #[test]
    fn forward_transition_succeeds_and_backward_fails() {
        let mut engine = two_step();
        engine.start("flow").unwrap();
        assert!(engine.transition_to("flow", "B", &ValueMap::new()));
        assert!(engine.is_terminal("flow"));
        assert!(!engine.transition_to("flow", "A", &ValueMap::new()));
        assert_eq!(engine.history("flow"), ["A".to_string(), "B".to_string()]);

        let events = engine.telemetry();
        assert_eq!(events.len(), 2);
        assert!(events[0].accepted());
        assert!(matches!(events[1].rejection, Some(TransitionRejection::NotListed { .. })));
    }

    #[test]
    fn transition_without_run_starts_implicitly() {
        let mut engine = two_step();
        assert!(!engine.is_running("flow"));
        assert!(engine.transition_to("flow", "B", &ValueMap::new()));
        assert_eq!(engine.current_step("flow").map(|s| s.id.as_str()), Some("B"));
    }

    #[test]
    fn unknown_workflow_returns_false() {
        let mut engine = two_step();
        assert!(!engine.transition_to("missing", "B", &ValueMap::new()));
        assert!(matches!(engine.start("missing"), Err(RuntimeError::UnknownWorkflow { .. })));
    }

    #[test]
    fn target_conditions_must_match_exactly() {
        let mut definition = WorkflowDefinition {
            initial_step: "details".into(),
            ..Default::default()
        };
        definition.steps.insert("details".into(), step(&["adult", "minor"]));
        let mut adult = step(&[]);
        adult.conditions = value_map([("age_group", "adult")]);
        definition.steps.insert("adult".into(), adult);
        let mut minor = step(&[]);
        minor.conditions = value_map([("age_group", "minor")]);
        definition.steps.insert("minor".into(), minor);
        let mut bundle = WorkflowBundle::default();
        bundle.workflows.insert("signup".into(), definition);
        let mut engine = WorkflowEngine::new(bundle).unwrap();
        engine.start("signup").unwrap();

        let context = value_map([("age_group", "adult")]);
        assert_eq!(engine.available_transitions("signup", &context), vec!["adult"]);
        assert!(matches!(
            engine.check_transition("signup", "minor", &context),
            Err(TransitionRejection::ConditionMismatch { .. })
        ));
        assert!(!engine.transition_to("signup", "minor", &ValueMap::new()));
        assert!(engine.transition_to("signup", "adult", &context));
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let mut definition = WorkflowDefinition {
            initial_step: "A".into(),
            ..Default::default()
        };
        definition.steps.insert("A".into(), step(&["Z"]));
        let mut bundle = WorkflowBundle::default();
        bundle.workflows.insert("broken".into(), definition);
        assert!(matches!(WorkflowEngine::new(bundle), Err(LoadError::InvalidWorkflow { .. })));
    }
}
