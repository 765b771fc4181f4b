//! Workflow definitions for multi-step data capture.
//!
//! Workflows are forward, tree-shaped step graphs. The structural invariants
//! (initial step exists, every `next_steps` target exists) are checked by
//! [`WorkflowDefinition::validate`], which the asset loader treats as a hard
//! load-time requirement.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::ValueMap;

/// Collection of workflows keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBundle {
    #[serde(default)]
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

impl WorkflowBundle {
    /// Copies map keys into workflow and step identifiers.
    pub fn normalize(mut self) -> Self {
        for (workflow_id, workflow) in self.workflows.iter_mut() {
            workflow.id = workflow_id.clone();
            for (step_id, step) in workflow.steps.iter_mut() {
                step.id = step_id.clone();
            }
        }
        self
    }

    /// Validates every workflow, returning all issues found.
    pub fn validate(&self) -> Vec<WorkflowIssue> {
        self.workflows.values().flat_map(WorkflowDefinition::validate).collect()
    }

    /// Steps across every workflow whose screen `has_screen` rejects.
    pub fn unknown_screens(&self, has_screen: impl Fn(&str) -> bool) -> Vec<WorkflowIssue> {
        self.workflows
            .values()
            .flat_map(|workflow| workflow.unknown_screens(&has_screen))
            .collect()
    }
}

/// A declared step graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    pub initial_step: String,
    #[serde(default)]
    pub steps: IndexMap<String, WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.get(step_id)
    }

    /// Checks structural invariants.
    pub fn validate(&self) -> Vec<WorkflowIssue> {
        let mut issues = Vec::new();
        if !self.steps.contains_key(&self.initial_step) {
            issues.push(WorkflowIssue::MissingInitialStep {
                workflow: self.id.clone(),
                step: self.initial_step.clone(),
            });
        }

        for (step_id, step) in &self.steps {
            for target in &step.next_steps {
                if !self.steps.contains_key(target) {
                    issues.push(WorkflowIssue::UnknownNextStep {
                        workflow: self.id.clone(),
                        step: step_id.clone(),
                        target: target.clone(),
                    });
                }
                if target == step_id {
                    issues.push(WorkflowIssue::SelfTransition {
                        workflow: self.id.clone(),
                        step: step_id.clone(),
                    });
                }
            }
        }
        issues
    }

    /// Steps whose `screen_id` fails `has_screen`.
    pub fn unknown_screens(&self, has_screen: impl Fn(&str) -> bool) -> Vec<WorkflowIssue> {
        self.steps
            .iter()
            .filter_map(|(step_id, step)| {
                let screen = step.screen_id.as_deref()?;
                (!has_screen(screen)).then(|| WorkflowIssue::UnknownScreen {
                    workflow: self.id.clone(),
                    step: step_id.clone(),
                    screen: screen.to_string(),
                })
            })
            .collect()
    }
}

/// A single state in a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub id: String,
    /// Screen rendered while this step is active.
    #[serde(default)]
    pub screen_id: Option<String>,
    /// Exact-match guards evaluated against the transition context.
    #[serde(default)]
    pub conditions: ValueMap,
    /// Allowed targets, in authoring order. Empty means terminal.
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl WorkflowStep {
    pub fn is_terminal(&self) -> bool {
        self.next_steps.is_empty()
    }
}

/// Structural problem in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowIssue {
    #[error("workflow '{workflow}': initial step '{step}' is not declared")]
    MissingInitialStep { workflow: String, step: String },

    #[error("workflow '{workflow}': step '{step}' lists unknown next step '{target}'")]
    UnknownNextStep {
        workflow: String,
        step: String,
        target: String,
    },

    #[error("workflow '{workflow}': step '{step}' lists itself as a next step")]
    SelfTransition { workflow: String, step: String },

    #[error("workflow '{workflow}': step '{step}' shows unknown screen '{screen}'")]
    UnknownScreen {
        workflow: String,
        step: String,
        screen: String,
    },
}
