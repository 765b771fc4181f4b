//! Field visibility and rule evaluation through the script bridge.

use capsule_types::{Rule, Value, ValueMap};
use tracing::debug;

use crate::script::ScriptBridge;

/// Accumulated values overlaid with the current form's values.
pub fn merged_values(accumulated: &ValueMap, current: &ValueMap) -> ValueMap {
    let mut merged = accumulated.clone();
    for (key, value) in current {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Fail-open visibility check.
///
/// Absent or blank expressions, non-boolean results, and evaluation errors
/// all count as visible. The expression runs read-only: calling a storage
/// verb or `navigate` is an evaluation error.
pub fn evaluate_visibility(bridge: &mut ScriptBridge, expression: Option<&str>, variables: &ValueMap) -> bool {
    let Some(expression) = expression.map(str::trim).filter(|text| !text.is_empty()) else {
        return true;
    };
    match bridge.eval_read_only(expression, variables) {
        Ok(Value::Bool(visible)) => visible,
        Ok(other) => {
            debug!(expression, result = other.type_name(), "visibility expression is not boolean; showing field");
            true
        }
        Err(error) => {
            debug!(expression, error = %error, "visibility expression failed; showing field");
            true
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Condition held and the action ran.
    Fired { result: Value },
    /// Condition was missing, false, or not boolean.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule_id: String,
    pub outcome: RuleOutcome,
}

/// Runs every rule in order. A rule without a condition never fires; a
/// failing rule never stops the ones after it.
pub fn evaluate_rules(bridge: &mut ScriptBridge, rules: &[Rule], variables: &ValueMap) -> Vec<RuleReport> {
    rules
        .iter()
        .map(|rule| RuleReport {
            rule_id: rule.id.clone(),
            outcome: evaluate_rule(bridge, rule, variables),
        })
        .collect()
}

fn evaluate_rule(bridge: &mut ScriptBridge, rule: &Rule, variables: &ValueMap) -> RuleOutcome {
    let Some(condition) = rule.condition.as_deref().map(str::trim).filter(|text| !text.is_empty()) else {
        return RuleOutcome::Skipped;
    };
    match bridge.eval_with(condition, variables) {
        Ok(Value::Bool(true)) => {}
        Ok(_) => return RuleOutcome::Skipped,
        Err(error) => {
            debug!(rule = %rule.id, error = %error, "rule condition failed");
            return RuleOutcome::Failed { error: error.to_string() };
        }
    }

    let Some(action) = rule.action.as_deref().map(str::trim).filter(|text| !text.is_empty()) else {
        return RuleOutcome::Fired { result: Value::Null };
    };
    match bridge.run_with(action, variables) {
        Ok(result) => RuleOutcome::Fired { result },
        Err(error) => {
            debug!(rule = %rule.id, error = %error, "rule action failed");
            RuleOutcome::Failed { error: error.to_string() }
        }
    }
}
