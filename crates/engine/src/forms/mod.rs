//! Per-form reactive state and the rule/visibility evaluator.

mod state;
mod visibility;

pub use state::{FormChange, FormState, SubscriptionId};
pub use visibility::{RuleOutcome, RuleReport, evaluate_rules, evaluate_visibility, merged_values};
