//! Rule and visibility expressions from the rules asset.
//!
//! Expressions are raw script text. Nothing here parses them; the engine
//! evaluates them lazily and contains any failure per rule or field.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named condition/action pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    /// Boolean expression. A missing condition never fires.
    #[serde(default, alias = "when")]
    pub condition: Option<String>,
    /// Statement run when the condition evaluates to `true`.
    #[serde(default, alias = "then")]
    pub action: Option<String>,
}

impl Rule {
    pub fn new(id: impl Into<String>, condition: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            condition: Some(condition.into()),
            action: Some(action.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Field name to visibility expression.
    #[serde(default)]
    pub visibility: IndexMap<String, String>,
}

impl RuleSet {
    /// Visibility expression attached to `field`, ignoring blank text.
    pub fn visibility_for(&self, field: &str) -> Option<&str> {
        self.visibility
            .get(field)
            .map(String::as_str)
            .filter(|expression| !expression.trim().is_empty())
    }

    /// Appends `other`, letting its visibility entries replace existing ones.
    pub fn merge(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
        self.visibility.extend(other.visibility);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_with_aliases() {
        let rules: RuleSet = serde_yaml::from_str(
            r#"
rules:
  - { id: vip, when: "tier == \"gold\"", then: "logInfo(\"vip\")" }
  - { id: noop }
visibility:
  company: "is_business == true"
  notes: "   "
"#,
        )
        .expect("rules yaml");

        assert_eq!(rules.rules.len(), 2);
        assert_eq!(rules.rules[0].condition.as_deref(), Some("tier == \"gold\""));
        assert!(rules.rules[1].action.is_none());
        assert_eq!(rules.visibility_for("company"), Some("is_business == true"));
        assert_eq!(rules.visibility_for("notes"), None);
        assert_eq!(rules.visibility_for("email"), None);
    }

    #[test]
    fn merge_replaces_visibility_per_field() {
        let mut base = RuleSet::default();
        base.visibility.insert("company".into(), "false".into());
        let mut overlay = RuleSet::default();
        overlay.visibility.insert("company".into(), "true".into());
        overlay.rules.push(Rule::new("r1", "true", "1"));

        base.merge(overlay);
        assert_eq!(base.visibility_for("company"), Some("true"));
        assert_eq!(base.rules.len(), 1);
    }
}
