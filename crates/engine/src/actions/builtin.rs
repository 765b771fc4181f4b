use std::fmt;

/// Fallback handlers matched from the action name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinAction {
    /// `navigate_<screen_id>`
    Navigate { screen_id: String },
    /// `submit` or `submit_<entity>`
    Submit { entity: Option<String> },
    /// `cancel`
    Cancel,
}

impl BuiltinAction {
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        match name {
            "submit" => return Some(BuiltinAction::Submit { entity: None }),
            "cancel" => return Some(BuiltinAction::Cancel),
            _ => {}
        }
        if let Some(screen_id) = name.strip_prefix("navigate_").filter(|rest| !rest.is_empty()) {
            return Some(BuiltinAction::Navigate {
                screen_id: screen_id.to_string(),
            });
        }
        if let Some(entity) = name.strip_prefix("submit_").filter(|rest| !rest.is_empty()) {
            return Some(BuiltinAction::Submit {
                entity: Some(entity.to_string()),
            });
        }
        None
    }
}

impl fmt::Display for BuiltinAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinAction::Navigate { screen_id } => write!(f, "navigate_{screen_id}"),
            BuiltinAction::Submit { entity: None } => f.write_str("submit"),
            BuiltinAction::Submit { entity: Some(entity) } => write!(f, "submit_{entity}"),
            BuiltinAction::Cancel => f.write_str("cancel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_patterns() {
        assert_eq!(
            BuiltinAction::parse("navigate_home"),
            Some(BuiltinAction::Navigate { screen_id: "home".into() })
        );
        assert_eq!(BuiltinAction::parse("submit"), Some(BuiltinAction::Submit { entity: None }));
        assert_eq!(
            BuiltinAction::parse("submit_customer"),
            Some(BuiltinAction::Submit {
                entity: Some("customer".into())
            })
        );
        assert_eq!(BuiltinAction::parse("cancel"), Some(BuiltinAction::Cancel));
    }

    #[test]
    fn rejects_everything_else() {
        for name in ["navigate_", "submit_", "cancelled", "doSomething", ""] {
            assert_eq!(BuiltinAction::parse(name), None, "{name}");
        }
    }

    #[test]
    fn display_round_trips_the_action_name() {
        for name in ["navigate_home", "submit", "submit_order", "cancel"] {
            assert_eq!(BuiltinAction::parse(name).map(|a| a.to_string()).as_deref(), Some(name));
        }
    }
}
