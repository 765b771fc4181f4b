use thiserror::Error;

/// Build-time failure for one declarative node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("unknown widget type '{type_name}'")]
    UnknownWidgetType { type_name: String },

    #[error("malformed node at {path}: {reason}")]
    MalformedNode { path: String, reason: String },
}

impl BuildError {
    pub fn unknown_widget(type_name: impl Into<String>) -> Self {
        BuildError::UnknownWidgetType {
            type_name: type_name.into(),
        }
    }

    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::MalformedNode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
