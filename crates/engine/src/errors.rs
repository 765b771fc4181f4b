use capsule_registry::BuildError;
use capsule_util::LoadError;
use thiserror::Error;

/// Failure inside the embedded script engine. Contained at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("failed to compile script '{source_name}': {message}")]
    Compile { source_name: String, message: String },

    #[error("script evaluation failed in {context}: {message}")]
    Evaluation { context: String, message: String },

    #[error("script function '{name}' not found")]
    FunctionNotFound { name: String },
}

impl ScriptError {
    pub fn compile(source_name: impl Into<String>, message: impl ToString) -> Self {
        ScriptError::Compile {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn evaluation(context: impl Into<String>, message: impl ToString) -> Self {
        ScriptError::Evaluation {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Session-level failures. Everything except `Bootstrap` and `Load` is
/// scoped to one action, screen, or workflow and leaves the session usable.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("unknown action '{name}'")]
    UnknownAction { name: String },

    #[error("unknown screen '{screen_id}'")]
    UnknownScreen { screen_id: String },

    #[error("unknown workflow '{workflow_id}'")]
    UnknownWorkflow { workflow_id: String },

    #[error("action '{action}' needs an active form")]
    NoActiveForm { action: String },

    #[error("session bootstrap failed while {stage}: {message}")]
    Bootstrap { stage: String, message: String },
}

impl RuntimeError {
    pub fn bootstrap(stage: impl Into<String>, message: impl ToString) -> Self {
        RuntimeError::Bootstrap {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the failed bootstrap step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuntimeError::Load(error) => error.is_retryable(),
            RuntimeError::Bootstrap { .. } => true,
            _ => false,
        }
    }
}
