use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Step '{step_key}' of flow '{flow_key}' failed: {source}")]
    Step {
        flow_key: String,
        step_key: String,
        #[source]
        source: StepError,
    },

    #[error("Flow '{flow_key}' cancelled after {completed_steps} step(s)")]
    Cancelled {
        flow_key: String,
        completed_steps: usize,
    },

    #[error("{} flow(s) failed while handling event '{event}'", .failures.len())]
    EventDispatch {
        event: String,
        failures: Vec<(String, FlowError)>,
    },

    #[error("Model '{0}' is not attached to a running engine")]
    EngineUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// The step failure behind this error, if there is exactly one
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            FlowError::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter type for '{field}': expected {expected}, got {actual}")]
    InvalidParamType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Model class '{0}' not found. Please register it first")]
    ModelClassNotFound(String),

    #[error("Parent class '{parent}' of '{class}' is not registered")]
    ParentClassNotFound { class: String, parent: String },

    #[error("Registering '{0}' would create an inheritance cycle")]
    InheritanceCycle(String),

    #[error("Flow '{flow_key}' not found on model class '{class}'")]
    FlowNotFound { class: String, flow_key: String },

    #[error("Flow '{flow_key}' declares step '{step_key}' more than once")]
    DuplicateStep { flow_key: String, step_key: String },
}
