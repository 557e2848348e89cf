use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskgraphError {
    // Definition errors
    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Unsupported step type: {0}")]
    UnsupportedStepType(String),

    #[error("Invalid config for step {step}: {message}")]
    InvalidStepConfig { step: String, message: String },

    // Integration errors
    #[error("Unsupported integration type: {0}")]
    UnsupportedIntegrationType(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Integration failed: {integration}: {message}")]
    IntegrationFailure { integration: String, message: String },

    // Condition errors
    #[error("Cannot compare field '{field}': {message}")]
    CoercionFailure { field: String, message: String },

    // Agent / team errors
    #[error("Capability '{name}' failed: {message}")]
    Capability { name: String, message: String },

    // Control errors
    #[error("Cannot {action} workflow while {from}")]
    InvalidTransition { from: String, action: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskgraphError>;
