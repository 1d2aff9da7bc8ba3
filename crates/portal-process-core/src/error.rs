use thiserror::Error;

/// Error type for the process engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Process not found
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// Process step not found
    #[error("Process step not found: {0}")]
    StepNotFound(String),

    /// Optimistic version check failed; another writer changed the process first
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Process is held by a live lease
    #[error("Process is locked: {0}")]
    ProcessLocked(String),

    /// Attempt to move a step out of a terminal status
    #[error("Invalid step transition: {0}")]
    InvalidStepTransition(String),

    /// Step type not valid for the process or operation
    #[error("Invalid step type: {0}")]
    InvalidStepType(String),

    /// Operation not allowed in the current process state
    #[error("Invalid process state: {0}")]
    InvalidProcessState(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ProcessError {
    /// Whether the error is the lost-race signal of a compare-and-swap
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, ProcessError::ConcurrencyConflict(_))
    }
}

impl From<serde_json::Error> for ProcessError {
    fn from(err: serde_json::Error) -> Self {
        ProcessError::SerializationError(err.to_string())
    }
}

impl From<String> for ProcessError {
    fn from(err: String) -> Self {
        ProcessError::Other(err)
    }
}

impl From<&str> for ProcessError {
    fn from(err: &str) -> Self {
        ProcessError::Other(err.to_string())
    }
}
