use thiserror::Error;

/// Infrastructure-level errors raised by the caller core and its adapters.
#[derive(Debug, Error)]
pub enum CallerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Executor '{0}' is not available")]
    ExecutorUnavailable(String),

    #[error("Delivery sink '{name}' failed: {message}")]
    Sink { name: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallerError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    pub fn sink<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Sink {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CallerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors an invocable function may raise while running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    /// The function ran but the underlying command failed.
    #[error("{0}")]
    CommandExecution(String),

    /// A binary or command the function depends on is missing.
    #[error("{0}")]
    CommandNotFound(String),

    /// The arguments are acceptable to the signature but not to the function body.
    #[error("{0}")]
    InvalidArguments(String),
}

/// Unified Result type
pub type CallerResult<T> = std::result::Result<T, CallerError>;
