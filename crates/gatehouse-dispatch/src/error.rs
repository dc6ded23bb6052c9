use gatehouse_core::{ExecutionErrorKind, GatewayError};
use thiserror::Error;

/// Errors raised while dispatching a tool request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Execution against the upstream service failed.
    #[error("{message}")]
    Failed {
        /// Failure classification.
        kind: ExecutionErrorKind,
        /// Sanitized, agent-safe description.
        message: String,
    },

    /// A handler could not be constructed. Fatal at startup.
    #[error("dispatch configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    /// Convenience constructor.
    #[must_use]
    pub fn failed(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// The failure classification (`Other` for configuration errors).
    #[must_use]
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            Self::Failed { kind, .. } => *kind,
            Self::Config(_) => ExecutionErrorKind::Other,
        }
    }
}

impl From<DispatchError> for GatewayError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Failed { kind, message } => Self::Execution { kind, message },
            DispatchError::Config(msg) => Self::Config(msg),
        }
    }
}

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
