use thiserror::Error;

/// Errors raised by messenger adapters.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// The prompt could not be delivered to the guardians.
    #[error("failed to send approval prompt: {0}")]
    Send(String),

    /// The messenger back-end is unreachable.
    #[error("messenger unavailable: {0}")]
    Unavailable(String),

    /// The adapter was misconfigured. Fatal at startup.
    #[error("messenger configuration error: {0}")]
    Config(String),
}

/// Result alias for messenger operations.
pub type MessengerResult<T> = Result<T, MessengerError>;
