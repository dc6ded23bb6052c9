//! Gateway error taxonomy and wire-code mapping.
//!
//! Every per-request failure becomes exactly one [`GatewayError`], which
//! maps to a numeric envelope code and a short agent-facing message. The
//! engine never lets internal detail (paths, stack context, upstream
//! bodies beyond the mapped message) reach the agent.

use thiserror::Error;

use crate::protocol;

/// Classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// The upstream service rejected our credentials.
    Auth,
    /// The upstream resource or tool does not exist.
    NotFound,
    /// The service was unreachable or the request timed out.
    Connection,
    /// The service answered with something we could not interpret.
    Protocol,
    /// Anything else.
    Other,
}

impl ExecutionErrorKind {
    /// Canonical lowercase form, as stored in audit rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Other => "other",
        }
    }
}

/// Errors surfaced to agents or raised during gateway operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The inbound frame was not valid JSON.
    #[error("parse error")]
    Parse,

    /// The envelope or request content was invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested method does not exist.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The connection has not completed the auth handshake.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// A resource cap rejected the request.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Policy evaluated to deny.
    #[error("denied by policy")]
    PolicyDenied,

    /// The guardian rejected the request.
    #[error("denied by user")]
    UserDenied,

    /// The approval window elapsed.
    #[error("approval timed out")]
    ApprovalTimedOut,

    /// Dispatch to the upstream service failed.
    #[error("execution failed: {message}")]
    Execution {
        /// Failure classification.
        kind: ExecutionErrorKind,
        /// Short human-readable description (already sanitized).
        message: String,
    },

    /// Fatal configuration problem (startup only).
    #[error("configuration error: {0}")]
    Config(String),

    /// Unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convenience constructor for execution failures.
    #[must_use]
    pub fn execution(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self::Execution {
            kind,
            message: message.into(),
        }
    }

    /// The numeric wire code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse => protocol::PARSE_ERROR,
            Self::InvalidRequest(_) => protocol::INVALID_REQUEST,
            Self::MethodNotFound(_) => protocol::METHOD_NOT_FOUND,
            Self::NotAuthenticated(_) => protocol::NOT_AUTHENTICATED,
            Self::RateLimited(_) => protocol::RATE_LIMIT_EXCEEDED,
            Self::PolicyDenied => protocol::POLICY_DENIED,
            Self::UserDenied => protocol::USER_DENIED,
            Self::ApprovalTimedOut => protocol::APPROVAL_TIMEOUT,
            Self::Execution { .. } => protocol::EXECUTION_FAILED,
            // Startup/internal errors are never sent as such; they surface
            // to agents as generic execution failures.
            Self::Config(_) | Self::Internal(_) => protocol::EXECUTION_FAILED,
        }
    }

    /// The short message the agent sees. No internal detail.
    #[must_use]
    pub fn agent_message(&self) -> String {
        match self {
            Self::Parse => "Parse error".to_string(),
            Self::InvalidRequest(msg) => msg.clone(),
            Self::MethodNotFound(method) => format!("Unknown method: {method}"),
            Self::NotAuthenticated(msg) => msg.clone(),
            Self::RateLimited(msg) => msg.clone(),
            Self::PolicyDenied => "Denied by policy".to_string(),
            Self::UserDenied => "Denied by user".to_string(),
            Self::ApprovalTimedOut => "Approval timed out".to_string(),
            Self::Execution { message, .. } => message.clone(),
            Self::Config(_) | Self::Internal(_) => "Internal execution error".to_string(),
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, GatewayError>;
