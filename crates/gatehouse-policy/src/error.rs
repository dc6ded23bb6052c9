use thiserror::Error;

/// Errors raised while compiling policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule or default pattern failed to compile. Fatal at startup.
    #[error("invalid policy pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending glob pattern.
        pattern: String,
        /// Underlying glob error.
        #[source]
        source: globset::Error,
    },
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
