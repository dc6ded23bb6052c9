use thiserror::Error;

/// Errors raised while loading or building the tool registry.
///
/// All of these are fatal configuration errors: the gateway refuses to
/// start rather than run with a partially loaded tool set.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tools file was not valid YAML.
    #[error("invalid tools file for service '{service}': {source}")]
    Parse {
        /// Service whose tools file failed to parse.
        service: String,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A per-arg validator pattern failed to compile.
    #[error("invalid validator for tool '{tool}' arg '{arg}': {source}")]
    InvalidValidator {
        /// Tool declaring the validator.
        tool: String,
        /// Argument the validator applies to.
        arg: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The same tool name appeared in two services.
    #[error("duplicate tool name '{tool}' in services '{first}' and '{second}'")]
    DuplicateTool {
        /// The colliding tool name.
        tool: String,
        /// Service that declared it first.
        first: String,
        /// Service that declared it again.
        second: String,
    },
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
