use thiserror::Error;

/// Errors raised while loading configuration. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// The file path.
        path: String,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// A config file was not valid YAML or did not match the schema.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A `${VAR}` reference named an unset environment variable.
    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),

    /// A semantic validation failed.
    #[error("invalid config: {field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A tools file failed registry-side validation.
    #[error(transparent)]
    Registry(#[from] gatehouse_registry::RegistryError),
}

/// Result alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
