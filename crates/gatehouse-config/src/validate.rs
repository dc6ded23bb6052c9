//! Semantic validation of the merged configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a parsed config.
///
/// # Errors
///
/// Returns the first [`ConfigError::Validation`] encountered.
pub(crate) fn validate(config: &Config) -> ConfigResult<()> {
    if config.agent.token.is_empty() {
        return Err(invalid("agent.token", "must not be empty"));
    }

    if config.gateway.tls.is_none() && !config.gateway.insecure {
        return Err(invalid(
            "gateway.tls",
            "TLS material missing; set gateway.insecure: true to run behind an external terminator",
        ));
    }

    if config.services.is_empty() {
        return Err(invalid("services", "at least one service must be configured"));
    }

    if config.approval_timeout == 0 {
        return Err(invalid("approval_timeout", "must be a positive number of seconds"));
    }

    if config.rate_limit.max_requests_per_minute == 0 {
        return Err(invalid("rate_limit.max_requests_per_minute", "must be positive"));
    }

    match config.messenger.kind.as_str() {
        "telegram" => {
            let Some(telegram) = &config.messenger.telegram else {
                return Err(invalid(
                    "messenger.telegram",
                    "required when messenger.type is 'telegram'",
                ));
            };
            if telegram.token.is_empty() {
                return Err(invalid("messenger.telegram.token", "must not be empty"));
            }
            if telegram.allowed_users.is_empty() {
                return Err(invalid(
                    "messenger.telegram.allowed_users",
                    "must list at least one guardian",
                ));
            }
        },
        other => {
            return Err(invalid(
                "messenger.type",
                format!("unsupported messenger type: '{other}'"),
            ));
        },
    }

    if config.storage.kind != "sqlite" {
        return Err(invalid(
            "storage.type",
            format!("unsupported storage type: '{}'", config.storage.kind),
        ));
    }
    if config.storage.path.is_empty() {
        return Err(invalid("storage.path", "must not be empty"));
    }

    Ok(())
}
