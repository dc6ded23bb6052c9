//! Pre-policy input validation.
//!
//! Argument values are checked *before* any signature is built or any
//! policy rule consulted. A value containing glob metacharacters, the
//! parenthesis/comma characters reserved by the signature format, or any
//! control character could otherwise forge a wildcard match — so such
//! requests never reach policy at all.

use gatehouse_core::ToolArgs;
use gatehouse_registry::ToolRegistry;
use serde_json::Value;
use thiserror::Error;

/// Characters forbidden in every string argument value.
const FORBIDDEN: &[char] = &['*', '?', '[', ']', '(', ')', ','];

/// Why an argument set was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A value contained a glob/signature metacharacter or control char.
    #[error("Argument '{arg}' contains forbidden characters")]
    ForbiddenCharacters {
        /// The offending argument name.
        arg: String,
    },

    /// A required argument was absent.
    #[error("Missing required argument: {arg}")]
    MissingRequired {
        /// The missing argument name.
        arg: String,
    },

    /// A value failed the tool's declared validator.
    #[error("Invalid value for {arg}")]
    InvalidValue {
        /// The offending argument name.
        arg: String,
    },
}

/// Validate an argument map against the global character rules and the
/// tool's declared schema.
///
/// The forbidden-character check always runs first, for every string
/// value. When the registry knows the tool, required-argument and per-arg
/// validator checks follow. Non-string scalars skip the character check.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered; the caller maps it
/// to an `INVALID_REQUEST` wire error.
pub fn validate_args(
    tool_name: &str,
    args: &ToolArgs,
    registry: &ToolRegistry,
) -> Result<(), ValidationError> {
    for (key, value) in args {
        if let Value::String(s) = value {
            if s.chars().any(|c| FORBIDDEN.contains(&c) || (c as u32) < 0x20) {
                return Err(ValidationError::ForbiddenCharacters { arg: key.clone() });
            }
        }
    }

    if registry.lookup(tool_name).is_some() {
        for required in registry.required_args(tool_name) {
            if !args.contains_key(required) {
                return Err(ValidationError::MissingRequired {
                    arg: required.to_string(),
                });
            }
        }
        if let Some(validators) = registry.validators(tool_name) {
            for (key, value) in args {
                let Value::String(s) = value else { continue };
                if let Some(re) = validators.get(key) {
                    if !re.is_match(s) {
                        return Err(ValidationError::InvalidValue { arg: key.clone() });
                    }
                }
            }
        }
    }

    Ok(())
}
