//! `${VAR}` environment substitution.
//!
//! Applied to every string scalar in a parsed YAML document before it is
//! deserialized into typed config. Substitution is recursive over maps and
//! sequences; keys are left untouched.

use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// Substitute `${VAR}` references in every string value of `doc`.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] naming the first unset variable
/// encountered.
pub fn substitute(doc: Value) -> ConfigResult<Value> {
    match doc {
        Value::String(s) => Ok(Value::String(substitute_str(&s)?)),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, substitute(value)?);
            }
            Ok(Value::Mapping(out))
        },
        Value::Sequence(seq) => seq.into_iter().map(substitute).collect::<ConfigResult<_>>()
            .map(Value::Sequence),
        other => Ok(other),
    }
}

/// Substitute `${VAR}` references in a single string.
fn substitute_str(input: &str) -> ConfigResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            // No closing brace: leave the remainder literal.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &tail[..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            // Not a variable reference; emit literally and continue after "${".
            out.push_str("${");
            rest = tail;
            continue;
        }
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
