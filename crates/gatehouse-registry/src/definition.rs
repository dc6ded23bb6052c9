//! Tool definition types.
//!
//! Immutable after load. The registry owns these; every other component
//! borrows.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Schema for a single tool argument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgSpec {
    /// Whether the argument must be present.
    #[serde(default)]
    pub required: bool,
    /// Optional regex the (string) value must fully anchor-match against.
    /// Compiled at registry build; an invalid pattern is fatal.
    #[serde(default)]
    pub validate: Option<String>,
}

/// The HTTP request a tool performs when executed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    /// HTTP method (`GET`, `POST`, `PUT`, `PATCH`, `DELETE`).
    #[serde(default = "RequestSpec::default_method")]
    pub method: String,
    /// Path template with `{arg}` placeholders, relative to the service URL.
    #[serde(default = "RequestSpec::default_path")]
    pub path: String,
    /// Args to leave out of the JSON body (path-bound args are always
    /// excluded implicitly).
    #[serde(default)]
    pub body_exclude: Vec<String>,
}

impl RequestSpec {
    fn default_method() -> String {
        "GET".to_string()
    }

    fn default_path() -> String {
        "/".to_string()
    }
}

/// Response shaping for a tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSpec {
    /// When set, the parsed body is returned as `{wrap: body}`.
    #[serde(default)]
    pub wrap: Option<String>,
}

/// A complete tool definition, owned by the registry.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Globally unique tool name.
    pub name: String,
    /// The service this tool executes against.
    pub service_name: String,
    /// Human-readable description (shown in `list_tools`).
    pub description: String,
    /// Signature template, e.g. `"{domain}.{service}, {entity_id}"`.
    /// Empty means the signature is the bare tool name.
    pub signature: String,
    /// Argument schemas, keyed by argument name.
    pub args: BTreeMap<String, ArgSpec>,
    /// HTTP request shape; `None` for tools a custom handler serves itself.
    pub request: Option<RequestSpec>,
    /// Response shaping.
    pub response: Option<ResponseSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_spec_defaults() {
        let spec: RequestSpec = serde_yaml::from_str("{}").unwrap();
        assert_eq!(spec.method, "GET");
        assert_eq!(spec.path, "/");
        assert!(spec.body_exclude.is_empty());
    }

    #[test]
    fn arg_spec_rejects_unknown_fields() {
        let err = serde_yaml::from_str::<ArgSpec>("required: true\ntypo: 1");
        assert!(err.is_err());
    }
}
