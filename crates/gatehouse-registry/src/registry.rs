//! The tool registry proper.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::definition::ToolDefinition;
use crate::error::{RegistryError, RegistryResult};

/// Matches `{arg_name}` placeholders in signature and path templates.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\w+)\}").expect("placeholder regex is valid")
});

/// Central registry mapping tool names to definitions and services.
///
/// Built once at startup from every service's tools file; immutable after.
/// Validator regexes are compiled here so the first request never pays a
/// compile and a bad pattern can never reach runtime.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    validators: HashMap<String, HashMap<String, Regex>>,
}

impl ToolRegistry {
    /// Build the registry from all loaded tool definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] when a tool name appears in
    /// more than one service, or [`RegistryError::InvalidValidator`] when a
    /// `validate` pattern does not compile. Both are fatal at startup.
    pub fn build(definitions: Vec<ToolDefinition>) -> RegistryResult<Self> {
        let mut tools: HashMap<String, ToolDefinition> = HashMap::new();
        let mut validators: HashMap<String, HashMap<String, Regex>> = HashMap::new();

        for tool in definitions {
            if let Some(existing) = tools.get(&tool.name) {
                return Err(RegistryError::DuplicateTool {
                    tool: tool.name.clone(),
                    first: existing.service_name.clone(),
                    second: tool.service_name.clone(),
                });
            }

            let mut compiled: HashMap<String, Regex> = HashMap::new();
            for (arg_name, arg) in &tool.args {
                if let Some(pattern) = &arg.validate {
                    let re = Regex::new(pattern).map_err(|source| {
                        RegistryError::InvalidValidator {
                            tool: tool.name.clone(),
                            arg: arg_name.clone(),
                            source,
                        }
                    })?;
                    compiled.insert(arg_name.clone(), re);
                }
            }

            validators.insert(tool.name.clone(), compiled);
            tools.insert(tool.name.clone(), tool);
        }

        Ok(Self { tools, validators })
    }

    /// An empty registry (no declared tools; everything falls back).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            validators: HashMap::new(),
        }
    }

    /// Look up a tool definition by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// The service a tool belongs to.
    #[must_use]
    pub fn service_name(&self, tool: &str) -> Option<&str> {
        self.tools.get(tool).map(|t| t.service_name.as_str())
    }

    /// Build signature parts from the tool's template.
    ///
    /// The template is split on commas; each part has its `{arg}`
    /// placeholders interpolated (composite parts like `{domain}.{service}`
    /// are supported; missing args interpolate as the empty string).
    ///
    /// Returns `None` when the tool is not in the registry — callers fall
    /// back to the sorted-args signature.
    #[must_use]
    pub fn signature_parts(
        &self,
        name: &str,
        args: &gatehouse_core::ToolArgs,
    ) -> Option<Vec<String>> {
        let tool = self.tools.get(name)?;
        if tool.signature.is_empty() {
            return Some(Vec::new());
        }
        let parts = tool
            .signature
            .split(',')
            .map(|part| interpolate(part.trim(), args))
            .collect();
        Some(parts)
    }

    /// Names of the tool's required arguments.
    #[must_use]
    pub fn required_args(&self, name: &str) -> BTreeSet<&str> {
        self.tools
            .get(name)
            .map(|tool| {
                tool.args
                    .iter()
                    .filter(|(_, spec)| spec.required)
                    .map(|(arg, _)| arg.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pre-compiled per-arg validators for a tool.
    #[must_use]
    pub fn validators(&self, name: &str) -> Option<&HashMap<String, Regex>> {
        self.validators.get(name)
    }

    /// Iterate over every registered tool, in unspecified order.
    pub fn all_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry has no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Interpolate `{arg}` placeholders in a template fragment.
fn interpolate(template: &str, args: &gatehouse_core::ToolArgs) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            args.get(&caps[1]).map(stringify_arg).unwrap_or_default()
        })
        .into_owned()
}

/// Render an argument value the way it appears in signatures.
///
/// Strings appear bare, numbers and booleans in their JSON form, and null
/// as the empty string. Also used by the policy crate's fallback signature.
#[must_use]
pub fn stringify_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_tools_str;
    use gatehouse_core::ToolArgs;

    fn registry() -> ToolRegistry {
        let doc = r#"
tools:
  ha_get_state:
    signature: "{entity_id}"
    args:
      entity_id:
        required: true
        validate: "^[a-z_]+\\.[a-z0-9_]+$"
  ha_call_service:
    signature: "{domain}.{service}, {entity_id}"
    args:
      domain: { required: true }
      service: { required: true }
      entity_id: {}
  ha_bare: {}
"#;
        ToolRegistry::build(parse_tools_str(doc, "homeassistant").unwrap()).unwrap()
    }

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[test]
    fn signature_parts_follow_the_template() {
        let registry = registry();
        let parts = registry
            .signature_parts("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .unwrap();
        assert_eq!(parts, vec!["sensor.temp"]);
    }

    #[test]
    fn composite_placeholders_interpolate() {
        let registry = registry();
        let parts = registry
            .signature_parts(
                "ha_call_service",
                &args(&[
                    ("domain", "light"),
                    ("service", "turn_on"),
                    ("entity_id", "light.bedroom"),
                ]),
            )
            .unwrap();
        assert_eq!(parts, vec!["light.turn_on", "light.bedroom"]);
    }

    #[test]
    fn missing_args_interpolate_empty() {
        let registry = registry();
        let parts = registry
            .signature_parts(
                "ha_call_service",
                &args(&[("domain", "lock"), ("service", "unlock")]),
            )
            .unwrap();
        assert_eq!(parts, vec!["lock.unlock", ""]);
    }

    #[test]
    fn empty_template_yields_no_parts() {
        let registry = registry();
        assert_eq!(
            registry.signature_parts("ha_bare", &ToolArgs::new()),
            Some(Vec::new())
        );
    }

    #[test]
    fn unknown_tool_yields_none() {
        let registry = registry();
        assert!(registry.signature_parts("nope", &ToolArgs::new()).is_none());
        assert!(registry.lookup("nope").is_none());
        assert!(registry.service_name("nope").is_none());
    }

    #[test]
    fn required_args_and_validators() {
        let registry = registry();
        let required = registry.required_args("ha_call_service");
        assert!(required.contains("domain"));
        assert!(required.contains("service"));
        assert!(!required.contains("entity_id"));

        let validators = registry.validators("ha_get_state").unwrap();
        assert!(validators["entity_id"].is_match("sensor.temp"));
        assert!(!validators["entity_id"].is_match("SENSOR"));
    }

    #[test]
    fn duplicate_tool_names_are_fatal() {
        let a = parse_tools_str("tools:\n  shared: {}", "svc_a").unwrap();
        let b = parse_tools_str("tools:\n  shared: {}", "svc_b").unwrap();
        let err = ToolRegistry::build(a.into_iter().chain(b).collect()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool { ref tool, .. } if tool == "shared"));
    }

    #[test]
    fn invalid_validator_is_fatal() {
        let doc = "tools:\n  bad:\n    args:\n      x:\n        validate: '['";
        let tools = parse_tools_str(doc, "svc").unwrap();
        let err = ToolRegistry::build(tools).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidValidator { ref tool, ref arg, .. }
                if tool == "bad" && arg == "x"
        ));
    }

    #[test]
    fn non_string_args_stringify_bare() {
        assert_eq!(stringify_arg(&Value::from(42)), "42");
        assert_eq!(stringify_arg(&Value::from(true)), "true");
        assert_eq!(stringify_arg(&Value::Null), "");
        assert_eq!(stringify_arg(&Value::from("s")), "s");
    }
}
