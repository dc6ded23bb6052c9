//! Tools-file parsing.
//!
//! A tools file is a YAML document of the form:
//!
//! ```yaml
//! tools:
//!   ha_get_state:
//!     description: Read the state of an entity
//!     signature: "{entity_id}"
//!     args:
//!       entity_id:
//!         required: true
//!         validate: "^[a-z_]+\\.[a-z0-9_]+$"
//!     request:
//!       method: GET
//!       path: /api/states/{entity_id}
//!     response:
//!       wrap: state
//! ```
//!
//! Environment-variable substitution is applied by the config loader before
//! the document reaches this module.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::definition::{ArgSpec, RequestSpec, ResponseSpec, ToolDefinition};
use crate::error::{RegistryError, RegistryResult};

/// Raw per-tool YAML shape.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTool {
    #[serde(default)]
    description: String,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    args: BTreeMap<String, ArgSpec>,
    #[serde(default)]
    request: Option<RequestSpec>,
    #[serde(default)]
    response: Option<ResponseSpec>,
}

/// Raw tools-file YAML shape.
#[derive(Debug, Default, Deserialize)]
struct RawToolsFile {
    #[serde(default)]
    tools: BTreeMap<String, RawTool>,
}

/// Parse a tools document from an already-substituted YAML string.
///
/// An empty document (or one with no `tools` mapping) yields an empty list.
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] when the document is not valid YAML or
/// does not match the tools-file shape.
pub fn parse_tools_str(doc: &str, service_name: &str) -> RegistryResult<Vec<ToolDefinition>> {
    if doc.trim().is_empty() {
        return Ok(Vec::new());
    }
    let raw: RawToolsFile = serde_yaml::from_str(doc).map_err(|source| RegistryError::Parse {
        service: service_name.to_string(),
        source,
    })?;
    Ok(into_definitions(raw, service_name))
}

/// Parse a tools document from a YAML value (used after env substitution).
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] when the value does not match the
/// tools-file shape.
pub fn parse_tools_value(
    doc: serde_yaml::Value,
    service_name: &str,
) -> RegistryResult<Vec<ToolDefinition>> {
    if doc.is_null() {
        return Ok(Vec::new());
    }
    let raw: RawToolsFile =
        serde_yaml::from_value(doc).map_err(|source| RegistryError::Parse {
            service: service_name.to_string(),
            source,
        })?;
    Ok(into_definitions(raw, service_name))
}

fn into_definitions(raw: RawToolsFile, service_name: &str) -> Vec<ToolDefinition> {
    raw.tools
        .into_iter()
        .map(|(name, tool)| ToolDefinition {
            name,
            service_name: service_name.to_string(),
            description: tool.description,
            signature: tool.signature,
            args: tool.args,
            request: tool.request,
            response: tool.response,
        })
        .collect()
}
