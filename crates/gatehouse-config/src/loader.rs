//! Config file loading and assembly.

use std::path::{Path, PathBuf};

use gatehouse_dispatch::ServiceConfig;
use gatehouse_policy::Permissions;
use gatehouse_registry::{loader as tools_loader, ToolDefinition};
use serde_yaml::Value;
use tracing::info;

use crate::env::substitute;
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Everything the gateway needs from its configuration files.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The typed config document.
    pub config: Config,
    /// The declared policy.
    pub permissions: Permissions,
    /// Per-service dispatcher wiring with each service's owned tools.
    pub services: Vec<(ServiceConfig, Vec<ToolDefinition>)>,
}

impl LoadedConfig {
    /// All tool definitions across every service, for registry building.
    #[must_use]
    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.services
            .iter()
            .flat_map(|(_, tools)| tools.iter().cloned())
            .collect()
    }
}

/// Load and validate `config.yaml` plus every referenced tools file.
///
/// Tools files resolve relative to the config file's directory.
///
/// # Errors
///
/// Returns a [`ConfigError`] on unreadable or malformed files, unset
/// `${VAR}` references, or semantic validation failures.
pub fn load(config_path: &Path, permissions_path: &Path) -> ConfigResult<LoadedConfig> {
    let doc = read_yaml(config_path)?;
    let config: Config =
        serde_yaml::from_value(doc).map_err(|source| ConfigError::Parse {
            path: config_path.display().to_string(),
            source,
        })?;
    validate::validate(&config)?;

    let permissions = load_permissions(permissions_path)?;

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut services = Vec::with_capacity(config.services.len());
    for (name, section) in &config.services {
        let tools = match &section.tools {
            Some(tools_file) => {
                let tools_path = resolve(config_dir, tools_file);
                let tools_doc = read_yaml(&tools_path)?;
                tools_loader::parse_tools_value(tools_doc, name)?
            },
            None => Vec::new(),
        };
        info!(service = %name, tools = tools.len(), "loaded service");

        services.push((
            ServiceConfig {
                name: name.clone(),
                url: section.url.clone(),
                auth: section.auth.clone(),
                handler: section.handler.clone(),
                health: section.health.clone(),
                timeout_secs: section.timeout_secs,
                errors: section.errors.clone(),
            },
            tools,
        ));
    }

    Ok(LoadedConfig {
        config,
        permissions,
        services,
    })
}

/// Load and parse `permissions.yaml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] on unreadable or malformed files, unknown
/// actions, or unset `${VAR}` references.
pub fn load_permissions(path: &Path) -> ConfigResult<Permissions> {
    let doc = read_yaml(path)?;
    serde_yaml::from_value(doc).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Read a YAML file and apply `${VAR}` substitution.
fn read_yaml(path: &Path) -> ConfigResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let doc: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    substitute(doc)
}

fn resolve(config_dir: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    }
}
