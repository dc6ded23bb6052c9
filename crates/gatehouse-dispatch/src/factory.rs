//! Named handler factories.
//!
//! The configuration names a factory per service (`handler: http` unless a
//! plugin is installed); the factory receives the parsed [`ServiceConfig`]
//! and the service's owned tool definitions and returns a handler. Custom
//! factories register at startup — there is no runtime class resolution.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_registry::ToolDefinition;

use crate::config::ServiceConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::ServiceHandler;
use crate::http::HttpHandler;

/// Builds a [`ServiceHandler`] from a service config and its tools.
pub type HandlerFactory = Arc<
    dyn Fn(ServiceConfig, Vec<ToolDefinition>) -> DispatchResult<Arc<dyn ServiceHandler>>
        + Send
        + Sync,
>;

/// Registry of named handler factories.
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// A registry with the built-in `http` factory.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("http", |config, tools| {
            Ok(Arc::new(HttpHandler::new(config, tools)?) as Arc<dyn ServiceHandler>)
        });
        registry
    }

    /// Register a factory under a name, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(ServiceConfig, Vec<ToolDefinition>) -> DispatchResult<Arc<dyn ServiceHandler>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build the handler for a service.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] when the named factory is not
    /// registered, or whatever the factory raises. Fatal at startup.
    pub fn build(
        &self,
        config: ServiceConfig,
        tools: Vec<ToolDefinition>,
    ) -> DispatchResult<Arc<dyn ServiceHandler>> {
        let factory = self.factories.get(&config.handler).ok_or_else(|| {
            DispatchError::Config(format!(
                "unknown handler '{}' for service '{}'",
                config.handler, config.name
            ))
        })?;
        factory(config, tools)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("factories", &names)
            .finish()
    }
}
