//! Tool-to-service routing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use gatehouse_core::{ExecutionErrorKind, ToolArgs};
use gatehouse_registry::ToolRegistry;
use serde_json::Value;
use tracing::warn;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::ServiceHandler;

/// Routes approved tool requests to the owning service handler.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    services: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl Executor {
    /// Create an executor over the built service handlers.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        services: HashMap<String, Arc<dyn ServiceHandler>>,
    ) -> Self {
        Self { registry, services }
    }

    /// Execute a tool request against its service.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] with a `not_found` kind when the tool or
    /// its service is unknown, or whatever the handler raises.
    pub async fn execute(&self, tool_name: &str, args: &ToolArgs) -> DispatchResult<Value> {
        let service_name = self.registry.service_name(tool_name).ok_or_else(|| {
            DispatchError::failed(
                ExecutionErrorKind::NotFound,
                format!("unknown tool: {tool_name}"),
            )
        })?;
        let handler = self.services.get(service_name).ok_or_else(|| {
            DispatchError::failed(
                ExecutionErrorKind::NotFound,
                format!("service not configured: {service_name}"),
            )
        })?;
        handler.execute(tool_name, args).await
    }

    /// Probe every service, returning name → healthy.
    pub async fn health_checks(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        for (name, handler) in &self.services {
            status.insert(name.clone(), handler.health_check().await);
        }
        status
    }

    /// Probe every service at startup, logging failures. The gateway
    /// starts regardless — services may be transiently down.
    pub async fn log_startup_health(&self) {
        for (name, healthy) in self.health_checks().await {
            if !healthy {
                warn!(service = %name, "service failed its startup health probe");
            }
        }
    }

    /// Close every handler. Called once at gateway shutdown.
    pub async fn close_all(&self) {
        for handler in self.services.values() {
            handler.close().await;
        }
    }

    /// Number of configured services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}
