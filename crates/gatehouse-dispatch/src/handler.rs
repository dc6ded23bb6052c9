//! The service handler contract.

use async_trait::async_trait;
use gatehouse_core::ToolArgs;
use serde_json::Value;

use crate::error::DispatchResult;

/// Executes tool requests against one trusted service.
///
/// The built-in [`crate::HttpHandler`] covers declarative HTTP services;
/// plugins registered through [`crate::HandlerRegistry`] satisfy the same
/// contract for everything else.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Execute a tool request and return the shaped response body.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::DispatchError`] classifying the failure; the
    /// engine audits it as `execution_failed` and never lets it take the
    /// session down.
    async fn execute(&self, tool_name: &str, args: &ToolArgs) -> DispatchResult<Value>;

    /// Whether the service currently answers its health probe.
    async fn health_check(&self) -> bool;

    /// Release any held resources. Called once, at gateway shutdown.
    async fn close(&self);
}
